//! Mirror that writes through to the backing store before returning
//!
//! The backing store is read into memory once, when the mirror is created.
//! Reads are served by the in-memory copy only. Every mutation is applied to
//! the in-memory copy and then, on the calling task, to the backing store.
//! Locks come from the in-memory copy; the backing store's locking is never
//! engaged.
//!
//! A backing failure is returned to the caller, but the in-memory copy is
//! not rolled back: after such an error the two stores disagree about the
//! entry until a later successful mutation overwrites it.
//!
//! Only one process may mutate a given backing store through a mirror.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, trace};

use crate::error::{Result, StoreError};
use crate::io::{Directory, EntryLock, EntryReader, EntryWriter, MemDirectory, MemWriter};

/// Write-through in-memory mirror of `B`
pub struct SyncMirrorDirectory<B: Directory> {
    backing: Arc<B>,
    mirror: MemDirectory,
    // Keeps mirror order and backing order identical under concurrent callers
    gate: Arc<Mutex<()>>,
}

impl<B: Directory> SyncMirrorDirectory<B> {
    /// Snapshot `backing` into memory.
    ///
    /// Fails with `Construction` if the backing store cannot be listed or
    /// read.
    pub async fn new(backing: Arc<B>) -> Result<Self> {
        let mirror = MemDirectory::load_from(backing.as_ref()).await?;
        debug!(backing = %backing.describe(), entries = mirror.len(), "sync mirror opened");
        Ok(Self {
            backing,
            mirror,
            gate: Arc::new(Mutex::new(())),
        })
    }

    #[must_use]
    pub fn backing(&self) -> &Arc<B> {
        &self.backing
    }

    #[must_use]
    pub fn mirror(&self) -> &MemDirectory {
        &self.mirror
    }
}

impl<B: Directory> Directory for SyncMirrorDirectory<B> {
    type Writer = SyncMirrorWriter<B>;

    async fn list(&self) -> Result<Vec<String>> {
        self.mirror.list().await
    }

    async fn size(&self, name: &str) -> Result<u64> {
        self.mirror.size(name).await
    }

    async fn open_read(&self, name: &str) -> Result<EntryReader> {
        self.mirror.open_read(name).await
    }

    async fn open_write(&self, name: &str) -> Result<SyncMirrorWriter<B>> {
        let mirror = self.mirror.open_write(name).await?;
        let backing = self
            .backing
            .open_write(name)
            .await
            .map_err(|e| StoreError::sync_operation(format!("open [{name}] for writing"), e))?;
        Ok(SyncMirrorWriter {
            name: name.to_string(),
            mirror,
            backing,
            gate: Arc::clone(&self.gate),
        })
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let _gate = self.gate.lock().await;
        self.mirror.delete(name).await?;
        trace!(entry = name, "sync mirror delete");
        self.backing
            .delete(name)
            .await
            .map_err(|e| StoreError::sync_operation(format!("delete [{name}]"), e))
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let _gate = self.gate.lock().await;
        self.mirror.rename(from, to).await?;
        trace!(from, to, "sync mirror rename");
        self.backing
            .rename(from, to)
            .await
            .map_err(|e| StoreError::sync_operation(format!("rename from [{from}] to [{to}]"), e))
    }

    async fn acquire_lock(&self, name: &str) -> Result<EntryLock> {
        self.mirror.acquire_lock(name).await
    }

    /// No durability barrier is implemented; accepted and ignored
    async fn sync(&self, names: &[String]) -> Result<()> {
        trace!(entries = names.len(), "sync mirror ignores sync request");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.mirror.close().await?;
        self.backing.close().await?;
        debug!(backing = %self.backing.describe(), "sync mirror closed");
        Ok(())
    }

    fn describe(&self) -> String {
        format!("SyncMirror[{}]", self.backing.describe())
    }
}

/// Writer feeding the mirror and the backing store side by side
///
/// `finish()` publishes to the mirror first, then finishes the backing
/// writer; both happen before it returns.
pub struct SyncMirrorWriter<B: Directory> {
    name: String,
    mirror: MemWriter,
    backing: B::Writer,
    gate: Arc<Mutex<()>>,
}

impl<B: Directory> EntryWriter for SyncMirrorWriter<B> {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.mirror.write(data)?;
        self.backing
            .write(data)
            .map_err(|e| StoreError::sync_operation(format!("write [{}]", self.name), e))
    }

    fn position(&self) -> u64 {
        self.mirror.position()
    }

    fn checksum(&self) -> u32 {
        self.mirror.checksum()
    }

    async fn finish(self) -> Result<()> {
        let _gate = self.gate.lock().await;
        self.mirror.finish().await?;
        trace!(entry = %self.name, "sync mirror write");
        self.backing
            .finish()
            .await
            .map_err(|e| StoreError::sync_operation(format!("write [{}]", self.name), e))
    }
}
