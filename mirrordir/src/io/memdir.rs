//! In-memory implementation of `Directory`
//!
//! Serves as the mirror inside both wrappers and as a standalone store for
//! tests and single-process use.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

use super::lock::{EntryLock, LockTable};
use super::types::{Directory, EntryReader, EntryWriter};
use crate::error::{Result, StoreError};

struct Shared {
    // Entries are immutable once published; a rewrite swaps the whole value
    entries: Mutex<BTreeMap<String, Arc<[u8]>>>,
    closed: AtomicBool,
}

impl Shared {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

/// Map-based directory held entirely in memory
///
/// Entries are kept in a sorted map, so `list()` is ordered by name.
/// Clones share the same entries.
#[derive(Clone)]
pub struct MemDirectory {
    shared: Arc<Shared>,
    locks: LockTable,
}

impl MemDirectory {
    /// Create a new empty directory
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                entries: Mutex::new(BTreeMap::new()),
                closed: AtomicBool::new(false),
            }),
            locks: LockTable::new(),
        }
    }

    /// Copy every entry of `source` into a new directory.
    ///
    /// Blocks until the whole store is read. Any failure to enumerate or
    /// read `source` is returned as `Construction`.
    pub async fn load_from<D: Directory>(source: &D) -> Result<Self> {
        let dir = Self::new();
        let names = source.list().await.map_err(StoreError::construction)?;
        let mut total = 0usize;
        for name in &names {
            let data = source
                .open_read(name)
                .await
                .map_err(StoreError::construction)?
                .into_bytes();
            total += data.len();
            dir.shared
                .entries
                .lock()
                .insert(name.clone(), Arc::from(data));
        }
        debug!(
            source = %source.describe(),
            entries = names.len(),
            bytes = total,
            "loaded in-memory mirror"
        );
        Ok(dir)
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shared.entries.lock().is_empty()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    fn entry(&self, name: &str) -> Result<Arc<[u8]>> {
        self.shared.ensure_open()?;
        self.shared
            .entries
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }
}

impl Default for MemDirectory {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn check_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok(())
}

pub(crate) fn check_rename(from: &str, to: &str) -> Result<()> {
    check_name(from)?;
    check_name(to)?;
    if from == to {
        return Err(StoreError::InvalidRename {
            from: from.to_string(),
            to: to.to_string(),
            reason: "source and target are the same entry".to_string(),
        });
    }
    Ok(())
}

impl Directory for MemDirectory {
    type Writer = MemWriter;

    async fn list(&self) -> Result<Vec<String>> {
        self.shared.ensure_open()?;
        Ok(self.shared.entries.lock().keys().cloned().collect())
    }

    async fn size(&self, name: &str) -> Result<u64> {
        Ok(self.entry(name)?.len() as u64)
    }

    async fn open_read(&self, name: &str) -> Result<EntryReader> {
        let data = self.entry(name)?;
        Ok(EntryReader::new(name, data.to_vec()))
    }

    async fn open_write(&self, name: &str) -> Result<MemWriter> {
        self.shared.ensure_open()?;
        check_name(name)?;
        Ok(MemWriter {
            name: name.to_string(),
            data: Vec::new(),
            shared: Arc::clone(&self.shared),
        })
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.shared.ensure_open()?;
        self.shared
            .entries
            .lock()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        self.shared.ensure_open()?;
        check_rename(from, to)?;
        let mut entries = self.shared.entries.lock();
        let data = entries
            .remove(from)
            .ok_or_else(|| StoreError::NotFound(from.to_string()))?;
        entries.insert(to.to_string(), data);
        Ok(())
    }

    async fn acquire_lock(&self, name: &str) -> Result<EntryLock> {
        self.shared.ensure_open()?;
        self.locks.acquire(name)
    }

    async fn sync(&self, _names: &[String]) -> Result<()> {
        // Nothing to flush for in-memory storage
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.shared.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn describe(&self) -> String {
        format!("MemDirectory({} entries)", self.len())
    }
}

/// Writer for [`MemDirectory`]
///
/// Bytes stay private to the writer until `finish()` publishes them,
/// replacing any previous entry of the same name.
pub struct MemWriter {
    name: String,
    data: Vec<u8>,
    shared: Arc<Shared>,
}

impl MemWriter {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bytes written so far
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }
}

impl EntryWriter for MemWriter {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.data.extend_from_slice(data);
        Ok(())
    }

    fn position(&self) -> u64 {
        self.data.len() as u64
    }

    fn checksum(&self) -> u32 {
        crc32c::crc32c(&self.data)
    }

    async fn finish(self) -> Result<()> {
        self.shared.ensure_open()?;
        self.shared
            .entries
            .lock()
            .insert(self.name, Arc::from(self.data));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    async fn put(dir: &MemDirectory, name: &str, data: &[u8]) {
        let mut writer = dir.open_write(name).await.unwrap();
        writer.write(data).unwrap();
        writer.finish().await.unwrap();
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = MemDirectory::new();
        put(&dir, "segments_1", b"hello world").await;

        let mut reader = dir.open_read("segments_1").await.unwrap();
        let mut data = Vec::new();
        reader.read_to_end(&mut data).unwrap();
        assert_eq!(data, b"hello world");
        assert_eq!(dir.size("segments_1").await.unwrap(), 11);
    }

    #[tokio::test]
    async fn test_unfinished_writer_leaves_no_entry() {
        let dir = MemDirectory::new();
        let mut writer = dir.open_write("pending").await.unwrap();
        writer.write(b"data").unwrap();
        assert_eq!(writer.position(), 4);

        assert!(dir.list().await.unwrap().is_empty());
        drop(writer);
        assert!(dir.size("pending").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_write_overwrites() {
        let dir = MemDirectory::new();
        put(&dir, "a", b"initial data").await;
        put(&dir, "a", b"x").await;

        assert_eq!(dir.size("a").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_list_is_sorted() {
        let dir = MemDirectory::new();
        put(&dir, "b", b"").await;
        put(&dir, "a", b"").await;
        put(&dir, "c", b"").await;

        assert_eq!(dir.list().await.unwrap(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_rename_replaces_target() {
        let dir = MemDirectory::new();
        put(&dir, "from", b"new").await;
        put(&dir, "to", b"old").await;

        dir.rename("from", "to").await.unwrap();

        assert_eq!(dir.list().await.unwrap(), vec!["to"]);
        assert_eq!(dir.open_read("to").await.unwrap().into_bytes(), b"new");
    }

    #[tokio::test]
    async fn test_rename_rejects_missing_and_same_name() {
        let dir = MemDirectory::new();
        assert_eq!(
            dir.rename("nope", "x").await.unwrap_err(),
            StoreError::NotFound("nope".to_string())
        );

        put(&dir, "a", b"1").await;
        assert!(matches!(
            dir.rename("a", "a").await.unwrap_err(),
            StoreError::InvalidRename { .. }
        ));
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let dir = MemDirectory::new();
        assert!(dir.delete("ghost").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_reader_is_independent_of_later_writes() {
        let dir = MemDirectory::new();
        put(&dir, "a", b"one").await;
        let reader = dir.open_read("a").await.unwrap();
        put(&dir, "a", b"two").await;

        assert_eq!(reader.into_bytes(), b"one");
    }

    #[tokio::test]
    async fn test_closed_directory_refuses_work() {
        let dir = MemDirectory::new();
        put(&dir, "a", b"1").await;
        let writer = dir.open_write("b").await.unwrap();
        dir.close().await.unwrap();

        assert_eq!(dir.list().await.unwrap_err(), StoreError::Closed);
        assert_eq!(writer.finish().await.unwrap_err(), StoreError::Closed);
    }

    #[tokio::test]
    async fn test_load_from_copies_every_entry() {
        let source = MemDirectory::new();
        put(&source, "a", b"1").await;
        put(&source, "b", b"22").await;

        let copy = MemDirectory::load_from(&source).await.unwrap();
        put(&source, "a", b"changed").await;

        assert_eq!(copy.len(), 2);
        assert_eq!(copy.open_read("a").await.unwrap().into_bytes(), b"1");
        assert_eq!(copy.size("b").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_load_from_closed_source_is_construction_failure() {
        let source = MemDirectory::new();
        source.close().await.unwrap();

        let err = MemDirectory::load_from(&source).await.err().unwrap();
        assert_eq!(err, StoreError::construction(StoreError::Closed));
    }
}
