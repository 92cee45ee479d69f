//! Shared test fixtures: a backing store with injectable faults and delays

#![allow(dead_code)]

use mirrordir::io::{self, MemWriter};
use mirrordir::{Directory, EntryLock, EntryReader, EntryWriter, MemDirectory, Result, StoreError};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Backing-store operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    List,
    Read,
    Write,
    Delete,
    Rename,
    Close,
}

/// Matches every entry name
pub const ANY: &str = "*";

struct Faults {
    failing: Mutex<HashSet<(Op, String)>>,
    panicking: Mutex<HashSet<(Op, String)>>,
    delay: Mutex<Duration>,
    applied: Mutex<Vec<String>>,
    closed: AtomicBool,
}

impl Faults {
    fn new() -> Self {
        Self {
            failing: Mutex::new(HashSet::new()),
            panicking: Mutex::new(HashSet::new()),
            delay: Mutex::new(Duration::ZERO),
            applied: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    fn matches(set: &Mutex<HashSet<(Op, String)>>, op: Op, name: &str) -> bool {
        let set = set.lock();
        set.contains(&(op, name.to_string())) || set.contains(&(op, ANY.to_string()))
    }

    fn check(&self, op: Op, name: &str) -> Result<()> {
        if Self::matches(&self.panicking, op, name) {
            panic!("injected {op:?} panic on [{name}]");
        }
        let failing = self.failing.lock();
        if failing.contains(&(op, name.to_string())) || failing.contains(&(op, ANY.to_string())) {
            return Err(StoreError::Backend(format!("injected {op:?} failure on [{name}]")));
        }
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    async fn pause(&self) {
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Backing store over a `MemDirectory` whose data outlives `close()`
///
/// Each handle has its own faults and closed flag; `reopen()` returns a
/// fresh handle over the same data, like reconnecting to a database.
pub struct FaultyDirectory {
    data: MemDirectory,
    faults: Arc<Faults>,
}

impl FaultyDirectory {
    pub fn new() -> Self {
        Self::over(MemDirectory::new())
    }

    pub fn over(data: MemDirectory) -> Self {
        Self {
            data,
            faults: Arc::new(Faults::new()),
        }
    }

    pub async fn with_entries(entries: &[(&str, &str)]) -> Self {
        let data = MemDirectory::new();
        for (name, text) in entries {
            io::write_entry(&data, name, text.as_bytes()).await.unwrap();
        }
        Self::over(data)
    }

    pub fn reopen(&self) -> Self {
        Self::over(self.data.clone())
    }

    pub fn fail(&self, op: Op, name: &str) {
        self.faults.failing.lock().insert((op, name.to_string()));
    }

    /// Make `op` on `name` panic instead of returning an error
    pub fn panic_on(&self, op: Op, name: &str) {
        self.faults.panicking.lock().insert((op, name.to_string()));
    }

    pub fn heal(&self) {
        self.faults.failing.lock().clear();
        self.faults.panicking.lock().clear();
    }

    /// Slow down every mutation by `delay`
    pub fn set_delay(&self, delay: Duration) {
        *self.faults.delay.lock() = delay;
    }

    /// Mutations that reached the data, in order
    pub fn applied(&self) -> Vec<String> {
        self.faults.applied.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.faults.closed.load(Ordering::Acquire)
    }

    /// Current contents of an entry, bypassing faults
    pub async fn peek(&self, name: &str) -> Option<Vec<u8>> {
        io::read_entry(&self.data, name).await.ok()
    }

    pub async fn names(&self) -> Vec<String> {
        self.data.list().await.unwrap()
    }
}

impl Directory for FaultyDirectory {
    type Writer = FaultyWriter;

    async fn list(&self) -> Result<Vec<String>> {
        self.faults.check(Op::List, ANY)?;
        self.data.list().await
    }

    async fn size(&self, name: &str) -> Result<u64> {
        self.faults.check(Op::Read, name)?;
        self.data.size(name).await
    }

    async fn open_read(&self, name: &str) -> Result<EntryReader> {
        self.faults.check(Op::Read, name)?;
        self.data.open_read(name).await
    }

    async fn open_write(&self, name: &str) -> Result<FaultyWriter> {
        Ok(FaultyWriter {
            inner: self.data.open_write(name).await?,
            faults: Arc::clone(&self.faults),
        })
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.faults.pause().await;
        self.faults.check(Op::Delete, name)?;
        self.data.delete(name).await?;
        self.faults.applied.lock().push(format!("delete {name}"));
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        self.faults.pause().await;
        self.faults.check(Op::Rename, from)?;
        self.data.rename(from, to).await?;
        self.faults.applied.lock().push(format!("rename {from} {to}"));
        Ok(())
    }

    async fn acquire_lock(&self, name: &str) -> Result<EntryLock> {
        self.data.acquire_lock(name).await
    }

    async fn sync(&self, _names: &[String]) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.faults.check(Op::Close, ANY)?;
        self.faults.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn describe(&self) -> String {
        "faulty".to_string()
    }
}

pub struct FaultyWriter {
    inner: MemWriter,
    faults: Arc<Faults>,
}

impl EntryWriter for FaultyWriter {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.inner.write(data)
    }

    fn position(&self) -> u64 {
        self.inner.position()
    }

    fn checksum(&self) -> u32 {
        self.inner.checksum()
    }

    async fn finish(self) -> Result<()> {
        self.faults.pause().await;
        self.faults.check(Op::Write, self.inner.name())?;
        let name = self.inner.name().to_string();
        let len = self.inner.position();
        self.inner.finish().await?;
        self.faults.applied.lock().push(format!("write {name} {len}"));
        Ok(())
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

pub async fn put<D: Directory>(dir: &D, name: &str, data: &[u8]) -> Result<()> {
    io::write_entry(dir, name, data).await
}

pub async fn get<D: Directory>(dir: &D, name: &str) -> Result<Vec<u8>> {
    io::read_entry(dir, name).await
}
