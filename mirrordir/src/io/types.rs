//! Storage interface shared by backing stores and mirrors

use std::future::Future;
use std::io::{Cursor, Read, Seek, SeekFrom};

use super::lock::EntryLock;
use crate::error::Result;

/// Capability set of a directory of named byte entries
///
/// Backing stores, the in-memory store and both mirror wrappers implement
/// this trait. Implementations decide their own thread-safety; the mirror
/// wrappers only ever touch a backing store from one actor at a time.
pub trait Directory: Send + Sync + 'static {
    /// Handle returned by [`Directory::open_write`]
    type Writer: EntryWriter;

    /// Names of all entries
    fn list(&self) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Length of an entry in bytes.
    ///
    /// Fails with `NotFound` if the entry is absent.
    fn size(&self, name: &str) -> impl Future<Output = Result<u64>> + Send;

    /// Open an entry for reading, positioned at offset 0.
    ///
    /// Fails with `NotFound` if the entry is absent.
    fn open_read(&self, name: &str) -> impl Future<Output = Result<EntryReader>> + Send;

    /// Open an entry for writing.
    ///
    /// Creates or truncates. The bytes only become visible once the writer
    /// is finished.
    fn open_write(&self, name: &str) -> impl Future<Output = Result<Self::Writer>> + Send;

    /// Delete an entry. Fails with `NotFound` if the entry is absent.
    fn delete(&self, name: &str) -> impl Future<Output = Result<()>> + Send;

    /// Rename an entry, replacing `to` if it exists.
    ///
    /// Fails with `NotFound` if `from` is absent.
    fn rename(&self, from: &str, to: &str) -> impl Future<Output = Result<()>> + Send;

    /// Obtain a named lock
    fn acquire_lock(&self, name: &str) -> impl Future<Output = Result<EntryLock>> + Send;

    /// Durability barrier for the given entries
    fn sync(&self, names: &[String]) -> impl Future<Output = Result<()>> + Send;

    /// Release the store
    fn close(&self) -> impl Future<Output = Result<()>> + Send;

    /// Human-readable identity used in log records and thread names
    fn describe(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}

/// Writable handle for one entry
///
/// Bytes are buffered until [`EntryWriter::finish`] is awaited.
pub trait EntryWriter: Send + Sized {
    /// Append bytes
    fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Number of bytes written so far
    fn position(&self) -> u64;

    /// CRC32C of the bytes written so far
    fn checksum(&self) -> u32;

    /// Publish the entry
    fn finish(self) -> impl Future<Output = Result<()>> + Send;
}

/// Positioned reader over an independent copy of an entry
#[derive(Debug, Clone)]
pub struct EntryReader {
    name: String,
    inner: Cursor<Vec<u8>>,
}

impl EntryReader {
    #[must_use]
    pub fn new(name: &str, data: Vec<u8>) -> Self {
        Self {
            name: name.to_string(),
            inner: Cursor::new(data),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Total length of the entry
    #[must_use]
    pub fn len(&self) -> u64 {
        self.inner.get_ref().len() as u64
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.get_ref().is_empty()
    }

    /// Consume the reader, returning the whole entry regardless of position
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.inner.into_inner()
    }
}

impl Read for EntryReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Seek for EntryReader {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.inner.seek(pos)
    }
}
