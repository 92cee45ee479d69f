//! In-memory mirrors for slow or remote directories
//!
//! A mirror loads every entry of a backing [`Directory`] into memory when it
//! is created, serves all reads from that copy, and propagates writes to the
//! backing store either before returning ([`SyncMirrorDirectory`]) or through
//! a single ordered background worker ([`AsyncMirrorDirectory`]).
//!
//! Mirrors assume a single writer: exactly one process may mutate a given
//! backing store at a time. Locks handed out by a mirror only coordinate
//! access to that mirror.
//!
//! ```
//! use mirrordir::{io, AsyncMirrorDirectory, Directory, MemDirectory};
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> mirrordir::Result<()> {
//! let backing = Arc::new(MemDirectory::new());
//! let mirror = AsyncMirrorDirectory::new(Arc::clone(&backing)).await?;
//!
//! io::write_entry(&mirror, "segments_1", &[1, 2, 3]).await?;
//! assert_eq!(mirror.size("segments_1").await?, 3);
//!
//! mirror.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod async_mirror;
pub mod config;
pub mod error;
pub mod io;
pub mod observe;
pub mod pending;
pub mod sync_mirror;
pub mod task_queue;

pub use async_mirror::{AsyncMirrorBuilder, AsyncMirrorDirectory, AsyncMirrorWriter, MirrorState};
pub use config::{MirrorConfig, DEFAULT_DRAIN_TIMEOUT};
pub use error::{Result, StoreError};
pub use io::{Directory, EntryLock, EntryReader, EntryWriter, MemDirectory};
pub use observe::{CapturingSink, EventSink, MirrorEvent, TracingSink};
pub use pending::PendingOp;
pub use sync_mirror::{SyncMirrorDirectory, SyncMirrorWriter};
pub use task_queue::TaskQueue;
