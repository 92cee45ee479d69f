//! Storage abstractions and the in-memory store
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │  Mirror directories                 │
//! │  - reads served by the mirror       │
//! │  - writes fanned out to both stores │
//! └─────────────────────────────────────┘
//!          ▲                  ▲
//!          │ owns             │ shares (Arc)
//!          ▼                  ▼
//! ┌──────────────────┐ ┌──────────────────┐
//! │  MemDirectory    │ │  backing store   │
//! │  (the mirror)    │ │  (any Directory) │
//! └──────────────────┘ └──────────────────┘
//! ```

pub mod lock;
pub mod memdir;
pub mod types;

pub use lock::{EntryLock, LockTable};
pub use memdir::{MemDirectory, MemWriter};
pub use types::{Directory, EntryReader, EntryWriter};

use crate::error::Result;

/// Read a whole entry
pub async fn read_entry<D: Directory>(dir: &D, name: &str) -> Result<Vec<u8>> {
    Ok(dir.open_read(name).await?.into_bytes())
}

/// Create or replace an entry with `data` in one step
pub async fn write_entry<D: Directory>(dir: &D, name: &str, data: &[u8]) -> Result<()> {
    let mut writer = dir.open_write(name).await?;
    writer.write(data)?;
    writer.finish().await
}
