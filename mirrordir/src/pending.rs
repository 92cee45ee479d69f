//! Backing-store mutations captured for later replay

use std::fmt;

use crate::error::Result;
use crate::io::{self, Directory};

/// A mutation that has already been applied to the mirror and still has to
/// reach the backing store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingOp {
    /// Replace the whole entry with `data`
    Write { name: String, data: Vec<u8> },
    Delete { name: String },
    Rename { from: String, to: String },
}

impl PendingOp {
    /// Perform the equivalent mutation against `backing`
    pub async fn apply<B: Directory>(&self, backing: &B) -> Result<()> {
        match self {
            Self::Write { name, data } => io::write_entry(backing, name, data).await,
            Self::Delete { name } => backing.delete(name).await,
            Self::Rename { from, to } => backing.rename(from, to).await,
        }
    }
}

impl fmt::Display for PendingOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Write { name, data } => write!(f, "write [{name}] ({} bytes)", data.len()),
            Self::Delete { name } => write!(f, "delete [{name}]"),
            Self::Rename { from, to } => write!(f, "rename from [{from}] to [{to}]"),
        }
    }
}
