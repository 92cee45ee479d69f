//! Error types shared by every store and mirror

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by directory operations
///
/// Only failures a caller can still act on end up here. Failures of queued
/// backing-store work in the async mirror never reach a caller; they are
/// reported through an [`EventSink`](crate::observe::EventSink) instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("entry not found: {0}")]
    NotFound(String),

    #[error("invalid entry name: {0:?}")]
    InvalidName(String),

    #[error("cannot rename [{from}] to [{to}]: {reason}")]
    InvalidRename {
        from: String,
        to: String,
        reason: String,
    },

    #[error("lock already held: {0}")]
    LockHeld(String),

    #[error("directory is closed")]
    Closed,

    #[error("task queue no longer accepts work")]
    QueueClosed,

    #[error("backend failure: {0}")]
    Backend(String),

    /// The one-time snapshot of the backing store could not be taken
    #[error("failed to load mirror from backing store")]
    Construction(#[source] Box<StoreError>),

    /// The backing store rejected a mutation that the mirror already applied
    #[error("backing store failed to {operation}")]
    SyncOperation {
        operation: String,
        #[source]
        source: Box<StoreError>,
    },
}

impl StoreError {
    pub(crate) fn construction(source: Self) -> Self {
        Self::Construction(Box::new(source))
    }

    pub(crate) fn sync_operation(operation: impl Into<String>, source: Self) -> Self {
        Self::SyncOperation {
            operation: operation.into(),
            source: Box::new(source),
        }
    }

    /// True for a lookup failure, including one wrapped by a mirror
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Construction(source) | Self::SyncOperation { source, .. } => {
                source.is_not_found()
            }
            _ => false,
        }
    }
}
