//! Observability hook for failures nobody is waiting on
//!
//! Queued backing-store operations run after their caller has returned, and
//! a drain timeout during close is not an error of `close()`. Both are
//! reported as [`MirrorEvent`]s to an injected [`EventSink`].

use parking_lot::Mutex;
use std::time::Duration;
use tracing::{debug, error};

use crate::error::StoreError;

/// Something that happened in the background of a mirror
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorEvent {
    /// A queued backing-store operation failed; the queue moved on
    AsyncOperationFailed {
        backing: String,
        operation: String,
        error: StoreError,
    },
    /// Close stopped waiting for queued work before it finished
    DrainTimedOut {
        backing: String,
        timeout: Duration,
        pending: usize,
    },
    /// Close observed an empty queue before the deadline
    DrainCompleted { backing: String },
}

/// Receiver of [`MirrorEvent`]s
pub trait EventSink: Send + Sync {
    fn record(&self, event: &MirrorEvent);
}

/// Default sink: emits `tracing` records
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, event: &MirrorEvent) {
        match event {
            MirrorEvent::AsyncOperationFailed {
                backing,
                operation,
                error,
            } => {
                error!(%backing, %operation, %error, "async mirror operation failed");
            }
            MirrorEvent::DrainTimedOut {
                backing,
                timeout,
                pending,
            } => {
                error!(
                    %backing,
                    ?timeout,
                    pending,
                    "async mirror failed to wait for async tasks to shutdown"
                );
            }
            MirrorEvent::DrainCompleted { backing } => {
                debug!(%backing, "async mirror drained");
            }
        }
    }
}

/// Sink that keeps every event in memory
#[derive(Debug, Default)]
pub struct CapturingSink {
    events: Mutex<Vec<MirrorEvent>>,
}

impl CapturingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far
    #[must_use]
    pub fn events(&self) -> Vec<MirrorEvent> {
        self.events.lock().clone()
    }

    /// Failed operations, as their display strings
    #[must_use]
    pub fn failed_operations(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                MirrorEvent::AsyncOperationFailed { operation, .. } => Some(operation.clone()),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn drain_timed_out(&self) -> bool {
        self.events
            .lock()
            .iter()
            .any(|event| matches!(event, MirrorEvent::DrainTimedOut { .. }))
    }
}

impl EventSink for CapturingSink {
    fn record(&self, event: &MirrorEvent) {
        self.events.lock().push(event.clone());
    }
}
