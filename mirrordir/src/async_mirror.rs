//! Mirror that replays writes to the backing store in the background
//!
//! The backing store is read into memory once, when the mirror is created.
//! Reads are served by the in-memory copy only. Every mutation is applied to
//! the in-memory copy on the calling task and then queued, as a
//! [`PendingOp`], for a single background worker that replays it against
//! the backing store. Callers never wait for the backing store.
//!
//! # Ordering
//!
//! Applying a mutation to the mirror and queueing its backing counterpart
//! happen under one gate, so the backing store sees mutations in exactly the
//! order the mirror did.
//!
//! # Failures
//!
//! A queued operation that fails, or panics, is reported to the
//! [`EventSink`] and the worker moves on. The entry stays divergent until a
//! later successful operation on the same name.
//!
//! # Close
//!
//! ```text
//! Open ──close()──▶ Closing ──────────────────────────────────▶ Closed
//!                   1. close the mirror
//!                   2. stop accepting queued work
//!                   3. wait up to `drain_timeout` for the queue
//!                   4. close the backing store (drained or not)
//! ```
//!
//! If the wait times out, the backing store is closed while an operation
//! may still be running against it. What happens to that operation is up
//! to the backing store.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::Mutex;
use tracing::{debug, trace};

use crate::config::MirrorConfig;
use crate::error::{Result, StoreError};
use crate::io::{Directory, EntryLock, EntryReader, EntryWriter, MemDirectory, MemWriter};
use crate::observe::{EventSink, MirrorEvent, TracingSink};
use crate::pending::PendingOp;
use crate::task_queue::{panic_message, TaskQueue};

const OPEN: u8 = 0;
const CLOSING: u8 = 1;
const CLOSED: u8 = 2;

/// Lifecycle of an [`AsyncMirrorDirectory`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorState {
    Open,
    Closing,
    Closed,
}

struct Inner<B: Directory> {
    backing: Arc<B>,
    backing_name: String,
    mirror: MemDirectory,
    queue: TaskQueue,
    sink: Arc<dyn EventSink>,
    drain_timeout: Duration,
    gate: Mutex<()>,
    state: AtomicU8,
}

impl<B: Directory> Inner<B> {
    fn ensure_open(&self) -> Result<()> {
        if self.state.load(Ordering::Acquire) != OPEN {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    /// Queue `op` for the worker. Must be called with the gate held.
    fn submit(&self, op: PendingOp) -> Result<()> {
        trace!(backing = %self.backing_name, operation = %op, "queueing backing operation");
        let backing = Arc::clone(&self.backing);
        let sink = Arc::clone(&self.sink);
        let backing_name = self.backing_name.clone();
        self.queue.submit(async move {
            let outcome = AssertUnwindSafe(op.apply(backing.as_ref()))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    Err(StoreError::Backend(format!(
                        "panicked: {}",
                        panic_message(&*panic)
                    )))
                });
            if let Err(error) = outcome {
                sink.record(&MirrorEvent::AsyncOperationFailed {
                    backing: backing_name,
                    operation: op.to_string(),
                    error,
                });
            }
        })
    }
}

/// Write-behind in-memory mirror of `B`
pub struct AsyncMirrorDirectory<B: Directory> {
    inner: Arc<Inner<B>>,
}

impl<B: Directory> AsyncMirrorDirectory<B> {
    /// Mirror `backing` with default settings, a dedicated worker thread and
    /// `tracing` as the event sink
    pub async fn new(backing: Arc<B>) -> Result<Self> {
        Self::builder(backing).open().await
    }

    pub fn builder(backing: Arc<B>) -> AsyncMirrorBuilder<B> {
        AsyncMirrorBuilder {
            backing,
            config: MirrorConfig::default(),
            queue: None,
            sink: None,
        }
    }

    #[must_use]
    pub fn backing(&self) -> &Arc<B> {
        &self.inner.backing
    }

    #[must_use]
    pub fn mirror(&self) -> &MemDirectory {
        &self.inner.mirror
    }

    /// Backing operations queued or running
    #[must_use]
    pub fn pending_operations(&self) -> usize {
        self.inner.queue.pending()
    }

    #[must_use]
    pub fn state(&self) -> MirrorState {
        match self.inner.state.load(Ordering::Acquire) {
            OPEN => MirrorState::Open,
            CLOSING => MirrorState::Closing,
            _ => MirrorState::Closed,
        }
    }

    async fn shut_down(&self) -> Result<()> {
        let inner = &self.inner;
        // Under the gate, every mutation either made it into the queue or
        // sees the closed state
        let mirror_closed = {
            let _gate = inner.gate.lock().await;
            let closed = inner.mirror.close().await;
            inner.queue.shutdown();
            closed
        };

        debug!(
            backing = %inner.backing_name,
            timeout = ?inner.drain_timeout,
            pending = inner.queue.pending(),
            "async mirror closing, waiting for queued tasks to finish"
        );
        if inner.queue.await_termination(inner.drain_timeout).await {
            inner.sink.record(&MirrorEvent::DrainCompleted {
                backing: inner.backing_name.clone(),
            });
        } else {
            inner.sink.record(&MirrorEvent::DrainTimedOut {
                backing: inner.backing_name.clone(),
                timeout: inner.drain_timeout,
                pending: inner.queue.pending(),
            });
        }

        let backing_closed = inner.backing.close().await;
        mirror_closed.and(backing_closed)
    }
}

impl<B: Directory> Directory for AsyncMirrorDirectory<B> {
    type Writer = AsyncMirrorWriter<B>;

    async fn list(&self) -> Result<Vec<String>> {
        self.inner.mirror.list().await
    }

    async fn size(&self, name: &str) -> Result<u64> {
        self.inner.mirror.size(name).await
    }

    async fn open_read(&self, name: &str) -> Result<EntryReader> {
        self.inner.mirror.open_read(name).await
    }

    async fn open_write(&self, name: &str) -> Result<AsyncMirrorWriter<B>> {
        self.inner.ensure_open()?;
        let mirror = self.inner.mirror.open_write(name).await?;
        Ok(AsyncMirrorWriter {
            mirror,
            inner: Arc::clone(&self.inner),
        })
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let _gate = self.inner.gate.lock().await;
        self.inner.ensure_open()?;
        self.inner.mirror.delete(name).await?;
        self.inner.submit(PendingOp::Delete {
            name: name.to_string(),
        })
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let _gate = self.inner.gate.lock().await;
        self.inner.ensure_open()?;
        self.inner.mirror.rename(from, to).await?;
        self.inner.submit(PendingOp::Rename {
            from: from.to_string(),
            to: to.to_string(),
        })
    }

    async fn acquire_lock(&self, name: &str) -> Result<EntryLock> {
        self.inner.mirror.acquire_lock(name).await
    }

    /// No durability barrier is implemented; accepted and ignored
    async fn sync(&self, names: &[String]) -> Result<()> {
        trace!(entries = names.len(), "async mirror ignores sync request");
        Ok(())
    }

    /// Best-effort shutdown.
    ///
    /// A drain timeout is reported to the event sink, never returned. Errors
    /// from closing the mirror or the backing store are returned. Closing
    /// twice is a no-op.
    async fn close(&self) -> Result<()> {
        if self
            .inner
            .state
            .compare_exchange(OPEN, CLOSING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }
        let result = self.shut_down().await;
        self.inner.state.store(CLOSED, Ordering::Release);
        debug!(backing = %self.inner.backing_name, "async mirror closed");
        result
    }

    fn describe(&self) -> String {
        format!("AsyncMirror[{}]", self.inner.backing_name)
    }
}

/// Writer that buffers in the mirror only
///
/// `finish()` publishes the entry to the mirror and queues one task that
/// copies the final bytes to the backing store.
pub struct AsyncMirrorWriter<B: Directory> {
    mirror: MemWriter,
    inner: Arc<Inner<B>>,
}

impl<B: Directory> EntryWriter for AsyncMirrorWriter<B> {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.mirror.write(data)
    }

    fn position(&self) -> u64 {
        self.mirror.position()
    }

    fn checksum(&self) -> u32 {
        self.mirror.checksum()
    }

    async fn finish(self) -> Result<()> {
        let _gate = self.inner.gate.lock().await;
        self.inner.ensure_open()?;
        let op = PendingOp::Write {
            name: self.mirror.name().to_string(),
            data: self.mirror.bytes().to_vec(),
        };
        self.mirror.finish().await?;
        self.inner.submit(op)
    }
}

/// Options for [`AsyncMirrorDirectory`]
pub struct AsyncMirrorBuilder<B: Directory> {
    backing: Arc<B>,
    config: MirrorConfig,
    queue: Option<TaskQueue>,
    sink: Option<Arc<dyn EventSink>>,
}

impl<B: Directory> AsyncMirrorBuilder<B> {
    #[must_use]
    pub fn config(mut self, config: MirrorConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.with_drain_timeout(timeout);
        self
    }

    /// Run backing operations on `queue` instead of a dedicated thread
    #[must_use]
    pub fn queue(mut self, queue: TaskQueue) -> Self {
        self.queue = Some(queue);
        self
    }

    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Snapshot the backing store and start the worker.
    ///
    /// Fails with `Construction` if the backing store cannot be listed or
    /// read; no worker is started in that case.
    pub async fn open(self) -> Result<AsyncMirrorDirectory<B>> {
        let mirror = MemDirectory::load_from(self.backing.as_ref()).await?;
        let backing_name = self.backing.describe();
        let queue = match self.queue {
            Some(queue) => queue,
            None => TaskQueue::dedicated(&self.config.worker_name_for(&backing_name))?,
        };
        debug!(
            backing = %backing_name,
            entries = mirror.len(),
            queue = queue.name(),
            "async mirror opened"
        );
        Ok(AsyncMirrorDirectory {
            inner: Arc::new(Inner {
                backing: self.backing,
                backing_name,
                mirror,
                queue,
                sink: self.sink.unwrap_or_else(|| Arc::new(TracingSink)),
                drain_timeout: self.config.drain_timeout(),
                gate: Mutex::new(()),
                state: AtomicU8::new(OPEN),
            }),
        })
    }
}
