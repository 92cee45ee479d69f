//! Single-worker, strictly ordered task queue
//!
//! Producers on any thread `submit()` boxed futures; one worker awaits them
//! one at a time in the order they landed in the channel. Nothing is ever
//! run concurrently with anything else from the same queue. A task that
//! panics is logged and counted as finished; the worker moves on.
//!
//! # Shutdown
//!
//! ```text
//! shutdown()            -> submission side closed, queued tasks keep running
//! await_termination(t)  -> true once the worker has run everything and exited
//!                          false if `t` elapsed first (the worker keeps going)
//! ```

use futures::FutureExt;
use parking_lot::Mutex;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, trace};

use crate::error::{Result, StoreError};

/// Unit of work accepted by the queue
pub type Task = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Ordered executor with exactly one consumer
pub struct TaskQueue {
    name: String,
    sender: Mutex<Option<mpsc::UnboundedSender<Task>>>,
    pending: Arc<AtomicUsize>,
    terminated: watch::Receiver<bool>,
}

impl TaskQueue {
    /// Start a worker on its own OS thread named `name`.
    ///
    /// The thread drives a current-thread tokio runtime, so tasks may use
    /// tokio timers but never compete with the caller's runtime.
    pub fn dedicated(name: &str) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(|e| StoreError::Backend(format!("cannot build worker runtime: {e}")))?;
        let (queue, worker) = Self::parts(name);
        std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || runtime.block_on(worker))
            .map_err(|e| StoreError::Backend(format!("cannot spawn worker thread: {e}")))?;
        Ok(queue)
    }

    /// Start the worker as a task on the runtime the caller is running on.
    ///
    /// Fails with `Backend` outside a tokio runtime.
    pub fn on_current_runtime(name: &str) -> Result<Self> {
        let handle = Handle::try_current()
            .map_err(|e| StoreError::Backend(format!("no runtime for queue {name}: {e}")))?;
        let (queue, worker) = Self::parts(name);
        handle.spawn(worker);
        Ok(queue)
    }

    fn parts(name: &str) -> (Self, impl Future<Output = ()> + Send + 'static) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = watch::channel(false);
        let pending = Arc::new(AtomicUsize::new(0));
        let worker = run_worker(name.to_string(), rx, Arc::clone(&pending), done_tx);
        let queue = Self {
            name: name.to_string(),
            sender: Mutex::new(Some(tx)),
            pending,
            terminated: done_rx,
        };
        (queue, worker)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enqueue a task behind everything already submitted.
    ///
    /// Fails with `QueueClosed` once `shutdown()` has been called.
    pub fn submit<F>(&self, task: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let sender = self.sender.lock();
        let Some(tx) = sender.as_ref() else {
            return Err(StoreError::QueueClosed);
        };
        self.pending.fetch_add(1, Ordering::AcqRel);
        if tx.send(Box::pin(task)).is_err() {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            return Err(StoreError::QueueClosed);
        }
        Ok(())
    }

    /// Stop accepting submissions. Already queued tasks still run.
    pub fn shutdown(&self) {
        if self.sender.lock().take().is_some() {
            debug!(queue = %self.name, pending = self.pending(), "task queue shutting down");
        }
    }

    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.sender.lock().is_none()
    }

    /// True once the worker has exited
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        *self.terminated.borrow()
    }

    /// Tasks submitted but not yet finished
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Wait up to `timeout` for the worker to finish everything and exit.
    ///
    /// Only meaningful after `shutdown()`; otherwise the worker keeps
    /// waiting for more work and this times out. Returns whether the queue
    /// drained in time. A timeout abandons the wait, not the tasks.
    pub async fn await_termination(&self, timeout: Duration) -> bool {
        let mut terminated = self.terminated.clone();
        let waited = tokio::time::timeout(timeout, terminated.wait_for(|done| *done)).await;
        matches!(waited, Ok(Ok(_)))
    }
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("name", &self.name)
            .field("pending", &self.pending())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

async fn run_worker(
    name: String,
    mut rx: mpsc::UnboundedReceiver<Task>,
    pending: Arc<AtomicUsize>,
    done: watch::Sender<bool>,
) {
    trace!(queue = %name, "worker started");
    while let Some(task) = rx.recv().await {
        if let Err(panic) = AssertUnwindSafe(task).catch_unwind().await {
            error!(queue = %name, panic = %panic_message(&*panic), "queued task panicked");
        }
        pending.fetch_sub(1, Ordering::AcqRel);
    }
    trace!(queue = %name, "worker drained");
    done.send_replace(true);
}

/// Text of a caught panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
