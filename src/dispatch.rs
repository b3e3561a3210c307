//! Bounded-queue dispatch worker.
//!
//! Decouples frame arrival from application processing: the transport side
//! pushes decoded updates into a bounded channel, a single consumer task
//! pulls them in FIFO order and invokes the registered handler. Cancellation
//! is cooperative; the worker wakes from an empty queue within the poll
//! interval to observe a stop request.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::debug;

/// Default wait bound for one queue poll.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Single-consumer execution unit over a bounded queue.
///
/// The channel capacity is the producer's policy: create the channel with
/// whatever bound the transport wants and hand the receiver here. The worker
/// adds no further buffering.
///
/// # Example
///
/// ```rust,ignore
/// let (tx, rx) = tokio::sync::mpsc::channel(64);
/// let mut worker = DispatchWorker::new(rx, |update| process(update));
/// worker.start();
/// // ... tx.send(update).await ...
/// worker.stop();
/// ```
pub struct DispatchWorker<T> {
    rx: Option<mpsc::Receiver<T>>,
    handler: Option<Box<dyn FnMut(T) + Send>>,
    poll_interval: Duration,
    cancelled: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> DispatchWorker<T> {
    /// Create a worker consuming `rx` with the given handler.
    pub fn new<F>(rx: mpsc::Receiver<T>, handler: F) -> Self
    where
        F: FnMut(T) + Send + 'static,
    {
        Self {
            rx: Some(rx),
            handler: Some(Box::new(handler)),
            poll_interval: DEFAULT_POLL_INTERVAL,
            cancelled: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }

    /// Set the queue poll interval, the upper bound on cancellation latency.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Begin consuming. No-op if the worker is already running.
    pub fn start(&mut self) {
        if self.task.is_some() {
            return;
        }
        let (Some(mut rx), Some(mut handler)) = (self.rx.take(), self.handler.take()) else {
            // Already ran to completion once; start() stays a no-op
            return;
        };

        let cancelled = Arc::clone(&self.cancelled);
        let poll_interval = self.poll_interval;

        self.task = Some(tokio::spawn(async move {
            loop {
                if cancelled.load(Ordering::Acquire) {
                    break;
                }
                match timeout(poll_interval, rx.recv()).await {
                    Ok(Some(item)) => {
                        // Re-check so no invocation begins after stop()
                        if cancelled.load(Ordering::Acquire) {
                            break;
                        }
                        handler(item);
                    }
                    // All producers dropped; nothing more will arrive
                    Ok(None) => break,
                    // Poll bound elapsed; loop to observe cancellation
                    Err(_) => {}
                }
            }
            debug!("dispatch worker loop exited");
        }));
    }

    /// Check if the consumer task is currently running.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Request cooperative cancellation.
    ///
    /// A handler invocation already in progress completes; no new invocation
    /// begins once the flag is observed. The loop exits within one poll
    /// interval even if the queue stays empty.
    pub fn stop(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Wait for the consumer loop to exit.
    pub async fn join(&mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}
