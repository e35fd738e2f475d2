//! Bounded FIFO job queue between admission and the worker pool.

use std::sync::atomic::{AtomicBool, AtomicIsize, Ordering};
use std::sync::Arc;

use fxquote_common::{CurrencyPair, QuoteError, QuoteId};
use thiserror::Error;
use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::error;

use crate::config::BackpressurePolicy;

/// One unit of background work, matching a pending quote record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: QuoteId,
    pub pair: CurrencyPair,
}

/// Queue push failures.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    #[error("job queue is full")]
    Full,
    #[error("job queue is closed")]
    Closed,
}

impl From<QueueError> for QuoteError {
    fn from(err: QueueError) -> Self {
        QuoteError::QueueUnavailable(err.to_string())
    }
}

/// Producer side of the job queue.
///
/// `push` holds a read lock on the sender for the whole send, and `close`
/// takes the write lock, so closing waits for sends already in progress.
pub struct JobQueue {
    sender: RwLock<Option<mpsc::Sender<Job>>>,
    receiver: Arc<JobReceiver>,
    capacity: usize,
    backpressure: BackpressurePolicy,
    closed: AtomicBool,
    depth: Arc<AtomicIsize>,
}

impl JobQueue {
    /// Create a queue holding at most `capacity` jobs.
    pub fn new(capacity: usize, backpressure: BackpressurePolicy) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let depth = Arc::new(AtomicIsize::new(0));

        Self {
            sender: RwLock::new(Some(tx)),
            receiver: Arc::new(JobReceiver {
                inner: Mutex::new(rx),
                depth: depth.clone(),
            }),
            capacity,
            backpressure,
            closed: AtomicBool::new(false),
            depth,
        }
    }

    /// Shared consumer handle.
    pub fn receiver(&self) -> Arc<JobReceiver> {
        self.receiver.clone()
    }

    /// Enqueue a job according to the backpressure policy.
    pub async fn push(&self, job: Job) -> Result<(), QueueError> {
        let guard = self.sender.read().await;
        let Some(sender) = guard.as_ref() else {
            error!(job_id = %job.id, pair = %job.pair, "Push on a closed job queue");
            return Err(QueueError::Closed);
        };

        let result = match self.backpressure {
            BackpressurePolicy::FailFast => sender.try_send(job).map_err(|e| match e {
                TrySendError::Full(_) => QueueError::Full,
                TrySendError::Closed(_) => QueueError::Closed,
            }),
            BackpressurePolicy::Wait(timeout) => {
                sender.send_timeout(job, timeout).await.map_err(|e| match e {
                    SendTimeoutError::Timeout(_) => QueueError::Full,
                    SendTimeoutError::Closed(_) => QueueError::Closed,
                })
            }
        };

        if result.is_ok() {
            self.depth.fetch_add(1, Ordering::SeqCst);
        }
        result
    }

    /// Stop accepting jobs. Returns `true` on the first call only.
    pub async fn close(&self) -> bool {
        let mut sender = self.sender.write().await;
        self.closed.store(true, Ordering::SeqCst);
        sender.take().is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of buffered jobs.
    ///
    /// Sends are counted once they land, so a worker may briefly take a job
    /// before it is counted. The result is clamped to `0..=capacity`.
    pub fn len(&self) -> usize {
        self.depth.load(Ordering::SeqCst).clamp(0, self.capacity as isize) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Consumer side of the job queue, shared by every worker.
pub struct JobReceiver {
    inner: Mutex<mpsc::Receiver<Job>>,
    depth: Arc<AtomicIsize>,
}

impl JobReceiver {
    /// Wait for the next job. `None` once the queue is closed and empty.
    pub async fn recv(&self) -> Option<Job> {
        let job = self.inner.lock().await.recv().await;
        if job.is_some() {
            self.depth.fetch_sub(1, Ordering::SeqCst);
        }
        job
    }

    /// Take a buffered job without waiting.
    pub async fn try_recv(&self) -> Option<Job> {
        let job = self.inner.lock().await.try_recv().ok();
        if job.is_some() {
            self.depth.fetch_sub(1, Ordering::SeqCst);
        }
        job
    }

    /// Take every buffered job without waiting.
    pub async fn drain(&self) -> Vec<Job> {
        let mut rx = self.inner.lock().await;
        let mut jobs = Vec::new();
        while let Ok(job) = rx.try_recv() {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            jobs.push(job);
        }
        jobs
    }
}
