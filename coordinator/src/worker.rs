//! Worker pool draining the job queue.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use fxquote_common::StatusUpdate;
use fxquote_fx::{FetchError, RateFetcher};
use fxquote_store::QuoteStore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{DrainPolicy, WorkerConfig};
use crate::metrics::SharedMetrics;
use crate::queue::{Job, JobReceiver};

/// Everything a worker needs, shared by the whole pool.
pub struct WorkerContext {
    pub store: Arc<dyn QuoteStore>,
    pub fetcher: Arc<dyn RateFetcher>,
    pub receiver: Arc<JobReceiver>,
    pub metrics: SharedMetrics,
    pub fetch_timeout: Duration,
    pub processing_delay: Duration,
    pub drain_policy: DrainPolicy,
}

impl WorkerContext {
    pub fn new(
        config: &WorkerConfig,
        store: Arc<dyn QuoteStore>,
        fetcher: Arc<dyn RateFetcher>,
        receiver: Arc<JobReceiver>,
        metrics: SharedMetrics,
    ) -> Self {
        Self {
            store,
            fetcher,
            receiver,
            metrics,
            fetch_timeout: config.fetch_timeout,
            processing_delay: config.processing_delay,
            drain_policy: config.drain_policy,
        }
    }
}

/// What happened to a processed job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    /// Rate fetched and written.
    Completed,
    /// Fetch failed and the Error status was written.
    Failed(FetchError),
    /// The store refused the result.
    WriteFailed,
    /// Processing panicked and the Error status was written.
    Panicked,
}

/// A single pool member.
pub struct Worker {
    id: usize,
    ctx: Arc<WorkerContext>,
}

impl Worker {
    pub fn new(id: usize, ctx: Arc<WorkerContext>) -> Self {
        Self { id, ctx }
    }

    /// Run until cancelled or until the queue is closed and empty.
    pub async fn run(self, cancel: CancellationToken) {
        let _active = ActiveWorker::new(&self.ctx.metrics);
        debug!(worker = self.id, "Worker started");

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    if self.ctx.drain_policy == DrainPolicy::DrainToCompletion {
                        while let Some(job) = self.ctx.receiver.try_recv().await {
                            self.handle(job).await;
                        }
                    }
                    debug!(worker = self.id, policy = %self.ctx.drain_policy, "Worker cancelled");
                    break;
                }
                job = self.ctx.receiver.recv() => match job {
                    Some(job) => {
                        self.handle(job).await;
                    }
                    None => {
                        debug!(worker = self.id, "Job queue closed");
                        break;
                    }
                },
            }
        }
    }

    /// Process one job, containing any panic to that job.
    ///
    /// A panicking job is marked `Error` and the worker moves on.
    pub async fn handle(&self, job: Job) -> JobOutcome {
        let id = job.id;
        let pair = job.pair.clone();

        let panic = match AssertUnwindSafe(self.process(job)).catch_unwind().await {
            Ok(outcome) => return outcome,
            Err(panic) => panic,
        };

        error!(
            worker = self.id,
            job_id = %id,
            pair = %pair,
            panic = panic_message(panic.as_ref()),
            "Job panicked"
        );
        self.ctx.metrics.job_failed();

        if let Err(e) = self.ctx.store.update_status(id, &StatusUpdate::failed()).await {
            error!(worker = self.id, job_id = %id, error = %e, "Failed to store panicked job");
            self.ctx.metrics.store_write_failure();
            return JobOutcome::WriteFailed;
        }
        JobOutcome::Panicked
    }

    /// Fetch the rate for one job and write the result back.
    pub async fn process(&self, job: Job) -> JobOutcome {
        if !self.ctx.processing_delay.is_zero() {
            tokio::time::sleep(self.ctx.processing_delay).await;
        }

        let fetched = match tokio::time::timeout(
            self.ctx.fetch_timeout,
            self.ctx.fetcher.fetch_rate(&job.pair),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(job.pair.clone())),
        };

        let (update, outcome) = match fetched {
            Ok(rate) => {
                info!(
                    worker = self.id,
                    fetcher = self.ctx.fetcher.name(),
                    job_id = %job.id,
                    pair = %job.pair,
                    rate = %rate,
                    "Rate fetched"
                );
                self.ctx.metrics.job_completed();
                (StatusUpdate::done(rate), JobOutcome::Completed)
            }
            Err(e) => {
                warn!(
                    worker = self.id,
                    fetcher = self.ctx.fetcher.name(),
                    job_id = %job.id,
                    pair = %job.pair,
                    kind = %e.kind(),
                    error = %e,
                    "Rate fetch failed"
                );
                self.ctx.metrics.job_failed();
                (StatusUpdate::failed(), JobOutcome::Failed(e))
            }
        };

        if let Err(e) = self.ctx.store.update_status(job.id, &update).await {
            error!(
                worker = self.id,
                job_id = %job.id,
                pair = %job.pair,
                error = %e,
                "Failed to store refresh result"
            );
            self.ctx.metrics.store_write_failure();
            return JobOutcome::WriteFailed;
        }

        outcome
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg
    } else {
        "unknown panic"
    }
}

/// Keeps `workers_active` accurate even when a worker panics.
struct ActiveWorker<'a> {
    metrics: &'a SharedMetrics,
}

impl<'a> ActiveWorker<'a> {
    fn new(metrics: &'a SharedMetrics) -> Self {
        metrics.worker_started();
        Self { metrics }
    }
}

impl Drop for ActiveWorker<'_> {
    fn drop(&mut self) {
        self.metrics.worker_stopped();
    }
}

/// Spawn `count` workers sharing `ctx`.
pub fn spawn_pool(
    ctx: Arc<WorkerContext>,
    count: usize,
    cancel: &CancellationToken,
) -> Vec<JoinHandle<()>> {
    (0..count)
        .map(|id| {
            let worker = Worker::new(id, ctx.clone());
            tokio::spawn(worker.run(cancel.clone()))
        })
        .collect()
}
