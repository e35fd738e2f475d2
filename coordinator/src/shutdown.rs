//! Ordered teardown of admission, the job queue and the worker pool.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fxquote_store::QuoteStore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::metrics::SharedMetrics;
use crate::queue::{Job, JobQueue};

const IN_FLIGHT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Result of a shutdown.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShutdownReport {
    /// In-flight admissions were still running when the grace period ended.
    pub grace_expired: bool,
    /// Worker tasks that finished, cleanly or not.
    pub workers_joined: usize,
    /// Worker tasks that ended in a panic.
    pub worker_panics: usize,
    /// Jobs left in the queue. Their quotes stay pending.
    pub abandoned_jobs: Vec<Job>,
}

/// Counts admissions currently between their state check and their return.
#[derive(Debug, Default)]
pub struct InFlightTracker {
    count: AtomicUsize,
}

impl InFlightTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an admission until the guard is dropped.
    pub fn enter(self: &Arc<Self>) -> InFlightGuard {
        self.count.fetch_add(1, Ordering::SeqCst);
        InFlightGuard {
            tracker: self.clone(),
        }
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Wait until no admission is in flight. Returns `false` if `grace` ran out first.
    pub async fn wait_idle(&self, grace: Duration) -> bool {
        tokio::time::timeout(grace, async {
            loop {
                let in_flight = self.count();
                if in_flight == 0 {
                    break;
                }
                info!(in_flight, "Waiting for in-flight admissions to complete");
                tokio::time::sleep(IN_FLIGHT_POLL_INTERVAL).await;
            }
        })
        .await
        .is_ok()
    }
}

/// Decrements the in-flight count on drop.
pub struct InFlightGuard {
    tracker: Arc<InFlightTracker>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.tracker.count.fetch_sub(1, Ordering::SeqCst);
    }
}

/// The components a shutdown tears down, in order.
pub struct ShutdownCoordinator {
    pub boundary: CancellationToken,
    pub in_flight: Arc<InFlightTracker>,
    pub grace_period: Duration,
    pub queue: Arc<JobQueue>,
    pub worker_cancel: CancellationToken,
    pub store: Arc<dyn QuoteStore>,
    pub metrics: SharedMetrics,
}

impl ShutdownCoordinator {
    /// Run the teardown. The caller has already stopped accepting admissions.
    #[instrument(name = "Shutdown", skip_all)]
    pub async fn run(&self, workers: Vec<JoinHandle<()>>) -> ShutdownReport {
        let mut report = ShutdownReport::default();

        self.boundary.cancel();

        if !self.in_flight.wait_idle(self.grace_period).await {
            report.grace_expired = true;
            warn!(
                in_flight = self.in_flight.count(),
                grace_ms = self.grace_period.as_millis() as u64,
                "Grace period expired with admissions still in flight"
            );
        }

        self.queue.close().await;
        info!(buffered = self.queue.len(), "Job queue closed");

        self.worker_cancel.cancel();
        for handle in workers {
            match handle.await {
                Ok(()) => report.workers_joined += 1,
                Err(e) => {
                    report.workers_joined += 1;
                    if e.is_panic() {
                        report.worker_panics += 1;
                    }
                    error!(error = %e, "Worker task failed");
                }
            }
        }

        report.abandoned_jobs = self.queue.receiver().drain().await;
        if !report.abandoned_jobs.is_empty() {
            self.metrics.record_abandoned(report.abandoned_jobs.len() as u64);
            for job in &report.abandoned_jobs {
                warn!(job_id = %job.id, pair = %job.pair, "Job abandoned at shutdown");
            }
        }

        // Admissions that outlived the grace period fail their push on the
        // closed queue and still need the store to void their rows.
        if report.grace_expired && !self.in_flight.wait_idle(self.grace_period).await {
            warn!(
                in_flight = self.in_flight.count(),
                "Closing the store with admissions still in flight"
            );
        }

        self.store.close().await;

        info!(
            workers_joined = report.workers_joined,
            worker_panics = report.worker_panics,
            abandoned = report.abandoned_jobs.len(),
            grace_expired = report.grace_expired,
            "Shutdown complete"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_guard_tracks_in_flight() {
        let tracker = Arc::new(InFlightTracker::new());
        let a = tracker.enter();
        let b = tracker.enter();
        assert_eq!(tracker.count(), 2);

        drop(a);
        drop(b);
        assert_eq!(tracker.count(), 0);
        assert!(tracker.wait_idle(Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn test_wait_idle_expires() {
        let tracker = Arc::new(InFlightTracker::new());
        let _guard = tracker.enter();
        assert!(!tracker.wait_idle(Duration::from_millis(30)).await);
    }

    #[tokio::test]
    async fn test_wait_idle_returns_when_guard_drops() {
        let tracker = Arc::new(InFlightTracker::new());
        let guard = tracker.enter();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            drop(guard);
        });

        assert!(tracker.wait_idle(Duration::from_secs(2)).await);
    }
}
