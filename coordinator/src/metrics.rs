//! Metrics collection for refresh service monitoring.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Refresh service metrics.
pub struct Metrics {
    /// Admission attempts that reached the admission controller.
    pub admissions_total: AtomicU64,
    /// Admissions that created a new job.
    pub admissions_new: AtomicU64,
    /// Admissions answered with an already pending job.
    pub admissions_deduplicated: AtomicU64,
    /// Admissions that failed.
    pub admissions_rejected: AtomicU64,
    /// Jobs pushed onto the queue.
    pub jobs_enqueued: AtomicU64,
    /// Jobs whose fetch succeeded.
    pub jobs_completed: AtomicU64,
    /// Jobs whose fetch failed.
    pub jobs_failed: AtomicU64,
    /// Worker result writes the store refused.
    pub store_write_failures: AtomicU64,
    /// Pushes refused by a full or closed queue.
    pub queue_rejections: AtomicU64,
    /// Jobs left unprocessed at shutdown.
    pub jobs_abandoned: AtomicU64,
    /// Worker tasks currently running.
    pub workers_active: AtomicU64,
}

impl Metrics {
    /// Create new metrics instance.
    pub fn new() -> Self {
        Self {
            admissions_total: AtomicU64::new(0),
            admissions_new: AtomicU64::new(0),
            admissions_deduplicated: AtomicU64::new(0),
            admissions_rejected: AtomicU64::new(0),
            jobs_enqueued: AtomicU64::new(0),
            jobs_completed: AtomicU64::new(0),
            jobs_failed: AtomicU64::new(0),
            store_write_failures: AtomicU64::new(0),
            queue_rejections: AtomicU64::new(0),
            jobs_abandoned: AtomicU64::new(0),
            workers_active: AtomicU64::new(0),
        }
    }

    pub fn admission_received(&self) {
        self.admissions_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn admission_new(&self) {
        self.admissions_new.fetch_add(1, Ordering::Relaxed);
    }

    pub fn admission_deduplicated(&self) {
        self.admissions_deduplicated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn admission_rejected(&self) {
        self.admissions_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_enqueued(&self) {
        self.jobs_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_completed(&self) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn store_write_failure(&self) {
        self.store_write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn queue_rejection(&self) {
        self.queue_rejections.fetch_add(1, Ordering::Relaxed);
    }

    /// Record jobs abandoned at shutdown.
    pub fn record_abandoned(&self, count: u64) {
        self.jobs_abandoned.fetch_add(count, Ordering::Relaxed);
    }

    pub fn worker_started(&self) {
        self.workers_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn worker_stopped(&self) {
        self.workers_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            admissions_total: self.admissions_total.load(Ordering::Relaxed),
            admissions_new: self.admissions_new.load(Ordering::Relaxed),
            admissions_deduplicated: self.admissions_deduplicated.load(Ordering::Relaxed),
            admissions_rejected: self.admissions_rejected.load(Ordering::Relaxed),
            jobs_enqueued: self.jobs_enqueued.load(Ordering::Relaxed),
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            store_write_failures: self.store_write_failures.load(Ordering::Relaxed),
            queue_rejections: self.queue_rejections.load(Ordering::Relaxed),
            jobs_abandoned: self.jobs_abandoned.load(Ordering::Relaxed),
            workers_active: self.workers_active.load(Ordering::Relaxed),
        }
    }

    /// Export metrics in Prometheus format.
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        format!(
            r#"# HELP fxquote_admissions_total Total refresh admissions
# TYPE fxquote_admissions_total counter
fxquote_admissions_total {}

# HELP fxquote_admissions_new Admissions that created a new job
# TYPE fxquote_admissions_new counter
fxquote_admissions_new {}

# HELP fxquote_admissions_deduplicated Admissions joined to a pending job
# TYPE fxquote_admissions_deduplicated counter
fxquote_admissions_deduplicated {}

# HELP fxquote_admissions_rejected Admissions that failed
# TYPE fxquote_admissions_rejected counter
fxquote_admissions_rejected {}

# HELP fxquote_jobs_enqueued Jobs pushed onto the queue
# TYPE fxquote_jobs_enqueued counter
fxquote_jobs_enqueued {}

# HELP fxquote_jobs_completed Jobs whose fetch succeeded
# TYPE fxquote_jobs_completed counter
fxquote_jobs_completed {}

# HELP fxquote_jobs_failed Jobs whose fetch failed
# TYPE fxquote_jobs_failed counter
fxquote_jobs_failed {}

# HELP fxquote_store_write_failures Worker result writes refused by the store
# TYPE fxquote_store_write_failures counter
fxquote_store_write_failures {}

# HELP fxquote_queue_rejections Pushes refused by a full or closed queue
# TYPE fxquote_queue_rejections counter
fxquote_queue_rejections {}

# HELP fxquote_jobs_abandoned Jobs left unprocessed at shutdown
# TYPE fxquote_jobs_abandoned counter
fxquote_jobs_abandoned {}

# HELP fxquote_workers_active Current running workers
# TYPE fxquote_workers_active gauge
fxquote_workers_active {}
"#,
            snapshot.admissions_total,
            snapshot.admissions_new,
            snapshot.admissions_deduplicated,
            snapshot.admissions_rejected,
            snapshot.jobs_enqueued,
            snapshot.jobs_completed,
            snapshot.jobs_failed,
            snapshot.store_write_failures,
            snapshot.queue_rejections,
            snapshot.jobs_abandoned,
            snapshot.workers_active,
        )
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub admissions_total: u64,
    pub admissions_new: u64,
    pub admissions_deduplicated: u64,
    pub admissions_rejected: u64,
    pub jobs_enqueued: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub store_write_failures: u64,
    pub queue_rejections: u64,
    pub jobs_abandoned: u64,
    pub workers_active: u64,
}

/// Shared metrics instance.
pub type SharedMetrics = Arc<Metrics>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_increment() {
        let metrics = Metrics::new();

        metrics.admission_received();
        metrics.admission_received();
        metrics.admission_new();
        metrics.admission_deduplicated();
        metrics.worker_started();
        metrics.worker_started();
        metrics.worker_stopped();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.admissions_total, 2);
        assert_eq!(snapshot.admissions_new, 1);
        assert_eq!(snapshot.admissions_deduplicated, 1);
        assert_eq!(snapshot.workers_active, 1);
    }

    #[test]
    fn test_prometheus_export() {
        let metrics = Metrics::new();
        metrics.job_enqueued();
        metrics.record_abandoned(3);

        let output = metrics.to_prometheus();
        assert!(output.contains("fxquote_jobs_enqueued 1"));
        assert!(output.contains("fxquote_jobs_abandoned 3"));
        assert!(output.contains("# TYPE fxquote_workers_active gauge"));
    }
}
