//! Refresh admission and per-pair deduplication.

use std::sync::Arc;

use fxquote_common::{CurrencyPair, QuoteError, QuoteId, Result};
use fxquote_store::{InsertOutcome, QuoteStore};
use tracing::{debug, error, info, instrument, warn};

use crate::metrics::SharedMetrics;
use crate::queue::{Job, JobQueue};

/// Attempts before a conflicting admission gives up.
const MAX_ADMISSION_ATTEMPTS: usize = 3;

/// Outcome of a successful admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    /// Id of the pending quote, which doubles as the job id.
    pub job_id: QuoteId,
    /// `false` when the caller was joined to an already pending refresh.
    pub is_new: bool,
}

/// Decides whether a refresh request creates new work.
///
/// Deduplication relies entirely on the store's single-pending-record rule;
/// the controller keeps no state of its own.
pub struct AdmissionController {
    store: Arc<dyn QuoteStore>,
    queue: Arc<JobQueue>,
    metrics: SharedMetrics,
}

impl AdmissionController {
    pub fn new(store: Arc<dyn QuoteStore>, queue: Arc<JobQueue>, metrics: SharedMetrics) -> Self {
        Self {
            store,
            queue,
            metrics,
        }
    }

    /// Admit a refresh for an already validated pair.
    #[instrument(name = "AdmitRefresh", skip(self, pair), fields(pair = %pair))]
    pub async fn admit(&self, pair: &CurrencyPair) -> Result<Admission> {
        self.metrics.admission_received();

        let result = self.try_admit(pair).await;
        match &result {
            Ok(admission) if admission.is_new => self.metrics.admission_new(),
            Ok(_) => self.metrics.admission_deduplicated(),
            Err(e) => {
                self.metrics.admission_rejected();
                warn!(error = %e, "Admission rejected");
            }
        }
        result
    }

    async fn try_admit(&self, pair: &CurrencyPair) -> Result<Admission> {
        for attempt in 1..=MAX_ADMISSION_ATTEMPTS {
            if let Some(existing) = self.store.find_pending(pair).await? {
                debug!(job_id = %existing.id, "Joined pending refresh");
                return Ok(Admission {
                    job_id: existing.id,
                    is_new: false,
                });
            }

            match self.store.insert_pending_if_absent(pair).await? {
                InsertOutcome::Inserted(id) => {
                    self.enqueue(Job {
                        id,
                        pair: pair.clone(),
                    })
                    .await?;
                    info!(job_id = %id, "Refresh admitted");
                    return Ok(Admission {
                        job_id: id,
                        is_new: true,
                    });
                }
                InsertOutcome::Conflict => {
                    debug!(attempt, "Lost insert race, looking up the winner");
                    if let Some(existing) = self.store.find_pending(pair).await? {
                        return Ok(Admission {
                            job_id: existing.id,
                            is_new: false,
                        });
                    }
                }
            }
        }

        Err(QuoteError::DependencyFailure(format!(
            "admission for {pair} kept conflicting after {MAX_ADMISSION_ATTEMPTS} attempts"
        )))
    }

    async fn enqueue(&self, job: Job) -> Result<()> {
        let id = job.id;
        let pair = job.pair.clone();

        let Err(queue_err) = self.queue.push(job).await else {
            self.metrics.job_enqueued();
            return Ok(());
        };

        self.metrics.queue_rejection();
        match self.store.retract_pending(id).await {
            Ok(true) => debug!(job_id = %id, pair = %pair, "Retracted pending quote"),
            Ok(false) => warn!(job_id = %id, pair = %pair, "Pending quote already gone"),
            Err(e) => error!(
                job_id = %id,
                pair = %pair,
                error = %e,
                "Failed to retract pending quote after enqueue failure"
            ),
        }

        Err(queue_err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackpressurePolicy;
    use crate::metrics::Metrics;
    use async_trait::async_trait;
    use fxquote_common::{Quote, QuoteStatus, StatusUpdate};
    use fxquote_store::{MemoryQuoteStore, StoreError, StoreResult};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn usd_eur() -> CurrencyPair {
        CurrencyPair::parse("USD/EUR").unwrap()
    }

    fn setup(capacity: usize) -> (Arc<MemoryQuoteStore>, Arc<JobQueue>, AdmissionController) {
        let store = Arc::new(MemoryQuoteStore::new());
        let queue = Arc::new(JobQueue::new(capacity, BackpressurePolicy::FailFast));
        let controller =
            AdmissionController::new(store.clone(), queue.clone(), Arc::new(Metrics::new()));
        (store, queue, controller)
    }

    #[tokio::test]
    async fn test_new_admission_creates_pending_row_and_job() {
        let (store, queue, controller) = setup(4);

        let admission = controller.admit(&usd_eur()).await.unwrap();
        assert!(admission.is_new);

        let quote = store.find_by_id(admission.job_id).await.unwrap().unwrap();
        assert_eq!(quote.status, QuoteStatus::Pending);

        let job = queue.receiver().try_recv().await.unwrap();
        assert_eq!(job.id, admission.job_id);
        assert_eq!(job.pair, usd_eur());
    }

    #[tokio::test]
    async fn test_second_admission_is_deduplicated() {
        let (_store, queue, controller) = setup(4);

        let first = controller.admit(&usd_eur()).await.unwrap();
        let second = controller.admit(&usd_eur()).await.unwrap();

        assert_eq!(first.job_id, second.job_id);
        assert!(!second.is_new);
        assert_eq!(queue.len(), 1);

        let snapshot = controller.metrics.snapshot();
        assert_eq!(snapshot.admissions_total, 2);
        assert_eq!(snapshot.admissions_new, 1);
        assert_eq!(snapshot.admissions_deduplicated, 1);
    }

    #[tokio::test]
    async fn test_full_queue_retracts_pending_row() {
        let (store, queue, controller) = setup(1);
        controller.admit(&usd_eur()).await.unwrap();

        let jpy = CurrencyPair::parse("USD/JPY").unwrap();
        let err = controller.admit(&jpy).await.unwrap_err();
        assert_eq!(err.error_code(), "QUEUE_UNAVAILABLE");

        assert!(store.find_pending(&jpy).await.unwrap().is_none());
        assert_eq!(store.count_with_status(&jpy, QuoteStatus::Error), 1);
        assert_eq!(queue.len(), 1);
        assert_eq!(controller.metrics.snapshot().queue_rejections, 1);
        assert_eq!(controller.metrics.snapshot().admissions_rejected, 1);
    }

    #[tokio::test]
    async fn test_closed_queue_rejects_admission() {
        let (store, queue, controller) = setup(4);
        queue.close().await;

        let err = controller.admit(&usd_eur()).await.unwrap_err();
        assert!(matches!(err, QuoteError::QueueUnavailable(_)));
        assert!(store.find_pending(&usd_eur()).await.unwrap().is_none());
        assert_eq!(store.count_with_status(&usd_eur(), QuoteStatus::Error), 1);
    }

    #[tokio::test]
    async fn test_joined_caller_sees_voided_row_after_enqueue_failure() {
        let store = Arc::new(MemoryQuoteStore::new());
        let queue = Arc::new(JobQueue::new(
            1,
            BackpressurePolicy::Wait(Duration::from_millis(300)),
        ));
        let controller = Arc::new(AdmissionController::new(
            store.clone(),
            queue.clone(),
            Arc::new(Metrics::new()),
        ));
        queue
            .push(Job {
                id: QuoteId::new(),
                pair: CurrencyPair::parse("USD/JPY").unwrap(),
            })
            .await
            .unwrap();

        let gbp = CurrencyPair::parse("USD/GBP").unwrap();
        let first = {
            let controller = controller.clone();
            let gbp = gbp.clone();
            tokio::spawn(async move { controller.admit(&gbp).await })
        };

        let pending = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if let Some(quote) = store.find_pending(&gbp).await.unwrap() {
                    return quote;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let joined = controller.admit(&gbp).await.unwrap();
        assert!(!joined.is_new);
        assert_eq!(joined.job_id, pending.id);

        let err = first.await.unwrap().unwrap_err();
        assert!(matches!(err, QuoteError::QueueUnavailable(_)));

        let quote = store.find_by_id(joined.job_id).await.unwrap().unwrap();
        assert_eq!(quote.status, QuoteStatus::Error);
        assert!(quote.is_terminal());
    }

    #[tokio::test]
    async fn test_store_failure_is_dependency_failure() {
        let (store, _queue, controller) = setup(4);
        store.close().await;

        let err = controller.admit(&usd_eur()).await.unwrap_err();
        assert!(matches!(err, QuoteError::DependencyFailure(_)));
    }

    /// Always reports a conflict but never shows the winning row.
    #[derive(Default)]
    struct VanishingWinnerStore {
        inserts: AtomicUsize,
    }

    #[async_trait]
    impl QuoteStore for VanishingWinnerStore {
        async fn find_pending(&self, _pair: &CurrencyPair) -> StoreResult<Option<Quote>> {
            Ok(None)
        }

        async fn insert_pending_if_absent(&self, _pair: &CurrencyPair) -> StoreResult<InsertOutcome> {
            self.inserts.fetch_add(1, Ordering::SeqCst);
            Ok(InsertOutcome::Conflict)
        }

        async fn update_status(&self, id: QuoteId, _update: &StatusUpdate) -> StoreResult<()> {
            Err(StoreError::NotPending(id))
        }

        async fn find_by_id(&self, _id: QuoteId) -> StoreResult<Option<Quote>> {
            Ok(None)
        }

        async fn latest_with_status(
            &self,
            _pair: &CurrencyPair,
            _status: QuoteStatus,
        ) -> StoreResult<Option<Quote>> {
            Ok(None)
        }

        async fn retract_pending(&self, _id: QuoteId) -> StoreResult<bool> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn test_repeated_conflicts_are_bounded() {
        let store = Arc::new(VanishingWinnerStore::default());
        let queue = Arc::new(JobQueue::new(4, BackpressurePolicy::FailFast));
        let controller =
            AdmissionController::new(store.clone(), queue.clone(), Arc::new(Metrics::new()));

        let err = controller.admit(&usd_eur()).await.unwrap_err();
        assert!(matches!(err, QuoteError::DependencyFailure(_)));
        assert_eq!(store.inserts.load(Ordering::SeqCst), MAX_ADMISSION_ATTEMPTS);
        assert!(queue.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_admissions_share_one_job() {
        let (store, queue, controller) = setup(8);
        let controller = Arc::new(controller);

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let controller = controller.clone();
                tokio::spawn(async move { controller.admit(&usd_eur()).await })
            })
            .collect();

        let mut ids = Vec::new();
        let mut new_count = 0;
        for handle in handles {
            let admission = handle.await.unwrap().unwrap();
            if admission.is_new {
                new_count += 1;
            }
            ids.push(admission.job_id);
        }

        assert_eq!(new_count, 1);
        assert!(ids.iter().all(|id| *id == ids[0]));
        assert_eq!(queue.len(), 1);
        assert_eq!(store.count_with_status(&usd_eur(), QuoteStatus::Pending), 1);
    }
}
