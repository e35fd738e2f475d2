//! Boundary-facing refresh service.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use fxquote_common::{CurrencyPair, Quote, QuoteError, QuoteId, QuoteStatus, Result};
use fxquote_fx::RateFetcher;
use fxquote_store::QuoteStore;

use crate::admission::{Admission, AdmissionController};
use crate::config::ServiceConfig;
use crate::metrics::{Metrics, SharedMetrics};
use crate::queue::JobQueue;
use crate::shutdown::{InFlightTracker, ShutdownCoordinator, ShutdownReport};
use crate::state::ServiceState;
use crate::supported::SupportedPairs;
use crate::worker::{spawn_pool, WorkerContext};

/// The quote refresh service.
///
/// Owns the job queue, the admission controller and the worker pool. The
/// store and fetcher are injected so any implementation can be plugged in.
pub struct RefreshService {
    config: ServiceConfig,
    state: RwLock<ServiceState>,
    store: Arc<dyn QuoteStore>,
    queue: Arc<JobQueue>,
    admission: AdmissionController,
    worker_ctx: Arc<WorkerContext>,
    supported: Option<SupportedPairs>,
    in_flight: Arc<InFlightTracker>,
    boundary: CancellationToken,
    worker_cancel: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
    metrics: SharedMetrics,
}

impl RefreshService {
    /// Create a service in the `Starting` state.
    pub fn new(
        config: ServiceConfig,
        store: Arc<dyn QuoteStore>,
        fetcher: Arc<dyn RateFetcher>,
    ) -> Self {
        let metrics: SharedMetrics = Arc::new(Metrics::new());
        let queue = Arc::new(JobQueue::new(
            config.queue.capacity,
            config.queue.backpressure,
        ));
        let admission = AdmissionController::new(store.clone(), queue.clone(), metrics.clone());
        let worker_ctx = Arc::new(WorkerContext::new(
            &config.worker,
            store.clone(),
            fetcher,
            queue.receiver(),
            metrics.clone(),
        ));

        Self {
            config,
            state: RwLock::new(ServiceState::Starting),
            store,
            queue,
            admission,
            worker_ctx,
            supported: None,
            in_flight: Arc::new(InFlightTracker::new()),
            boundary: CancellationToken::new(),
            worker_cancel: CancellationToken::new(),
            workers: Mutex::new(Vec::new()),
            metrics,
        }
    }

    /// Only admit pairs in `pairs`.
    pub fn with_supported_pairs(mut self, pairs: SupportedPairs) -> Self {
        self.supported = Some(pairs);
        self
    }

    /// Spawn the worker pool and start accepting admissions.
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<()> {
        let mut state = self.state.write();
        match *state {
            ServiceState::Running => return Ok(()),
            ServiceState::ShuttingDown | ServiceState::Stopped => {
                return Err(QuoteError::ServiceUnavailable)
            }
            ServiceState::Starting => {}
        }

        let handles = spawn_pool(
            self.worker_ctx.clone(),
            self.config.worker.count,
            &self.worker_cancel,
        );
        self.workers.lock().extend(handles);
        *state = ServiceState::Running;

        info!(
            workers = self.config.worker.count,
            queue_capacity = self.queue.capacity(),
            drain_policy = %self.config.worker.drain_policy,
            "Refresh service started"
        );
        Ok(())
    }

    /// Admit a refresh for `pair`, joining any refresh already pending for it.
    pub async fn admit_refresh(&self, pair: &CurrencyPair) -> Result<Admission> {
        let _guard = self.in_flight.enter();
        if !self.state().accepts_requests() {
            return Err(QuoteError::ServiceUnavailable);
        }

        if let Some(supported) = &self.supported {
            if !supported.contains(pair) {
                self.metrics.admission_rejected();
                return Err(QuoteError::UnsupportedCurrencyPair(pair.to_string()));
            }
        }

        self.admission.admit(pair).await
    }

    /// Look up a quote by id. Pending quotes are returned as they are.
    pub async fn get_by_id(&self, id: QuoteId) -> Result<Quote> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or_else(|| QuoteError::NotFound(id.to_string()))
    }

    /// Most recent successfully refreshed quote for `pair`.
    pub async fn get_latest_done(&self, pair: &CurrencyPair) -> Result<Quote> {
        self.store
            .latest_with_status(pair, QuoteStatus::Done)
            .await?
            .ok_or_else(|| QuoteError::NotFound(pair.to_string()))
    }

    /// Stop admissions, close the queue and join the workers.
    ///
    /// Later calls return an empty report.
    pub async fn shutdown(&self) -> ShutdownReport {
        {
            let mut state = self.state.write();
            if state.is_stopping() {
                return ShutdownReport::default();
            }
            *state = ServiceState::ShuttingDown;
        }
        info!("Refresh service shutting down");

        let workers = std::mem::take(&mut *self.workers.lock());
        let coordinator = ShutdownCoordinator {
            boundary: self.boundary.clone(),
            in_flight: self.in_flight.clone(),
            grace_period: self.config.shutdown.grace_period,
            queue: self.queue.clone(),
            worker_cancel: self.worker_cancel.clone(),
            store: self.store.clone(),
            metrics: self.metrics.clone(),
        };
        let report = coordinator.run(workers).await;

        *self.state.write() = ServiceState::Stopped;
        report
    }

    /// Token cancelled as soon as shutdown begins.
    pub fn boundary_token(&self) -> CancellationToken {
        self.boundary.clone()
    }

    pub fn metrics(&self) -> SharedMetrics {
        self.metrics.clone()
    }

    pub fn state(&self) -> ServiceState {
        *self.state.read()
    }

    /// Number of jobs waiting for a worker.
    pub fn queue_depth(&self) -> usize {
        self.queue.len()
    }
}
