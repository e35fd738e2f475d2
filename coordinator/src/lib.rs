//! FxQuote Refresh Service
//!
//! Accepts "refresh this exchange rate" requests, deduplicates them per
//! currency pair against the quote store, and hands new work to a fixed pool
//! of workers through a bounded job queue. Shutdown stops admissions, closes
//! the queue and joins the pool according to the configured drain policy.

pub mod admission;
pub mod config;
pub mod metrics;
pub mod queue;
pub mod service;
pub mod shutdown;
pub mod state;
pub mod supported;
pub mod worker;

pub use admission::{Admission, AdmissionController};
pub use config::{BackpressurePolicy, DrainPolicy, ServiceConfig};
pub use metrics::{Metrics, MetricsSnapshot, SharedMetrics};
pub use queue::{Job, JobQueue, QueueError};
pub use service::RefreshService;
pub use shutdown::ShutdownReport;
pub use state::ServiceState;
pub use supported::SupportedPairs;
