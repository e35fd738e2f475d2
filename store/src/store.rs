//! The quote store contract.

use async_trait::async_trait;
use fxquote_common::{CurrencyPair, Quote, QuoteId, QuoteStatus, StatusUpdate};

use crate::error::StoreResult;

/// Result of an insert-if-absent-pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new pending record was created with this id.
    Inserted(QuoteId),
    /// A pending record for the pair already exists.
    Conflict,
}

/// Durable keyed storage for quote records.
///
/// Implementations enforce that at most one record per currency pair is
/// pending at any time. Callers hold no locks of their own.
#[async_trait]
pub trait QuoteStore: Send + Sync {
    /// The pending record for `pair`, if any.
    async fn find_pending(&self, pair: &CurrencyPair) -> StoreResult<Option<Quote>>;

    /// Atomically create a pending record for `pair` unless one exists.
    async fn insert_pending_if_absent(&self, pair: &CurrencyPair) -> StoreResult<InsertOutcome>;

    /// Move a pending record to its terminal status.
    ///
    /// Fails with `StoreError::NotPending` when the record is missing or
    /// already terminal.
    async fn update_status(&self, id: QuoteId, update: &StatusUpdate) -> StoreResult<()>;

    async fn find_by_id(&self, id: QuoteId) -> StoreResult<Option<Quote>>;

    /// Most recent record for `pair` with `status`, ordered by `updated_at`.
    async fn latest_with_status(
        &self,
        pair: &CurrencyPair,
        status: QuoteStatus,
    ) -> StoreResult<Option<Quote>>;

    /// Void a record that is still pending by moving it to `Error`.
    ///
    /// The row is kept so callers already joined to it see a terminal status.
    /// Returns whether a row was voided.
    async fn retract_pending(&self, id: QuoteId) -> StoreResult<bool>;

    /// Release connections.
    async fn close(&self) {}
}
