//! In-memory quote store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use fxquote_common::{CurrencyPair, Quote, QuoteId, QuoteStatus, StatusUpdate};
use parking_lot::Mutex;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::store::{InsertOutcome, QuoteStore};

#[derive(Default)]
struct MemoryState {
    quotes: HashMap<QuoteId, Quote>,
    pending: HashMap<CurrencyPair, QuoteId>,
}

/// Quote store held in process memory.
///
/// Every operation runs inside one critical section, which is what upholds
/// the single-pending-record-per-pair rule.
#[derive(Default)]
pub struct MemoryQuoteStore {
    state: Mutex<MemoryState>,
    closed: AtomicBool,
    failing_updates: AtomicUsize,
}

impl MemoryQuoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` status updates fail with a connection error.
    pub fn fail_next_updates(&self, count: usize) {
        self.failing_updates.store(count, Ordering::SeqCst);
    }

    /// Snapshot of every record.
    pub fn records(&self) -> Vec<Quote> {
        self.state.lock().quotes.values().cloned().collect()
    }

    /// Number of records for `pair` with `status`.
    pub fn count_with_status(&self, pair: &CurrencyPair, status: QuoteStatus) -> usize {
        self.state
            .lock()
            .quotes
            .values()
            .filter(|q| &q.pair == pair && q.status == status)
            .count()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.is_closed() {
            return Err(StoreError::Connection("store is closed".to_string()));
        }
        Ok(())
    }

    fn take_injected_failure(&self) -> bool {
        self.failing_updates
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl QuoteStore for MemoryQuoteStore {
    async fn find_pending(&self, pair: &CurrencyPair) -> StoreResult<Option<Quote>> {
        self.ensure_open()?;
        let state = self.state.lock();
        Ok(state
            .pending
            .get(pair)
            .and_then(|id| state.quotes.get(id))
            .cloned())
    }

    async fn insert_pending_if_absent(&self, pair: &CurrencyPair) -> StoreResult<InsertOutcome> {
        self.ensure_open()?;
        let mut state = self.state.lock();
        if state.pending.contains_key(pair) {
            return Ok(InsertOutcome::Conflict);
        }

        let id = QuoteId::new();
        state.pending.insert(pair.clone(), id);
        state.quotes.insert(id, Quote::pending(id, pair.clone()));
        debug!(quote_id = %id, pair = %pair, "Inserted pending quote");
        Ok(InsertOutcome::Inserted(id))
    }

    async fn update_status(&self, id: QuoteId, update: &StatusUpdate) -> StoreResult<()> {
        self.ensure_open()?;
        if self.take_injected_failure() {
            return Err(StoreError::Connection("injected update failure".to_string()));
        }

        let mut state = self.state.lock();
        let quote = state.quotes.get_mut(&id).ok_or(StoreError::NotPending(id))?;
        quote.apply(update).map_err(|_| StoreError::NotPending(id))?;
        let pair = quote.pair.clone();

        if state.pending.get(&pair) == Some(&id) {
            state.pending.remove(&pair);
        }
        Ok(())
    }

    async fn find_by_id(&self, id: QuoteId) -> StoreResult<Option<Quote>> {
        self.ensure_open()?;
        Ok(self.state.lock().quotes.get(&id).cloned())
    }

    async fn latest_with_status(
        &self,
        pair: &CurrencyPair,
        status: QuoteStatus,
    ) -> StoreResult<Option<Quote>> {
        self.ensure_open()?;
        let state = self.state.lock();
        Ok(state
            .quotes
            .values()
            .filter(|q| &q.pair == pair && q.status == status)
            .max_by(|a, b| a.updated_at.cmp(&b.updated_at).then(a.id.cmp(&b.id)))
            .cloned())
    }

    async fn retract_pending(&self, id: QuoteId) -> StoreResult<bool> {
        self.ensure_open()?;
        let mut state = self.state.lock();
        let pair = match state.quotes.get_mut(&id) {
            Some(q) if q.status == QuoteStatus::Pending => {
                q.apply(&StatusUpdate::failed())
                    .map_err(|_| StoreError::NotPending(id))?;
                q.pair.clone()
            }
            _ => return Ok(false),
        };

        if state.pending.get(&pair) == Some(&id) {
            state.pending.remove(&pair);
        }
        Ok(true)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
