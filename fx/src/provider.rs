//! Rate fetcher trait and test double.

use async_trait::async_trait;
use fxquote_common::CurrencyPair;
use rust_decimal::Decimal;

use crate::error::FetchResult;

/// Trait for external FX rate sources.
///
/// One call is one attempt: implementations must not retry internally.
#[async_trait]
pub trait RateFetcher: Send + Sync {
    /// Get the fetcher name.
    fn name(&self) -> &str;

    /// Fetch the current rate for `pair` (units of quote per one base).
    async fn fetch_rate(&self, pair: &CurrencyPair) -> FetchResult<Decimal>;
}

#[cfg(any(test, feature = "test-utils"))]
pub use mock::MockRateFetcher;

#[cfg(any(test, feature = "test-utils"))]
mod mock {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use fxquote_common::CurrencyPair;
    use parking_lot::Mutex;
    use rust_decimal::Decimal;
    use tokio::sync::Semaphore;

    use super::RateFetcher;
    use crate::error::{FetchError, FetchFailureKind, FetchResult};

    /// Scripted rate fetcher for testing.
    ///
    /// Unknown pairs fail with `RateNotAvailable`. When a gate is installed,
    /// every call first takes (and consumes) one permit from it, which lets a
    /// test hold workers inside a fetch.
    pub struct MockRateFetcher {
        name: String,
        responses: Mutex<HashMap<String, Result<Decimal, FetchFailureKind>>>,
        calls: Mutex<Vec<CurrencyPair>>,
        in_flight: AtomicUsize,
        delay: Option<Duration>,
        gate: Option<Arc<Semaphore>>,
    }

    impl MockRateFetcher {
        /// Create a new mock fetcher.
        pub fn new(name: impl Into<String>) -> Self {
            Self {
                name: name.into(),
                responses: Mutex::new(HashMap::new()),
                calls: Mutex::new(Vec::new()),
                in_flight: AtomicUsize::new(0),
                delay: None,
                gate: None,
            }
        }

        /// Answer every fetch after sleeping for `delay`.
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        /// Make every fetch wait for a permit on `gate`.
        pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
            self.gate = Some(gate);
            self
        }

        /// Set a rate for a currency pair.
        pub fn set_rate(&self, pair: &str, rate: Decimal) {
            self.responses.lock().insert(pair.to_string(), Ok(rate));
        }

        /// Make fetches for a currency pair fail.
        pub fn set_failure(&self, pair: &str, kind: FetchFailureKind) {
            self.responses.lock().insert(pair.to_string(), Err(kind));
        }

        /// Total number of fetch calls started.
        pub fn call_count(&self) -> usize {
            self.calls.lock().len()
        }

        /// Number of fetch calls started for a pair.
        pub fn calls_for(&self, pair: &str) -> usize {
            self.calls
                .lock()
                .iter()
                .filter(|p| p.to_string() == pair)
                .count()
        }

        /// Pairs in the order their fetches started.
        pub fn call_order(&self) -> Vec<CurrencyPair> {
            self.calls.lock().clone()
        }

        /// Number of fetches currently running.
        pub fn in_flight(&self) -> usize {
            self.in_flight.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RateFetcher for MockRateFetcher {
        fn name(&self) -> &str {
            &self.name
        }

        async fn fetch_rate(&self, pair: &CurrencyPair) -> FetchResult<Decimal> {
            self.calls.lock().push(pair.clone());
            self.in_flight.fetch_add(1, Ordering::SeqCst);

            if let Some(gate) = &self.gate {
                if let Ok(permit) = gate.acquire().await {
                    permit.forget();
                }
            }
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            let response = self.responses.lock().get(&pair.to_string()).copied();
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            match response {
                Some(Ok(rate)) => Ok(rate),
                Some(Err(kind)) => Err(FetchError::from_kind(kind, pair, "scripted failure")),
                None => Err(FetchError::RateNotAvailable(pair.clone())),
            }
        }
    }
}
