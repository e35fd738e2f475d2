//! Rate fetch error types.

use std::fmt;

use fxquote_common::CurrencyPair;
use thiserror::Error;

/// Errors that can occur while fetching a rate from an external source.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    /// The source did not answer within the fetch timeout.
    #[error("Timed out fetching rate for {0}")]
    Timeout(CurrencyPair),

    /// The source answered with an error status or an undecodable body.
    #[error("Bad upstream response for {pair}: {detail}")]
    BadUpstreamResponse { pair: CurrencyPair, detail: String },

    /// The source answered but has no rate for the quote currency.
    #[error("Rate not available for {0}")]
    RateNotAvailable(CurrencyPair),

    /// Connection-level failure.
    #[error("Network error fetching {pair}: {detail}")]
    Network { pair: CurrencyPair, detail: String },
}

/// Failure kind without the payload, for metrics and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchFailureKind {
    Timeout,
    BadUpstreamResponse,
    RateNotAvailable,
    Network,
}

impl FetchError {
    /// Get the failure kind.
    pub fn kind(&self) -> FetchFailureKind {
        match self {
            FetchError::Timeout(_) => FetchFailureKind::Timeout,
            FetchError::BadUpstreamResponse { .. } => FetchFailureKind::BadUpstreamResponse,
            FetchError::RateNotAvailable(_) => FetchFailureKind::RateNotAvailable,
            FetchError::Network { .. } => FetchFailureKind::Network,
        }
    }

    /// Build an error of the given kind for `pair`.
    pub fn from_kind(kind: FetchFailureKind, pair: &CurrencyPair, detail: impl Into<String>) -> Self {
        match kind {
            FetchFailureKind::Timeout => FetchError::Timeout(pair.clone()),
            FetchFailureKind::BadUpstreamResponse => FetchError::BadUpstreamResponse {
                pair: pair.clone(),
                detail: detail.into(),
            },
            FetchFailureKind::RateNotAvailable => FetchError::RateNotAvailable(pair.clone()),
            FetchFailureKind::Network => FetchError::Network {
                pair: pair.clone(),
                detail: detail.into(),
            },
        }
    }
}

impl fmt::Display for FetchFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FetchFailureKind::Timeout => "timeout",
            FetchFailureKind::BadUpstreamResponse => "bad_upstream_response",
            FetchFailureKind::RateNotAvailable => "rate_not_available",
            FetchFailureKind::Network => "network",
        };
        f.write_str(name)
    }
}

/// Result type for fetch operations.
pub type FetchResult<T> = Result<T, FetchError>;
