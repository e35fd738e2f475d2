//! Error types for the quote refresh service.

use crate::QuoteStatus;
use thiserror::Error;

/// Main error type for quote refresh operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QuoteError {
    /// No matching quote record.
    #[error("Quote not found: {0}")]
    NotFound(String),

    /// Malformed currency pair.
    #[error("Invalid currency pair: {0}")]
    InvalidCurrencyPair(String),

    /// Well-formed but not in the supported set.
    #[error("Unsupported currency pair: {0}")]
    UnsupportedCurrencyPair(String),

    /// Quote store unreachable or a write failed.
    #[error("Dependency failure: {0}")]
    DependencyFailure(String),

    /// Job queue full beyond the bounded wait, or closed.
    #[error("Queue unavailable: {0}")]
    QueueUnavailable(String),

    /// Service is not accepting admissions (starting or shutting down).
    #[error("Service unavailable")]
    ServiceUnavailable,

    /// Invalid state transition.
    #[error("Invalid transition from {from:?} to {to:?}")]
    InvalidTransition { from: QuoteStatus, to: QuoteStatus },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl QuoteError {
    /// Check if the caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            QuoteError::DependencyFailure(_)
                | QuoteError::QueueUnavailable(_)
                | QuoteError::ServiceUnavailable
        )
    }

    /// Get a stable error code for the boundary layer.
    pub fn error_code(&self) -> &'static str {
        match self {
            QuoteError::NotFound(_) => "NOT_FOUND",
            QuoteError::InvalidCurrencyPair(_) => "INVALID_CURRENCY_PAIR",
            QuoteError::UnsupportedCurrencyPair(_) => "UNSUPPORTED_CURRENCY_PAIR",
            QuoteError::DependencyFailure(_) => "DEPENDENCY_FAILURE",
            QuoteError::QueueUnavailable(_) => "QUEUE_UNAVAILABLE",
            QuoteError::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            QuoteError::InvalidTransition { .. } => "INVALID_TRANSITION",
            QuoteError::ConfigurationError(_) => "CONFIGURATION_ERROR",
        }
    }
}

/// Result type alias for quote refresh operations.
pub type Result<T> = std::result::Result<T, QuoteError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(QuoteError::ServiceUnavailable.is_retryable());
        assert!(QuoteError::QueueUnavailable("full".into()).is_retryable());
        assert!(QuoteError::DependencyFailure("db down".into()).is_retryable());
        assert!(!QuoteError::NotFound("x".into()).is_retryable());
        assert!(!QuoteError::UnsupportedCurrencyPair("XXX/YYY".into()).is_retryable());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(QuoteError::NotFound("x".into()).error_code(), "NOT_FOUND");
        assert_eq!(
            QuoteError::QueueUnavailable("closed".into()).error_code(),
            "QUEUE_UNAVAILABLE"
        );
        assert_eq!(
            QuoteError::InvalidTransition {
                from: QuoteStatus::Done,
                to: QuoteStatus::Error
            }
            .error_code(),
            "INVALID_TRANSITION"
        );
    }

    #[test]
    fn test_error_display() {
        let err = QuoteError::DependencyFailure("connection refused".into());
        assert_eq!(err.to_string(), "Dependency failure: connection refused");
    }
}
