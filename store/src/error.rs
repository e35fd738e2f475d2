//! Quote store error types.

use fxquote_common::{QuoteError, QuoteId};
use thiserror::Error;

/// Errors raised by a [`QuoteStore`](crate::QuoteStore).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// Query failed.
    #[error("Database error: {0}")]
    Database(String),

    /// The record is missing or has already left the pending status.
    #[error("Quote {0} is not pending")]
    NotPending(QuoteId),

    /// A stored row could not be turned back into a quote.
    #[error("Failed to decode quote row: {0}")]
    Decode(String),

    /// Store unreachable or closed.
    #[error("Connection error: {0}")]
    Connection(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Connection(err.to_string())
            }
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                StoreError::Decode(err.to_string())
            }
            other => StoreError::Database(other.to_string()),
        }
    }
}

impl From<StoreError> for QuoteError {
    fn from(err: StoreError) -> Self {
        QuoteError::DependencyFailure(err.to_string())
    }
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_converts_to_dependency_failure() {
        let err: QuoteError = StoreError::Connection("refused".into()).into();
        assert_eq!(err.error_code(), "DEPENDENCY_FAILURE");
        assert!(err.is_retryable());
        assert!(err.to_string().contains("refused"));
    }

    #[test]
    fn test_pool_errors_are_connection_errors() {
        assert!(matches!(
            StoreError::from(sqlx::Error::PoolClosed),
            StoreError::Connection(_)
        ));
        assert!(matches!(
            StoreError::from(sqlx::Error::RowNotFound),
            StoreError::Database(_)
        ));
    }
}
