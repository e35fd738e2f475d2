//! Quote records and their status state machine.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::QuoteError;
use crate::time::{now, Timestamp};
use crate::{CurrencyPair, QuoteId};

/// Quote status representing the refresh lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuoteStatus {
    /// Refresh admitted, fetch not yet written back.
    Pending,
    /// Rate fetched and stored.
    Done,
    /// Fetch failed.
    Error,
}

impl QuoteStatus {
    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, QuoteStatus::Done | QuoteStatus::Error)
    }

    /// Get valid next states from current state.
    pub fn valid_transitions(&self) -> &[QuoteStatus] {
        match self {
            QuoteStatus::Pending => &[QuoteStatus::Done, QuoteStatus::Error],
            QuoteStatus::Done => &[],
            QuoteStatus::Error => &[],
        }
    }

    /// Check if transition to given state is valid.
    pub fn can_transition_to(&self, next: QuoteStatus) -> bool {
        self.valid_transitions().contains(&next)
    }

    /// Name used in the persisted `status` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            QuoteStatus::Pending => "pending",
            QuoteStatus::Done => "done",
            QuoteStatus::Error => "error",
        }
    }
}

impl fmt::Display for QuoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuoteStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(QuoteStatus::Pending),
            "done" => Ok(QuoteStatus::Done),
            "error" => Ok(QuoteStatus::Error),
            other => Err(format!("unknown quote status '{other}'")),
        }
    }
}

/// A quote record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// Unique quote identifier, doubles as the refresh job id.
    pub id: QuoteId,
    /// Currency pair being quoted.
    pub pair: CurrencyPair,
    /// Fetched rate. Absent while pending and after a failed fetch.
    pub price: Option<Decimal>,
    /// When the record reached its terminal status.
    pub updated_at: Option<Timestamp>,
    /// Current status.
    pub status: QuoteStatus,
}

impl Quote {
    /// Create a fresh pending record.
    pub fn pending(id: QuoteId, pair: CurrencyPair) -> Self {
        Self {
            id,
            pair,
            price: None,
            updated_at: None,
            status: QuoteStatus::Pending,
        }
    }

    /// Check if the quote has reached Done or Error.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply a status update, enforcing the state machine.
    pub fn apply(&mut self, update: &StatusUpdate) -> Result<(), QuoteError> {
        if !self.status.can_transition_to(update.status) {
            return Err(QuoteError::InvalidTransition {
                from: self.status,
                to: update.status,
            });
        }

        self.price = update.price;
        self.updated_at = Some(update.updated_at);
        self.status = update.status;
        Ok(())
    }
}

/// The single write a worker performs on a pending quote.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub price: Option<Decimal>,
    pub status: QuoteStatus,
    pub updated_at: Timestamp,
}

impl StatusUpdate {
    /// Successful fetch.
    pub fn done(price: Decimal) -> Self {
        Self {
            price: Some(price),
            status: QuoteStatus::Done,
            updated_at: now(),
        }
    }

    /// Failed fetch. The price stays unset.
    pub fn failed() -> Self {
        Self {
            price: None,
            status: QuoteStatus::Error,
            updated_at: now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn usd_eur() -> CurrencyPair {
        CurrencyPair::parse("USD/EUR").unwrap()
    }

    #[test]
    fn test_status_transitions() {
        assert!(QuoteStatus::Pending.can_transition_to(QuoteStatus::Done));
        assert!(QuoteStatus::Pending.can_transition_to(QuoteStatus::Error));
        assert!(!QuoteStatus::Pending.can_transition_to(QuoteStatus::Pending));
        assert!(!QuoteStatus::Done.can_transition_to(QuoteStatus::Error));
        assert!(!QuoteStatus::Error.can_transition_to(QuoteStatus::Done));
    }

    #[test]
    fn test_status_terminal() {
        assert!(!QuoteStatus::Pending.is_terminal());
        assert!(QuoteStatus::Done.is_terminal());
        assert!(QuoteStatus::Error.is_terminal());
    }

    #[test]
    fn test_status_column_names() {
        for status in [QuoteStatus::Pending, QuoteStatus::Done, QuoteStatus::Error] {
            assert_eq!(status.as_str().parse::<QuoteStatus>().unwrap(), status);
        }
        assert!("PENDING".parse::<QuoteStatus>().is_err());
    }

    #[test]
    fn test_pending_quote_has_no_price() {
        let quote = Quote::pending(QuoteId::new(), usd_eur());
        assert_eq!(quote.status, QuoteStatus::Pending);
        assert!(quote.price.is_none());
        assert!(quote.updated_at.is_none());
        assert!(!quote.is_terminal());
    }

    #[test]
    fn test_apply_done() {
        let mut quote = Quote::pending(QuoteId::new(), usd_eur());
        quote.apply(&StatusUpdate::done(dec!(0.92))).unwrap();

        assert_eq!(quote.status, QuoteStatus::Done);
        assert_eq!(quote.price, Some(dec!(0.92)));
        assert!(quote.updated_at.is_some());
    }

    #[test]
    fn test_apply_failed_keeps_price_unset() {
        let mut quote = Quote::pending(QuoteId::new(), usd_eur());
        quote.apply(&StatusUpdate::failed()).unwrap();

        assert_eq!(quote.status, QuoteStatus::Error);
        assert!(quote.price.is_none());
        assert!(quote.updated_at.is_some());
    }

    #[test]
    fn test_terminal_quote_rejects_second_update() {
        let mut quote = Quote::pending(QuoteId::new(), usd_eur());
        quote.apply(&StatusUpdate::done(dec!(0.92))).unwrap();

        let err = quote.apply(&StatusUpdate::failed()).unwrap_err();
        assert!(matches!(
            err,
            QuoteError::InvalidTransition {
                from: QuoteStatus::Done,
                to: QuoteStatus::Error
            }
        ));
        assert_eq!(quote.price, Some(dec!(0.92)));
    }
}
