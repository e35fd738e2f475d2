//! Identifier types for quote records.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for a quote record.
///
/// The same id is handed back to callers as the refresh job id, so it is the
/// handle used to poll for the outcome of a refresh.
/// Uses UUID v7 for time-ordered identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuoteId(Uuid);

impl QuoteId {
    /// Create a new quote ID.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Create from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parse from string.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for QuoteId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for QuoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for QuoteId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<Uuid> for QuoteId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_id_creation() {
        let id1 = QuoteId::new();
        let id2 = QuoteId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_quote_id_parse() {
        let uuid_str = "019456ab-1234-7def-8901-234567890abc";
        let id = QuoteId::parse(uuid_str).unwrap();
        assert_eq!(id.to_string(), uuid_str);
        assert!(QuoteId::parse("not-a-uuid").is_err());
    }

    #[test]
    fn test_quote_id_time_ordered() {
        let first = QuoteId::new();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = QuoteId::new();
        assert!(first < second);
    }

    #[test]
    fn test_quote_id_serializes_as_plain_string() {
        let id = QuoteId::parse("019456ab-1234-7def-8901-234567890abc").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"019456ab-1234-7def-8901-234567890abc\"");
    }
}
