//! Whitelist of currency pairs the service refreshes.

use std::collections::HashSet;
use std::path::Path;

use fxquote_common::{CurrencyPair, QuoteError, Result};
use tracing::info;

/// Set of supported pairs loaded from a JSON array such as `["USD/EUR", "EUR/JPY"]`.
#[derive(Debug, Clone, Default)]
pub struct SupportedPairs {
    pairs: HashSet<CurrencyPair>,
}

impl SupportedPairs {
    /// Read the whitelist from `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|e| {
            QuoteError::ConfigurationError(format!("reading {}: {e}", path.display()))
        })?;
        let pairs = Self::from_json(&data).map_err(|e| match e {
            QuoteError::ConfigurationError(msg) => {
                QuoteError::ConfigurationError(format!("{}: {msg}", path.display()))
            }
            other => other,
        })?;

        info!(path = %path.display(), count = pairs.len(), "Loaded supported currency pairs");
        Ok(pairs)
    }

    /// Parse a JSON array of `BASE/QUOTE` strings.
    pub fn from_json(data: &str) -> Result<Self> {
        let pairs: Vec<CurrencyPair> = serde_json::from_str(data)
            .map_err(|e| QuoteError::ConfigurationError(format!("invalid pair list: {e}")))?;
        Ok(pairs.into_iter().collect())
    }

    pub fn contains(&self, pair: &CurrencyPair) -> bool {
        self.pairs.contains(pair)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl FromIterator<CurrencyPair> for SupportedPairs {
    fn from_iter<I: IntoIterator<Item = CurrencyPair>>(iter: I) -> Self {
        Self {
            pairs: iter.into_iter().collect(),
        }
    }
}
