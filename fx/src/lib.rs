//! FxQuote Rate Fetchers
//!
//! External sources of FX rates for the quote refresh service.
//!
//! # Features
//!
//! - A single-attempt [`RateFetcher`] trait used by the refresh workers
//! - [`HttpRateFetcher`] for vatcomply-compatible `/rates?base=` endpoints
//! - A scripted `MockRateFetcher` behind the `test-utils` feature
//!
//! # Example
//!
//! ```rust,ignore
//! use fxquote_fx::{HttpRateFetcher, RateFetcher};
//! use fxquote_common::CurrencyPair;
//!
//! let fetcher = HttpRateFetcher::new("https://api.vatcomply.com", Duration::from_secs(5))?;
//! let rate = fetcher.fetch_rate(&CurrencyPair::parse("USD/EUR")?).await?;
//! ```

pub mod error;
pub mod http;
pub mod provider;

pub use error::{FetchError, FetchFailureKind, FetchResult};
pub use http::{HttpRateFetcher, DEFAULT_BASE_URL};
pub use provider::RateFetcher;

#[cfg(any(test, feature = "test-utils"))]
pub use provider::MockRateFetcher;
