//! FxQuote Quote Store
//!
//! Durable storage for quote records behind the [`QuoteStore`] trait, with a
//! PostgreSQL implementation for production and an in-memory one for tests
//! and local runs.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryQuoteStore;
pub use postgres::{PgQuoteStore, QuoteRow};
pub use store::{InsertOutcome, QuoteStore};
