//! FxQuote Common Types
//!
//! This crate contains shared types used across the quote refresh service,
//! including identifiers, currency pairs, the quote record and its status
//! state machine, and the service error taxonomy.

pub mod identifiers;
pub mod currency;
pub mod quote;
pub mod error;
pub mod time;

pub use identifiers::*;
pub use currency::*;
pub use quote::*;
pub use error::*;
pub use time::*;
