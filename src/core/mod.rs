//! Core types, configuration and abstractions

pub mod config;
pub mod conversion;
pub mod currency;
pub mod error;
pub mod log;
pub mod rates;
pub mod staleness;
pub mod store;

// Re-export main types for cleaner imports
pub use currency::{Currency, CurrencyKind};
pub use error::{RateError, RateResult};
pub use rates::{FetchedRates, RateFetching, RateMap, RateRecord, RatesSnapshot};
pub use staleness::Freshness;
