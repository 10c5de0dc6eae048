//! Rate records, per-branch fetch results and merged snapshots

use crate::core::error::RateResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Mapping of currency code to units per 1 USD.
pub type RateMap = HashMap<String, f64>;

/// Last known rate for one code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateRecord {
    pub code: String,
    pub units_per_usd: f64,
    pub updated_at: DateTime<Utc>,
}

/// Rates produced by one fetch branch.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedRates {
    pub rates: RateMap,
    pub timestamp: DateTime<Utc>,
    pub warnings: Vec<String>,
}

impl FetchedRates {
    /// Contribution of a branch that was not requested.
    pub fn never() -> Self {
        Self {
            rates: RateMap::new(),
            timestamp: DateTime::<Utc>::MIN_UTC,
            warnings: Vec::new(),
        }
    }
}

/// Result of one fetch cycle, prior to persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct RatesSnapshot {
    pub rates: RateMap,
    pub fiat_timestamp: Option<DateTime<Utc>>,
    pub crypto_timestamp: Option<DateTime<Utc>>,
    pub combined_timestamp: DateTime<Utc>,
    /// Soft failures that did not fail the cycle.
    pub warnings: Vec<String>,
}

impl RatesSnapshot {
    pub fn is_degraded(&self) -> bool {
        !self.warnings.is_empty()
    }
}

#[async_trait]
pub trait RateFetching: Send + Sync {
    async fn fetch_all(
        &self,
        codes: &[String],
        include_fiat: bool,
        include_crypto: bool,
    ) -> RateResult<RatesSnapshot>;
}
