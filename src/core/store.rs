//! Storage abstraction for the durable rate table

use crate::core::error::RateResult;
use crate::core::rates::{RateMap, RateRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// A flat table of rate records keyed by currency code.
///
/// Implementations must apply `upsert_merge` atomically: either every pair is
/// written or none is.
#[async_trait]
pub trait RateCollection: Send + Sync {
    async fn upsert_merge(&self, rates: &RateMap, timestamp: DateTime<Utc>) -> RateResult<()>;

    async fn read_all(&self) -> RateResult<Vec<RateRecord>>;

    async fn read_one(&self, code: &str) -> RateResult<Option<RateRecord>>;

    async fn clear_all(&self) -> RateResult<()>;
}
