use crate::core::error::RateResult;
use crate::core::rates::{RateMap, RateRecord};
use crate::core::store::RateCollection;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// In-memory rate table, used for previews and tests.
#[derive(Clone, Default)]
pub struct MemoryCollection {
    inner: Arc<Mutex<HashMap<String, RateRecord>>>,
}

impl MemoryCollection {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateCollection for MemoryCollection {
    async fn upsert_merge(&self, rates: &RateMap, timestamp: DateTime<Utc>) -> RateResult<()> {
        let mut table = self.inner.lock().await;
        for (code, value) in rates {
            table
                .entry(code.clone())
                .and_modify(|record| {
                    record.units_per_usd = *value;
                    record.updated_at = timestamp;
                })
                .or_insert_with(|| RateRecord {
                    code: code.clone(),
                    units_per_usd: *value,
                    updated_at: timestamp,
                });
        }
        debug!("Memory UPSERT of {} rates", rates.len());
        Ok(())
    }

    async fn read_all(&self) -> RateResult<Vec<RateRecord>> {
        let table = self.inner.lock().await;
        Ok(table.values().cloned().collect())
    }

    async fn read_one(&self, code: &str) -> RateResult<Option<RateRecord>> {
        let table = self.inner.lock().await;
        Ok(table.get(code).cloned())
    }

    async fn clear_all(&self) -> RateResult<()> {
        self.inner.lock().await.clear();
        debug!("Memory CLEAR");
        Ok(())
    }
}
