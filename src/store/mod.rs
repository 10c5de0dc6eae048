pub mod disk;
pub mod memory;

use crate::core::currency::{CurrencyKind, kind_of, normalize_code};
use crate::core::error::RateResult;
use crate::core::rates::{RateMap, RateRecord};
use crate::core::store::RateCollection;
use chrono::{DateTime, Utc};
use disk::DiskCollection;
use memory::MemoryCollection;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Durable last-known rate table.
///
/// All mutations go through one writer lock so concurrent cycles never
/// interleave their upserts. Reads go straight to the collection. Storage
/// failures are logged and swallowed: a failed write leaves the previous
/// table in place and a failed read behaves like an empty cache.
#[derive(Clone)]
pub struct RateStore {
    collection: Arc<dyn RateCollection>,
    writer: Arc<Mutex<()>>,
}

impl RateStore {
    pub fn new(collection: Arc<dyn RateCollection>) -> Self {
        Self {
            collection,
            writer: Arc::new(Mutex::new(())),
        }
    }

    /// Opens the fjall backed table under `data_path/cache`.
    pub fn open(data_path: &Path) -> RateResult<Self> {
        let collection = DiskCollection::open(&data_path.join("cache"))?;
        Ok(Self::new(Arc::new(collection)))
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryCollection::new()))
    }

    /// Inserts or overwrites a record for every code. Returns whether the
    /// write reached storage.
    pub async fn upsert_merge(&self, rates: &RateMap, timestamp: DateTime<Utc>) -> bool {
        let valid: RateMap = rates
            .iter()
            .filter_map(|(code, value)| {
                if *value > 0.0 && value.is_finite() {
                    Some((normalize_code(code), *value))
                } else {
                    warn!(code = %code, value, "Skipping non-positive rate");
                    None
                }
            })
            .collect();
        if valid.is_empty() {
            return true;
        }

        let _guard = self.writer.lock().await;
        match self.collection.upsert_merge(&valid, timestamp).await {
            Ok(()) => {
                debug!(count = valid.len(), %timestamp, "Persisted rates");
                true
            }
            Err(e) => {
                warn!(error = %e, "Failed to persist rates, keeping previous cache");
                false
            }
        }
    }

    /// Every record, sorted by code.
    pub async fn read_all(&self) -> Vec<RateRecord> {
        match self.collection.read_all().await {
            Ok(mut records) => {
                records.sort_by(|a, b| a.code.cmp(&b.code));
                records
            }
            Err(e) => {
                warn!(error = %e, "Failed to read rate cache");
                Vec::new()
            }
        }
    }

    pub async fn read_one(&self, code: &str) -> Option<RateRecord> {
        let code = normalize_code(code);
        self.collection
            .read_one(&code)
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, code = %code, "Failed to read rate");
                None
            })
    }

    /// Cached rates as a code to rate mapping.
    pub async fn rate_map(&self) -> RateMap {
        self.read_all()
            .await
            .into_iter()
            .map(|r| (r.code, r.units_per_usd))
            .collect()
    }

    pub async fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.read_all().await.iter().map(|r| r.updated_at).max()
    }

    pub async fn last_updated_for(&self, kind: CurrencyKind) -> Option<DateTime<Utc>> {
        self.read_all()
            .await
            .iter()
            .filter(|r| kind_of(&r.code) == kind)
            .map(|r| r.updated_at)
            .max()
    }

    /// Removes every record. Only used to seed previews and tests.
    pub async fn clear_all(&self) -> bool {
        let _guard = self.writer.lock().await;
        match self.collection.clear_all().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Failed to clear rate cache");
                false
            }
        }
    }
}
