use crate::core::error::{RateError, RateResult};
use crate::core::rates::{RateMap, RateRecord};
use crate::core::store::RateCollection;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use std::path::Path;
use tracing::debug;

const RATES_PARTITION: &str = "rates";

/// Durable rate table backed by a fjall partition. Rows are JSON encoded
/// `RateRecord`s keyed by currency code.
pub struct DiskCollection {
    keyspace: Keyspace,
    partition: PartitionHandle,
}

impl DiskCollection {
    pub fn open(path: &Path) -> RateResult<Self> {
        std::fs::create_dir_all(path).map_err(|e| RateError::Storage(e.to_string()))?;
        let keyspace = Config::new(path).open()?;
        let partition =
            keyspace.open_partition(RATES_PARTITION, PartitionCreateOptions::default())?;
        debug!("Opened rate cache at {}", path.display());
        Ok(Self {
            keyspace,
            partition,
        })
    }
}

#[async_trait]
impl RateCollection for DiskCollection {
    async fn upsert_merge(&self, rates: &RateMap, timestamp: DateTime<Utc>) -> RateResult<()> {
        // Overwriting a key replaces the whole row, so insert and update are the same write.
        let mut batch = self.keyspace.batch();
        for (code, value) in rates {
            let record = RateRecord {
                code: code.clone(),
                units_per_usd: *value,
                updated_at: timestamp,
            };
            batch.insert(
                &self.partition,
                code.as_bytes(),
                serde_json::to_vec(&record)?,
            );
        }
        batch.commit()?;
        self.keyspace.persist(PersistMode::SyncAll)?;
        debug!("Cache UPSERT of {} rates", rates.len());
        Ok(())
    }

    async fn read_all(&self) -> RateResult<Vec<RateRecord>> {
        let mut records = Vec::new();
        for item in self.partition.iter() {
            let (_, value) = item?;
            records.push(serde_json::from_slice(&value)?);
        }
        Ok(records)
    }

    async fn read_one(&self, code: &str) -> RateResult<Option<RateRecord>> {
        match self.partition.get(code.as_bytes())? {
            Some(value) => {
                debug!("Cache HIT for code: {}", code);
                Ok(Some(serde_json::from_slice(&value)?))
            }
            None => {
                debug!("Cache MISS for code: {}", code);
                Ok(None)
            }
        }
    }

    async fn clear_all(&self) -> RateResult<()> {
        let mut batch = self.keyspace.batch();
        for item in self.partition.keys() {
            batch.remove(&self.partition, item?);
        }
        batch.commit()?;
        self.keyspace.persist(PersistMode::SyncAll)?;
        debug!("Cache CLEAR");
        Ok(())
    }
}
