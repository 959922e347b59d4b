//! Sled-backed record store
//!
//! Records live in the `drones` tree, keyed by drone id, with the record
//! serialized to JSON as the value. Sled gives per-key atomicity, which is
//! all the callers rely on.

use super::traits::DroneStore;
use anyhow::Context;
use async_trait::async_trait;
use drone_sync_shared::{DroneError, DroneRecord, DroneResult};
use std::path::Path;

const DRONES_TREE: &str = "drones";

/// Durable record store on an embedded sled database
#[derive(Clone)]
pub struct SledDroneStore {
    db: sled::Db,
    tree: sled::Tree,
}

impl SledDroneStore {
    /// Open or create the database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let db = sled::open(path_ref)
            .with_context(|| format!("Failed to open sled database at {:?}", path_ref))?;
        let store = Self::from_db(db)?;

        tracing::info!(path = ?path_ref, "drone record store opened");
        Ok(store)
    }

    /// Use an already-open database
    pub fn from_db(db: sled::Db) -> anyhow::Result<Self> {
        let tree = db
            .open_tree(DRONES_TREE)
            .context("Failed to open drones tree")?;
        Ok(Self { db, tree })
    }

    fn decode(drone_id: &str, bytes: &[u8]) -> DroneResult<DroneRecord> {
        serde_json::from_slice(bytes).map_err(|e| DroneError::CorruptRecord {
            drone_id: drone_id.to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl DroneStore for SledDroneStore {
    async fn find_by_id(&self, drone_id: &str) -> DroneResult<DroneRecord> {
        let bytes = self
            .tree
            .get(drone_id.as_bytes())
            .context("Failed to read drone record")?
            .ok_or_else(|| DroneError::NotFound(drone_id.to_string()))?;
        Self::decode(drone_id, &bytes)
    }

    async fn upsert(&self, record: &DroneRecord) -> DroneResult<()> {
        let value = serde_json::to_vec(record).context("Failed to serialize drone record")?;
        self.tree
            .insert(record.drone_id.as_bytes(), value)
            .context("Failed to write drone record")?;

        tracing::debug!(
            drone_id = %record.drone_id,
            status = %record.status,
            "stored drone record"
        );
        Ok(())
    }

    async fn delete(&self, drone_id: &str) -> DroneResult<DroneRecord> {
        let bytes = self
            .tree
            .remove(drone_id.as_bytes())
            .context("Failed to delete drone record")?
            .ok_or_else(|| DroneError::NotFound(drone_id.to_string()))?;
        Self::decode(drone_id, &bytes)
    }

    async fn list(&self) -> DroneResult<Vec<DroneRecord>> {
        let mut records = Vec::new();
        for item in self.tree.iter() {
            let (key, value) = item.context("Failed to scan drone records")?;
            match Self::decode(&String::from_utf8_lossy(&key), &value) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(error = %e, "skipping unreadable drone record"),
            }
        }
        Ok(records)
    }

    async fn flush(&self) -> DroneResult<()> {
        self.db
            .flush_async()
            .await
            .context("Failed to flush drone records")?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "sled"
    }
}
