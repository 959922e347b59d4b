//! In-memory record store

use super::traits::DroneStore;
use async_trait::async_trait;
use drone_sync_shared::{DroneError, DroneRecord, DroneResult};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Record store backed by a `HashMap`; contents are lost on restart
pub struct MemoryDroneStore {
    records: Arc<RwLock<HashMap<String, DroneRecord>>>,
}

impl MemoryDroneStore {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of stored records
    pub async fn count(&self) -> usize {
        self.records.read().await.len()
    }
}

impl Default for MemoryDroneStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DroneStore for MemoryDroneStore {
    async fn find_by_id(&self, drone_id: &str) -> DroneResult<DroneRecord> {
        self.records
            .read()
            .await
            .get(drone_id)
            .cloned()
            .ok_or_else(|| DroneError::NotFound(drone_id.to_string()))
    }

    async fn upsert(&self, record: &DroneRecord) -> DroneResult<()> {
        self.records
            .write()
            .await
            .insert(record.drone_id.clone(), record.clone());
        Ok(())
    }

    async fn delete(&self, drone_id: &str) -> DroneResult<DroneRecord> {
        self.records
            .write()
            .await
            .remove(drone_id)
            .ok_or_else(|| DroneError::NotFound(drone_id.to_string()))
    }

    async fn list(&self) -> DroneResult<Vec<DroneRecord>> {
        let mut records: Vec<DroneRecord> = self.records.read().await.values().cloned().collect();
        records.sort_by(|a, b| a.drone_id.cmp(&b.drone_id));
        Ok(records)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drone_sync_shared::{now, DroneStatus};

    fn record(id: &str, status: DroneStatus) -> DroneRecord {
        DroneRecord {
            drone_id: id.into(),
            dock_id: None,
            status,
            last_updated: now(),
        }
    }

    #[tokio::test]
    async fn test_find_unknown_is_not_found() {
        let store = MemoryDroneStore::new();
        assert!(matches!(
            store.find_by_id("drone-1").await,
            Err(DroneError::NotFound(_))
        ));
        assert!(store.get("drone-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_replaces_document() {
        let store = MemoryDroneStore::new();
        store.upsert(&record("drone-1", DroneStatus::Idle)).await.unwrap();
        store.upsert(&record("drone-1", DroneStatus::Flying)).await.unwrap();

        assert_eq!(store.count().await, 1);
        let stored = store.find_by_id("drone-1").await.unwrap();
        assert_eq!(stored.status, DroneStatus::Flying);
    }

    #[tokio::test]
    async fn test_delete() {
        let store = MemoryDroneStore::new();
        store.upsert(&record("drone-1", DroneStatus::Idle)).await.unwrap();

        let deleted = store.delete("drone-1").await.unwrap();
        assert_eq!(deleted.drone_id, "drone-1");
        assert!(matches!(
            store.delete("drone-1").await,
            Err(DroneError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_is_sorted() {
        let store = MemoryDroneStore::new();
        store.upsert(&record("drone-b", DroneStatus::Idle)).await.unwrap();
        store.upsert(&record("drone-a", DroneStatus::Docked)).await.unwrap();

        let ids: Vec<String> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.drone_id)
            .collect();
        assert_eq!(ids, vec!["drone-a", "drone-b"]);
    }
}
