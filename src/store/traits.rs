//! Record store abstraction for pluggable storage backends

use async_trait::async_trait;
use drone_sync_shared::{DroneError, DroneRecord, DroneResult};

/// Keyed document storage for the latest known state of each drone
///
/// Each operation is atomic for its key. Merge and transition decisions are
/// made by the caller before `upsert`; the store never inspects a record.
#[async_trait]
pub trait DroneStore: Send + Sync {
    /// Load a record, failing with `NotFound` when the id is unknown
    async fn find_by_id(&self, drone_id: &str) -> DroneResult<DroneRecord>;

    /// Replace the whole document keyed by `record.drone_id`
    async fn upsert(&self, record: &DroneRecord) -> DroneResult<()>;

    /// Remove a record, returning what was stored
    async fn delete(&self, drone_id: &str) -> DroneResult<DroneRecord>;

    /// All stored records, ordered by drone id
    async fn list(&self) -> DroneResult<Vec<DroneRecord>>;

    /// Persist any buffered writes
    async fn flush(&self) -> DroneResult<()> {
        Ok(())
    }

    /// Load a record, mapping an unknown id to `None`
    async fn get(&self, drone_id: &str) -> DroneResult<Option<DroneRecord>> {
        match self.find_by_id(drone_id).await {
            Ok(record) => Ok(Some(record)),
            Err(DroneError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Human-readable backend name
    fn name(&self) -> &'static str;
}
