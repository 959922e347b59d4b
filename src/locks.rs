//! Per-drone serialization
//!
//! Every read-modify-write of a drone record runs while holding that drone's
//! mutex, so commands and status reports for one drone never interleave while
//! unrelated drones proceed in parallel. An entry lives only while someone
//! holds or waits on it.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockTable = DashMap<String, Arc<Mutex<()>>>;

/// Table of async mutexes keyed by drone id
#[derive(Default)]
pub struct DroneLocks {
    locks: Arc<LockTable>,
}

/// Exclusive access to one drone; the table entry is dropped with the last guard
pub struct DroneGuard {
    guard: Option<OwnedMutexGuard<()>>,
    drone_id: String,
    locks: Arc<LockTable>,
}

impl Drop for DroneGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Waiters hold a clone of the mutex, so the entry survives for them
        self.locks
            .remove_if(&self.drone_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl DroneLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to one drone
    pub async fn acquire(&self, drone_id: &str) -> DroneGuard {
        let lock = self
            .locks
            .entry(drone_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock_owned().await;

        DroneGuard {
            guard: Some(guard),
            drone_id: drone_id.to_string(),
            locks: Arc::clone(&self.locks),
        }
    }

    /// Number of drones currently locked or awaited
    pub fn len(&self) -> usize {
        self.locks.len()
    }
}
