//! Command dispatcher: applies operator commands to stored drone records

use crate::locks::DroneLocks;
use crate::status::StatusPublisher;
use crate::store::DroneStore;
use drone_sync_shared::state_machine::{self, Transition};
use drone_sync_shared::{now, CommandKind, CommandMessage, DroneRecord, DroneResult};
use std::sync::Arc;
use tracing::info;

/// Loads a drone, runs the state machine, persists the result and announces it
///
/// Drone ids are trimmed by every operation before they reach the store or
/// the lock table. Each command holds the drone's lock from load to persist.
/// Publication happens after the lock is released; a publish failure never
/// fails the command because the record is already stored.
pub struct CommandDispatcher {
    store: Arc<dyn DroneStore>,
    publisher: Arc<StatusPublisher>,
    locks: Arc<DroneLocks>,
}

impl CommandDispatcher {
    pub fn new(
        store: Arc<dyn DroneStore>,
        publisher: Arc<StatusPublisher>,
        locks: Arc<DroneLocks>,
    ) -> Self {
        Self {
            store,
            publisher,
            locks,
        }
    }

    /// Execute a command-channel message
    pub async fn dispatch(&self, command: &CommandMessage) -> DroneResult<DroneRecord> {
        match command.kind()? {
            CommandKind::Takeoff => self.takeoff(&command.drone_id).await,
            CommandKind::Land => {
                let dock_id = command.dock_id.as_deref().unwrap_or_default();
                self.land(&command.drone_id, dock_id).await
            }
            CommandKind::ReturnHome => self.return_home(&command.drone_id).await,
        }
    }

    pub async fn takeoff(&self, drone_id: &str) -> DroneResult<DroneRecord> {
        self.transition(drone_id, Transition::Takeoff).await
    }

    pub async fn land(&self, drone_id: &str, dock_id: &str) -> DroneResult<DroneRecord> {
        self.transition(
            drone_id,
            Transition::Land {
                dock_id: dock_id.to_string(),
            },
        )
        .await
    }

    pub async fn return_home(&self, drone_id: &str) -> DroneResult<DroneRecord> {
        self.transition(drone_id, Transition::ReturnHome).await
    }

    /// Move a docked drone to a different dock
    pub async fn assign_dock(&self, drone_id: &str, dock_id: &str) -> DroneResult<DroneRecord> {
        self.transition(
            drone_id,
            Transition::AssignDock {
                dock_id: dock_id.to_string(),
            },
        )
        .await
    }

    /// Create a record for a new drone, docked when a dock is given
    pub async fn register(&self, drone_id: &str, dock_id: Option<&str>) -> DroneResult<DroneRecord> {
        let drone_id = drone_id.trim();
        let record = {
            let _guard = self.locks.acquire(drone_id).await;
            let existing = self.store.get(drone_id).await?;
            let record = state_machine::register(existing.as_ref(), drone_id, dock_id, now())?;
            self.store.upsert(&record).await?;
            record
        };

        info!(
            drone_id = %record.drone_id,
            status = %record.status,
            dock_id = record.dock_id.as_deref().unwrap_or("-"),
            "registered drone"
        );
        self.publisher.publish(&record).await;
        Ok(record)
    }

    /// Remove a drone, returning its last record
    pub async fn unregister(&self, drone_id: &str) -> DroneResult<DroneRecord> {
        let drone_id = drone_id.trim();
        let removed = {
            let _guard = self.locks.acquire(drone_id).await;
            let existing = self.store.get(drone_id).await?;
            let removed = state_machine::unregister(existing, drone_id)?;
            self.store.delete(&removed.drone_id).await?
        };

        info!(drone_id = %removed.drone_id, "unregistered drone");
        Ok(removed)
    }

    /// Read a record straight from the store
    pub async fn get(&self, drone_id: &str) -> DroneResult<DroneRecord> {
        self.store.find_by_id(drone_id.trim()).await
    }

    pub async fn list(&self) -> DroneResult<Vec<DroneRecord>> {
        self.store.list().await
    }

    async fn transition(&self, drone_id: &str, transition: Transition) -> DroneResult<DroneRecord> {
        let drone_id = drone_id.trim();
        let (previous, record) = {
            let _guard = self.locks.acquire(drone_id).await;
            let current = self.store.find_by_id(drone_id).await?;
            let record = state_machine::apply(&current, &transition, now())?;
            self.store.upsert(&record).await?;
            (current.status, record)
        };

        info!(
            drone_id = %record.drone_id,
            command = transition.action(),
            from = %previous,
            to = %record.status,
            "command applied"
        );
        self.publisher.publish(&record).await;
        Ok(record)
    }
}
