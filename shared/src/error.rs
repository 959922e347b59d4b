//! Error taxonomy for the synchronization engine

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::DroneStatus;

#[derive(Error, Debug)]
pub enum DroneError {
    #[error("Drone not found: {0}")]
    NotFound(String),

    #[error("Drone already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Invalid transition for drone {drone_id}: cannot {action} while {from} ({reason})")]
    InvalidTransition {
        drone_id: String,
        from: DroneStatus,
        action: &'static str,
        reason: String,
    },

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// Not a failure: the report was superseded by a newer one
    #[error("Stale update for drone {drone_id}: {incoming} <= {stored}")]
    StaleUpdate {
        drone_id: String,
        incoming: DateTime<Utc>,
        stored: DateTime<Utc>,
    },

    #[error("Transport unavailable: {0}")]
    TransportUnavailable(String),

    /// A stored document that no longer decodes; retrying cannot fix it
    #[error("Corrupt record for drone {drone_id}: {reason}")]
    CorruptRecord { drone_id: String, reason: String },

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl DroneError {
    /// Whether redelivering the same input could succeed later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DroneError::Storage(_) | DroneError::TransportUnavailable(_)
        )
    }
}

pub type DroneResult<T> = Result<T, DroneError>;
