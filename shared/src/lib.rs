//! drone-sync Shared Types
//!
//! This crate provides the domain types, error taxonomy, state machine and
//! wire codec shared by the command dispatcher and the status ingestor.

pub mod codec;
pub mod error;
pub mod state_machine;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use error::{DroneError, DroneResult};

/// Current UTC time, truncated to the precision carried on the wire
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Default channel names
pub mod topics {
    /// Inbound flight commands
    pub const COMMAND_TOPIC: &str = "drone/command";

    /// Status reports (published by the dispatcher and by drones)
    pub const STATUS_TOPIC: &str = "drone/status";
}

/// Lifecycle status of a drone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DroneStatus {
    /// Pre-registration or unrecoverable
    Unknown,
    Idle,
    Docked,
    Flying,
    Returning,
}

impl DroneStatus {
    /// Canonical lowercase wire form
    pub fn as_str(&self) -> &'static str {
        match self {
            DroneStatus::Unknown => "unknown",
            DroneStatus::Idle => "idle",
            DroneStatus::Docked => "docked",
            DroneStatus::Flying => "flying",
            DroneStatus::Returning => "returning",
        }
    }
}

impl fmt::Display for DroneStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DroneStatus {
    type Err = DroneError;

    /// Strict, case-insensitive parse. Anything else is a malformed report.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unknown" => Ok(DroneStatus::Unknown),
            "idle" => Ok(DroneStatus::Idle),
            "docked" => Ok(DroneStatus::Docked),
            "flying" => Ok(DroneStatus::Flying),
            "returning" => Ok(DroneStatus::Returning),
            _ => Err(DroneError::MalformedMessage(format!(
                "unrecognised status: {:?}",
                s
            ))),
        }
    }
}

/// Latest known state of one drone, as persisted by the record store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroneRecord {
    pub drone_id: String,
    pub dock_id: Option<String>,
    pub status: DroneStatus,
    pub last_updated: DateTime<Utc>,
}

impl DroneRecord {
    /// Whether the drone is parked at a known dock
    pub fn is_docked(&self) -> bool {
        self.status == DroneStatus::Docked && self.dock_id.is_some()
    }
}

/// Flight command verbs accepted on the command channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Takeoff,
    Land,
    ReturnHome,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Takeoff => "takeoff",
            CommandKind::Land => "land",
            CommandKind::ReturnHome => "return-home",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandKind {
    type Err = DroneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "takeoff" => Ok(CommandKind::Takeoff),
            "land" => Ok(CommandKind::Land),
            "return-home" => Ok(CommandKind::ReturnHome),
            other => Err(DroneError::InvalidCommand(format!(
                "unknown command verb: {:?}",
                other
            ))),
        }
    }
}

/// A decoded command-channel message
///
/// The verb is kept as received; the dispatcher rejects unknown verbs so the
/// caller gets `InvalidCommand` rather than a decode failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandMessage {
    pub drone_id: String,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dock_id: Option<String>,
}

impl CommandMessage {
    pub fn new(drone_id: impl Into<String>, command: CommandKind) -> Self {
        Self {
            drone_id: drone_id.into(),
            command: command.as_str().to_string(),
            dock_id: None,
        }
    }

    pub fn with_dock(mut self, dock_id: impl Into<String>) -> Self {
        self.dock_id = Some(dock_id.into());
        self
    }

    /// Resolve the verb
    pub fn kind(&self) -> DroneResult<CommandKind> {
        self.command.parse()
    }
}

/// A validated status report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub message_id: Option<String>,
    pub drone_id: String,
    pub status: DroneStatus,
    pub dock_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl StatusMessage {
    /// Build the report describing a persisted snapshot, with a fresh message id
    pub fn from_record(record: &DroneRecord) -> Self {
        Self {
            message_id: Some(uuid::Uuid::new_v4().to_string()),
            drone_id: record.drone_id.clone(),
            status: record.status,
            dock_id: record.dock_id.clone(),
            timestamp: record.last_updated,
        }
    }
}
