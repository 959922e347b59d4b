//! JSON wire codec for the command and status channels
//!
//! Status reports travel as:
//! ```text
//! {"message_id": "..", "drone_id": "..", "dock_id": ".."|null, "status": "flying", "last_updated": "2024-01-01T00:00:00.000000Z"}
//! ```
//!
//! Decoding is strict: a report missing `drone_id`, `status` or its timestamp,
//! or naming a status outside the known set, is rejected rather than coerced.

use bytes::Bytes;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{CommandMessage, DroneError, DroneStatus, StatusMessage};

/// Maximum accepted payload size (64 KiB); both message shapes are tiny
pub const MAX_PAYLOAD_SIZE: usize = 64 * 1024;

/// Errors that can occur during encoding/decoding
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Payload too large: {0} bytes (max: {MAX_PAYLOAD_SIZE})")]
    PayloadTooLarge(usize),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid status: {0:?}")]
    InvalidStatus(String),

    #[error("Invalid timestamp: {0:?}")]
    InvalidTimestamp(String),
}

impl From<CodecError> for DroneError {
    fn from(err: CodecError) -> Self {
        DroneError::MalformedMessage(err.to_string())
    }
}

/// Status report as it appears on the wire
#[derive(Debug, Default, Serialize, Deserialize)]
struct StatusWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message_id: Option<String>,
    #[serde(default)]
    drone_id: Option<String>,
    #[serde(default)]
    dock_id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    last_updated: Option<String>,
    /// Older producers name the report time `timestamp`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,
}

/// Encode a status report in its canonical form
pub fn encode_status(message: &StatusMessage) -> Result<Bytes, CodecError> {
    let wire = StatusWire {
        message_id: message.message_id.clone(),
        drone_id: Some(message.drone_id.clone()),
        dock_id: message.dock_id.clone(),
        status: Some(message.status.as_str().to_string()),
        last_updated: Some(format_timestamp(message.timestamp)),
        timestamp: None,
    };
    Ok(Bytes::from(serde_json::to_vec(&wire)?))
}

/// Decode and validate a status report
pub fn decode_status(payload: &[u8]) -> Result<StatusMessage, CodecError> {
    check_size(payload)?;
    let wire: StatusWire = serde_json::from_slice(payload)?;

    let drone_id = wire
        .drone_id
        .filter(|id| !id.trim().is_empty())
        .ok_or(CodecError::MissingField("drone_id"))?;

    let raw_status = wire
        .status
        .filter(|s| !s.trim().is_empty())
        .ok_or(CodecError::MissingField("status"))?;
    let status: DroneStatus = raw_status
        .parse()
        .map_err(|_| CodecError::InvalidStatus(raw_status.clone()))?;

    let raw_ts = wire
        .last_updated
        .or(wire.timestamp)
        .ok_or(CodecError::MissingField("last_updated"))?;
    let timestamp = parse_timestamp(&raw_ts)?;

    Ok(StatusMessage {
        message_id: wire.message_id,
        drone_id: drone_id.trim().to_string(),
        status,
        dock_id: wire.dock_id,
        timestamp,
    })
}

/// Encode a command-channel message
pub fn encode_command(message: &CommandMessage) -> Result<Bytes, CodecError> {
    Ok(Bytes::from(serde_json::to_vec(message)?))
}

/// Decode a command-channel message
///
/// Only the shape is checked here; verb and guard validation belong to the
/// dispatcher so that they surface as domain errors.
pub fn decode_command(payload: &[u8]) -> Result<CommandMessage, CodecError> {
    check_size(payload)?;
    Ok(serde_json::from_slice(payload)?)
}

/// RFC 3339 with microseconds, always in UTC
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an ISO-8601 timestamp. Values without an offset are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, CodecError> {
    let raw = raw.trim();
    let parsed = match DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => ts.with_timezone(&Utc),
        Err(_) => NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map_err(|_| CodecError::InvalidTimestamp(raw.to_string()))?
            .and_utc(),
    };
    Ok(parsed.trunc_subsecs(6))
}

fn check_size(payload: &[u8]) -> Result<(), CodecError> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(CodecError::PayloadTooLarge(payload.len()));
    }
    Ok(())
}
