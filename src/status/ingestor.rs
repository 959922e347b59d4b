//! Status ingestor
//!
//! Inbound reports are merged last-writer-wins on `last_updated`. The read,
//! merge and write for one drone happen under that drone's lock, so a report
//! and a command for the same drone can never overwrite each other's result.

use crate::locks::DroneLocks;
use crate::store::DroneStore;
use crate::transport::{InboundMessage, MessageHandler};
use async_trait::async_trait;
use drone_sync_shared::{
    codec, state_machine, DroneError, DroneRecord, DroneResult, StatusMessage,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What happened to one inbound report
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// The report was newer and replaced the stored record
    Applied(DroneRecord),
    /// The stored record is as new or newer; nothing changed
    Stale,
    /// No record exists for the reported drone
    UnknownDrone,
    /// The payload could not be decoded
    Malformed,
}

pub struct StatusIngestor {
    store: Arc<dyn DroneStore>,
    locks: Arc<DroneLocks>,
}

impl StatusIngestor {
    pub fn new(store: Arc<dyn DroneStore>, locks: Arc<DroneLocks>) -> Self {
        Self { store, locks }
    }

    /// Decode a raw payload and merge it
    ///
    /// Only storage failures are returned as errors; everything else is a
    /// terminal outcome for the message.
    pub async fn ingest(&self, payload: &[u8]) -> DroneResult<IngestOutcome> {
        let report = match codec::decode_status(payload) {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, payload_size = payload.len(), "discarding malformed status report");
                return Ok(IngestOutcome::Malformed);
            }
        };
        self.apply(report).await
    }

    /// Merge an already decoded report
    pub async fn apply(&self, report: StatusMessage) -> DroneResult<IngestOutcome> {
        let _guard = self.locks.acquire(&report.drone_id).await;

        let current = match self.store.get(&report.drone_id).await? {
            Some(current) => current,
            None => {
                warn!(
                    drone_id = %report.drone_id,
                    status = %report.status,
                    "status report for no such drone"
                );
                return Ok(IngestOutcome::UnknownDrone);
            }
        };

        let merged = match state_machine::reconcile(&current, &report) {
            Ok(merged) => merged,
            Err(DroneError::StaleUpdate { incoming, stored, .. }) => {
                debug!(
                    drone_id = %report.drone_id,
                    incoming = %codec::format_timestamp(incoming),
                    stored = %codec::format_timestamp(stored),
                    "ignoring stale status report"
                );
                return Ok(IngestOutcome::Stale);
            }
            Err(e) => return Err(e),
        };

        if !state_machine::is_valid_transition(current.status, merged.status) {
            debug!(
                drone_id = %merged.drone_id,
                from = %current.status,
                to = %merged.status,
                "status report jumps outside the command state machine"
            );
        }

        self.store.upsert(&merged).await?;

        info!(
            drone_id = %merged.drone_id,
            status = %merged.status,
            dock_id = merged.dock_id.as_deref().unwrap_or("-"),
            "applied status report"
        );
        Ok(IngestOutcome::Applied(merged))
    }
}

#[async_trait]
impl MessageHandler for StatusIngestor {
    async fn handle(&self, message: &InboundMessage) -> DroneResult<()> {
        self.ingest(&message.payload).await.map(|_| ())
    }

    fn name(&self) -> &'static str {
        "status-ingestor"
    }
}
