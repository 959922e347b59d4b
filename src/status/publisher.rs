//! Status publisher

use crate::transport::{DeliveryGuarantee, Transport};
use drone_sync_shared::{codec, DroneRecord, DroneResult, StatusMessage};
use std::sync::Arc;
use tracing::{debug, warn};

/// Serializes drone snapshots and hands them to the transport
pub struct StatusPublisher {
    transport: Arc<dyn Transport>,
    topic: String,
}

impl StatusPublisher {
    pub fn new(transport: Arc<dyn Transport>, topic: impl Into<String>) -> Self {
        Self {
            transport,
            topic: topic.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Publish a snapshot, returning the message that was sent
    pub async fn try_publish(&self, record: &DroneRecord) -> DroneResult<StatusMessage> {
        let message = StatusMessage::from_record(record);
        let payload = codec::encode_status(&message)?;

        self.transport
            .publish(&self.topic, payload, DeliveryGuarantee::AtLeastOnce)
            .await?;

        debug!(
            drone_id = %message.drone_id,
            status = %message.status,
            message_id = message.message_id.as_deref().unwrap_or_default(),
            "published drone status"
        );
        Ok(message)
    }

    /// Publish a snapshot; a failure is logged and otherwise ignored
    pub async fn publish(&self, record: &DroneRecord) -> Option<StatusMessage> {
        match self.try_publish(record).await {
            Ok(message) => Some(message),
            Err(e) => {
                warn!(
                    drone_id = %record.drone_id,
                    topic = %self.topic,
                    error = %e,
                    "failed to publish drone status"
                );
                None
            }
        }
    }
}
