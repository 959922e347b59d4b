//! Transport trait abstraction for pluggable pub/sub backends

use async_trait::async_trait;
use bytes::Bytes;
use drone_sync_shared::DroneResult;
use tokio::sync::oneshot;

/// Delivery intent for a publication or subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryGuarantee {
    /// Fire and forget (QoS 0)
    AtMostOnce,
    /// Acknowledged delivery, duplicates possible (QoS 1)
    #[default]
    AtLeastOnce,
}

/// A message delivered by the transport, waiting to be handled
///
/// Dropping the message without calling [`InboundMessage::ack`] leaves it
/// unacknowledged, so a broker with at-least-once delivery sends it again.
#[derive(Debug)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
    ack: Option<oneshot::Sender<()>>,
}

impl InboundMessage {
    /// A message that needs no acknowledgment
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            ack: None,
        }
    }

    /// A message whose acknowledgment is reported on the returned receiver
    pub fn with_ack(
        topic: impl Into<String>,
        payload: impl Into<Bytes>,
    ) -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        let message = Self {
            topic: topic.into(),
            payload: payload.into(),
            ack: Some(tx),
        };
        (message, rx)
    }

    /// Confirm the message has been fully handled
    pub fn ack(mut self) {
        if let Some(tx) = self.ack.take() {
            let _ = tx.send(());
        }
    }
}

/// Publish/subscribe transport
///
/// Inbound messages are not delivered through callbacks: each transport pushes
/// them onto the queue it was built with, and the router hands them out.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish the broker session; fails with `TransportUnavailable`
    async fn connect(&self) -> DroneResult<()>;

    /// Close the broker session
    async fn disconnect(&self) -> DroneResult<()>;

    /// Start receiving messages whose topic matches `filter`
    async fn subscribe(&self, filter: &str, guarantee: DeliveryGuarantee) -> DroneResult<()>;

    /// Hand a payload to the broker
    async fn publish(
        &self,
        topic: &str,
        payload: Bytes,
        guarantee: DeliveryGuarantee,
    ) -> DroneResult<()>;

    /// Human-readable name for this transport
    fn name(&self) -> &'static str;
}
