//! In-process loopback transport
//!
//! Publications are recorded and delivered straight back onto the inbound
//! queue for every matching subscription. Used for local runs without a
//! broker and by tests that need to observe what was published.

use super::topic::topic_matches;
use super::traits::{DeliveryGuarantee, InboundMessage, Transport};
use async_trait::async_trait;
use bytes::Bytes;
use drone_sync_shared::{DroneError, DroneResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;

/// A payload handed to the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Bytes,
    pub guarantee: DeliveryGuarantee,
}

pub struct MemoryTransport {
    inbound: mpsc::Sender<InboundMessage>,
    subscriptions: Mutex<Vec<String>>,
    published: Mutex<Vec<PublishedMessage>>,
    connected: AtomicBool,
    available: AtomicBool,
}

impl MemoryTransport {
    pub fn new(inbound: mpsc::Sender<InboundMessage>) -> Self {
        Self {
            inbound,
            subscriptions: Mutex::new(Vec::new()),
            published: Mutex::new(Vec::new()),
            connected: AtomicBool::new(false),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate the broker going away (or coming back)
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Everything published so far, oldest first
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    /// Payloads published on one topic
    pub fn published_on(&self, topic: &str) -> Vec<Bytes> {
        self.published()
            .into_iter()
            .filter(|m| m.topic == topic)
            .map(|m| m.payload)
            .collect()
    }

    fn ensure_connected(&self) -> DroneResult<()> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(DroneError::TransportUnavailable("broker unreachable".into()));
        }
        if !self.connected.load(Ordering::SeqCst) {
            return Err(DroneError::TransportUnavailable("not connected".into()));
        }
        Ok(())
    }

    fn matches_subscription(&self, topic: &str) -> bool {
        self.subscriptions
            .lock()
            .map(|subs| subs.iter().any(|filter| topic_matches(filter, topic)))
            .unwrap_or(false)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(&self) -> DroneResult<()> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(DroneError::TransportUnavailable("broker unreachable".into()));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> DroneResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn subscribe(&self, filter: &str, _guarantee: DeliveryGuarantee) -> DroneResult<()> {
        self.ensure_connected()?;
        if let Ok(mut subs) = self.subscriptions.lock() {
            if !subs.iter().any(|s| s == filter) {
                subs.push(filter.to_string());
            }
        }
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Bytes,
        guarantee: DeliveryGuarantee,
    ) -> DroneResult<()> {
        self.ensure_connected()?;

        if let Ok(mut published) = self.published.lock() {
            published.push(PublishedMessage {
                topic: topic.to_string(),
                payload: payload.clone(),
                guarantee,
            });
        }

        if self.matches_subscription(topic) {
            self.inbound
                .send(InboundMessage::new(topic, payload))
                .await
                .map_err(|_| DroneError::TransportUnavailable("inbound queue closed".into()))?;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
