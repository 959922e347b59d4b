//! MQTT transport over rumqttc
//!
//! Messages are acknowledged manually: the PUBACK for an inbound publish is
//! only sent once the router has handled it, so anything in flight when the
//! process dies is redelivered by the broker on the next session.
//!
//! The event loop never waits on anything but the broker. Inbound publishes
//! are parked in a bounded backlog while the router queue is full, and
//! outbound requests fail fast when the client request channel is full.

use super::traits::{DeliveryGuarantee, InboundMessage, Transport};
use async_trait::async_trait;
use bytes::Bytes;
use drone_sync_shared::{DroneError, DroneResult};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Broker connection settings
#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive: Duration,
    /// How long to wait for the broker's CONNACK
    pub connect_timeout: Duration,
    /// Pause between event loop errors while rumqttc reconnects
    pub retry_delay: Duration,
    /// Capacity of the client request channel and of the inbound backlog
    pub channel_capacity: usize,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1883,
            client_id: "drone-sync".into(),
            keep_alive: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            retry_delay: Duration::from_secs(1),
            channel_capacity: 100,
        }
    }
}

struct Session {
    client: AsyncClient,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

pub struct MqttTransport {
    config: MqttConfig,
    inbound: mpsc::Sender<InboundMessage>,
    session: Mutex<Option<Session>>,
    subscriptions: Arc<RwLock<Vec<(String, QoS)>>>,
}

impl MqttTransport {
    pub fn new(config: MqttConfig, inbound: mpsc::Sender<InboundMessage>) -> Self {
        Self {
            config,
            inbound,
            session: Mutex::new(None),
            subscriptions: Arc::new(RwLock::new(Vec::new())),
        }
    }

    fn options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(&self.config.client_id, &self.config.host, self.config.port);
        options.set_keep_alive(self.config.keep_alive);
        // Keep the session so unacknowledged QoS 1 messages survive a restart
        options.set_clean_session(false);
        options.set_manual_acks(true);
        options
    }

    async fn client(&self) -> DroneResult<AsyncClient> {
        self.session
            .lock()
            .await
            .as_ref()
            .map(|s| s.client.clone())
            .ok_or_else(|| DroneError::TransportUnavailable("not connected".into()))
    }
}

fn qos(guarantee: DeliveryGuarantee) -> QoS {
    match guarantee {
        DeliveryGuarantee::AtMostOnce => QoS::AtMostOnce,
        DeliveryGuarantee::AtLeastOnce => QoS::AtLeastOnce,
    }
}

/// Poll until the broker accepts the connection
async fn await_connack(eventloop: &mut EventLoop) -> Result<(), rumqttc::ConnectionError> {
    loop {
        if let Event::Incoming(Packet::ConnAck(_)) = eventloop.poll().await? {
            return Ok(());
        }
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn connect(&self) -> DroneResult<()> {
        let mut session = self.session.lock().await;
        if session.is_some() {
            return Ok(());
        }

        let (client, mut eventloop) = AsyncClient::new(self.options(), self.config.channel_capacity);

        match timeout(self.config.connect_timeout, await_connack(&mut eventloop)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(DroneError::TransportUnavailable(format!(
                    "{}:{}: {}",
                    self.config.host, self.config.port, e
                )));
            }
            Err(_) => {
                return Err(DroneError::TransportUnavailable(format!(
                    "{}:{}: no CONNACK within {:?}",
                    self.config.host, self.config.port, self.config.connect_timeout
                )));
            }
        }

        info!(
            host = %self.config.host,
            port = self.config.port,
            client_id = %self.config.client_id,
            "connected to MQTT broker"
        );

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_event_loop(
            eventloop,
            client.clone(),
            self.inbound.clone(),
            Arc::clone(&self.subscriptions),
            cancel.clone(),
            self.config.retry_delay,
            self.config.channel_capacity.max(1),
        ));

        *session = Some(Session {
            client,
            cancel,
            task,
        });
        Ok(())
    }

    async fn disconnect(&self) -> DroneResult<()> {
        let Some(session) = self.session.lock().await.take() else {
            return Ok(());
        };

        if let Err(e) = session.client.try_disconnect() {
            debug!(error = %e, "MQTT disconnect request failed");
        }
        session.cancel.cancel();
        if timeout(Duration::from_secs(5), session.task).await.is_err() {
            warn!("MQTT event loop did not stop in time");
        }

        info!("disconnected from MQTT broker");
        Ok(())
    }

    async fn subscribe(&self, filter: &str, guarantee: DeliveryGuarantee) -> DroneResult<()> {
        let client = self.client().await?;
        let qos = qos(guarantee);

        client
            .subscribe(filter, qos)
            .await
            .map_err(|e| DroneError::TransportUnavailable(format!("subscribe {}: {}", filter, e)))?;

        self.subscriptions.write().await.push((filter.to_string(), qos));
        info!(topic = %filter, "subscribed to MQTT topic");
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Bytes,
        guarantee: DeliveryGuarantee,
    ) -> DroneResult<()> {
        let client = self.client().await?;
        client
            .try_publish(topic, qos(guarantee), false, payload.to_vec())
            .map_err(|e| DroneError::TransportUnavailable(format!("publish {}: {}", topic, e)))
    }

    fn name(&self) -> &'static str {
        "mqtt"
    }
}

/// Drive the rumqttc event loop, forwarding publishes to the inbound queue
///
/// Polling pauses only while the backlog is full; keep-alives and acks keep
/// flowing while the router catches up.
async fn run_event_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    inbound: mpsc::Sender<InboundMessage>,
    subscriptions: Arc<RwLock<Vec<(String, QoS)>>>,
    cancel: CancellationToken,
    retry_delay: Duration,
    backlog_capacity: usize,
) {
    let mut backlog: VecDeque<InboundMessage> = VecDeque::with_capacity(backlog_capacity);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            permit = inbound.reserve(), if !backlog.is_empty() => match permit {
                Ok(permit) => {
                    if let Some(message) = backlog.pop_front() {
                        permit.send(message);
                    }
                }
                Err(_) => {
                    debug!("inbound queue closed, stopping MQTT event loop");
                    break;
                }
            },
            event = eventloop.poll(), if backlog.len() < backlog_capacity => match event {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    debug!(
                        topic = %publish.topic,
                        payload_size = publish.payload.len(),
                        "received MQTT message"
                    );

                    let (message, acked) =
                        InboundMessage::with_ack(publish.topic.clone(), publish.payload.clone());
                    // Keep arrival order once anything is parked
                    if !backlog.is_empty() {
                        backlog.push_back(message);
                    } else {
                        match inbound.try_send(message) {
                            Ok(()) => {}
                            Err(mpsc::error::TrySendError::Full(message)) => backlog.push_back(message),
                            Err(mpsc::error::TrySendError::Closed(_)) => {
                                debug!("inbound queue closed, stopping MQTT event loop");
                                break;
                            }
                        }
                    }

                    let client = client.clone();
                    tokio::spawn(async move {
                        if acked.await.is_ok() {
                            if let Err(e) = client.ack(&publish).await {
                                warn!(error = %e, "failed to acknowledge MQTT message");
                            }
                        }
                    });
                }
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("reconnected to MQTT broker");
                    for (filter, qos) in subscriptions.read().await.iter() {
                        if let Err(e) = client.try_subscribe(filter.as_str(), *qos) {
                            warn!(topic = %filter, error = %e, "failed to resubscribe");
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "MQTT connection error, retrying");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(retry_delay) => {}
                    }
                }
            }
        }
    }

    debug!(pending = backlog.len(), "MQTT event loop stopped");
}
