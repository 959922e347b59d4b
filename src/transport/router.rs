//! Topic router: the handler-registration table
//!
//! The transport pushes every inbound message onto one queue. The router owns
//! the table of `(topic filter, handler)` routes and gives each route its own
//! worker task, so a subscription sees its messages one at a time while
//! different subscriptions run concurrently.

use super::topic::topic_matches;
use super::traits::{DeliveryGuarantee, InboundMessage, Transport};
use async_trait::async_trait;
use drone_sync_shared::DroneResult;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Per-route queue depth
const WORKER_QUEUE_CAPACITY: usize = 256;

/// Business logic attached to a topic
///
/// Returning `Ok` acknowledges the message. A retryable error leaves it
/// unacknowledged for redelivery; any other error is logged and acknowledged.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: &InboundMessage) -> DroneResult<()>;

    /// Name used in logs
    fn name(&self) -> &'static str;
}

struct Route {
    filter: String,
    handler: Arc<dyn MessageHandler>,
}

/// Routes inbound messages to handlers by topic filter
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe on the transport and register the handler for `filter`
    pub async fn subscribe(
        &mut self,
        transport: &dyn Transport,
        filter: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> DroneResult<()> {
        transport
            .subscribe(filter, DeliveryGuarantee::AtLeastOnce)
            .await?;
        self.route(filter, handler);
        Ok(())
    }

    /// Register a handler without touching the transport
    pub fn route(&mut self, filter: &str, handler: Arc<dyn MessageHandler>) {
        info!(topic = %filter, handler = handler.name(), "registered message handler");
        self.routes.push(Route {
            filter: filter.to_string(),
            handler,
        });
    }

    /// Number of registered routes
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Dispatch inbound messages until shutdown or until the queue closes
    ///
    /// On shutdown no further messages are taken from the inbound queue; each
    /// worker finishes what it already holds before this returns.
    pub async fn run(self, mut inbound: mpsc::Receiver<InboundMessage>, shutdown: CancellationToken) {
        let mut queues = Vec::with_capacity(self.routes.len());
        let mut workers: Vec<JoinHandle<()>> = Vec::with_capacity(self.routes.len());

        for route in self.routes {
            let (tx, rx) = mpsc::channel(WORKER_QUEUE_CAPACITY);
            workers.push(tokio::spawn(run_worker(route.filter.clone(), route.handler, rx)));
            queues.push((route.filter, tx));
        }

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("router shutting down");
                    break;
                }
                message = inbound.recv() => {
                    let Some(message) = message else {
                        info!("inbound queue closed");
                        break;
                    };

                    match queues.iter().find(|(filter, _)| topic_matches(filter, &message.topic)) {
                        Some((filter, queue)) => {
                            if queue.send(message).await.is_err() {
                                error!(topic = %filter, "handler worker stopped, message dropped");
                            }
                        }
                        None => {
                            debug!(topic = %message.topic, "no handler for topic, discarding");
                            message.ack();
                        }
                    }
                }
            }
        }

        drop(queues);
        for result in futures::future::join_all(workers).await {
            if let Err(e) = result {
                error!(error = %e, "handler worker panicked");
            }
        }
        info!("router stopped");
    }
}

async fn run_worker(
    filter: String,
    handler: Arc<dyn MessageHandler>,
    mut queue: mpsc::Receiver<InboundMessage>,
) {
    while let Some(message) = queue.recv().await {
        match handler.handle(&message).await {
            Ok(()) => message.ack(),
            Err(e) if e.is_retryable() => {
                error!(
                    topic = %filter,
                    handler = handler.name(),
                    error = %e,
                    "handler failed, leaving message for redelivery"
                );
            }
            Err(e) => {
                warn!(
                    topic = %filter,
                    handler = handler.name(),
                    error = %e,
                    "handler rejected message"
                );
                message.ack();
            }
        }
    }
    debug!(topic = %filter, "handler worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;
    use bytes::Bytes;
    use drone_sync_shared::DroneError;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MessageHandler for Recorder {
        async fn handle(&self, message: &InboundMessage) -> DroneResult<()> {
            let body = String::from_utf8_lossy(&message.payload).to_string();
            self.seen.lock().unwrap().push(format!("{}:{}", message.topic, body));
            match body.as_str() {
                "storage-down" => Err(DroneError::Storage(anyhow::anyhow!("disk offline"))),
                "bad" => Err(DroneError::MalformedMessage("bad".into())),
                _ => Ok(()),
            }
        }

        fn name(&self) -> &'static str {
            "recorder"
        }
    }

    #[tokio::test]
    async fn test_routes_by_topic_and_acks() {
        let commands = Arc::new(Recorder::default());
        let statuses = Arc::new(Recorder::default());

        let mut router = Router::new();
        router.route("drone/command", commands.clone());
        router.route("drone/status", statuses.clone());
        assert_eq!(router.len(), 2);

        let (tx, rx) = mpsc::channel(16);
        let shutdown = CancellationToken::new();
        let running = tokio::spawn(router.run(rx, shutdown.clone()));

        let (cmd, cmd_acked) = InboundMessage::with_ack("drone/command", Bytes::from_static(b"takeoff"));
        let (status, status_acked) = InboundMessage::with_ack("drone/status", Bytes::from_static(b"flying"));
        let (stray, stray_acked) = InboundMessage::with_ack("fleet/other", Bytes::from_static(b"x"));
        tx.send(cmd).await.unwrap();
        tx.send(status).await.unwrap();
        tx.send(stray).await.unwrap();

        assert!(cmd_acked.await.is_ok());
        assert!(status_acked.await.is_ok());
        assert!(stray_acked.await.is_ok());

        shutdown.cancel();
        running.await.unwrap();

        assert_eq!(commands.seen(), vec!["drone/command:takeoff"]);
        assert_eq!(statuses.seen(), vec!["drone/status:flying"]);
    }

    #[tokio::test]
    async fn test_retryable_failure_is_not_acked() {
        let handler = Arc::new(Recorder::default());
        let mut router = Router::new();
        router.route("drone/status", handler.clone());

        let (tx, rx) = mpsc::channel(16);
        let running = tokio::spawn(router.run(rx, CancellationToken::new()));

        let (transient, transient_acked) =
            InboundMessage::with_ack("drone/status", Bytes::from_static(b"storage-down"));
        let (permanent, permanent_acked) =
            InboundMessage::with_ack("drone/status", Bytes::from_static(b"bad"));
        tx.send(transient).await.unwrap();
        tx.send(permanent).await.unwrap();

        assert!(transient_acked.await.is_err());
        assert!(permanent_acked.await.is_ok());

        // Closing the queue stops the router after the worker drains
        drop(tx);
        running.await.unwrap();
        assert_eq!(handler.seen().len(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_drains_queued_messages() {
        let handler = Arc::new(Recorder::default());
        let mut router = Router::new();
        router.route("drone/#", handler.clone());

        let (tx, rx) = mpsc::channel(16);
        let shutdown = CancellationToken::new();
        let running = tokio::spawn(router.run(rx, shutdown.clone()));

        let mut acks = Vec::new();
        for i in 0..5 {
            let (message, acked) =
                InboundMessage::with_ack("drone/status", Bytes::from(format!("m{}", i)));
            tx.send(message).await.unwrap();
            acks.push(acked);
        }
        for acked in acks {
            assert!(acked.await.is_ok());
        }

        shutdown.cancel();
        running.await.unwrap();
        assert_eq!(handler.seen().len(), 5);
    }

    #[tokio::test]
    async fn test_subscribe_registers_on_transport() {
        let (tx, _rx) = mpsc::channel(16);
        let transport = MemoryTransport::new(tx);
        let mut router = Router::new();

        let handler = Arc::new(Recorder::default());
        let result = router.subscribe(&transport, "drone/status", handler.clone()).await;
        assert!(matches!(result, Err(DroneError::TransportUnavailable(_))));
        assert_eq!(router.len(), 0);

        transport.connect().await.unwrap();
        router.subscribe(&transport, "drone/status", handler).await.unwrap();
        assert_eq!(router.len(), 1);
    }
}
