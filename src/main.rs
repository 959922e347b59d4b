mod command;
mod config;
mod connection;
mod locks;
mod status;
mod store;
mod transport;

use anyhow::Context;
use clap::Parser;
use command::{CommandChannelHandler, CommandDispatcher};
use config::{Config, LogFormat, StoreKind, TransportKind};
use connection::connect_with_backoff;
use drone_sync_shared::DroneError;
use locks::DroneLocks;
use status::{StatusIngestor, StatusPublisher};
use std::sync::Arc;
use store::{DroneStore, MemoryDroneStore, SledDroneStore};
use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use transport::{MemoryTransport, MqttTransport, Router, Transport};

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    init_tracing(config.log_format);

    info!(
        transport = ?config.transport,
        store = ?config.store,
        command_topic = %config.command_topic,
        status_topic = %config.status_topic,
        "drone-sync starting"
    );

    let store: Arc<dyn DroneStore> = match config.store {
        StoreKind::Memory => Arc::new(MemoryDroneStore::new()),
        StoreKind::Sled => Arc::new(
            SledDroneStore::open(&config.db_path)
                .with_context(|| format!("failed to open store at {}", config.db_path.display()))?,
        ),
    };
    info!(backend = store.name(), "record store ready");

    let (inbound_tx, inbound_rx) = mpsc::channel(config.inbound_capacity);
    let transport: Arc<dyn Transport> = match config.transport {
        TransportKind::Mqtt => Arc::new(MqttTransport::new(config.mqtt_config(), inbound_tx)),
        TransportKind::Memory => Arc::new(MemoryTransport::new(inbound_tx)),
    };

    let shutdown = CancellationToken::new();
    let terminate =
        signal(SignalKind::terminate()).context("failed to listen for terminate signal")?;
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        let received = wait_for_shutdown(terminate).await;
        info!(signal = received, "shutdown signal received");
        trigger.cancel();
    });

    if let Err(e) = connect_with_backoff(transport.as_ref(), &config.backoff_policy(), &shutdown).await {
        if shutdown.is_cancelled() {
            info!("shutdown requested before the broker was reachable");
            store.flush().await.context("failed to flush store")?;
            return Ok(());
        }
        return Err(e).context("broker unreachable");
    }

    let locks = Arc::new(DroneLocks::new());
    let publisher = Arc::new(StatusPublisher::new(transport.clone(), config.status_topic.clone()));
    let dispatcher = Arc::new(CommandDispatcher::new(store.clone(), publisher, locks.clone()));
    let ingestor = Arc::new(StatusIngestor::new(store.clone(), locks));

    for (drone_id, dock_id) in config.registrations() {
        match dispatcher.register(&drone_id, dock_id.as_deref()).await {
            Ok(_) => {}
            Err(DroneError::AlreadyExists(_)) => info!(drone_id = %drone_id, "drone already registered"),
            Err(e) if e.is_retryable() => {
                return Err(e).with_context(|| format!("failed to register {}", drone_id));
            }
            Err(e) => warn!(drone_id = %drone_id, error = %e, "skipping registration"),
        }
    }

    let mut router = Router::new();
    router
        .subscribe(
            transport.as_ref(),
            &config.command_topic,
            Arc::new(CommandChannelHandler::new(dispatcher)),
        )
        .await
        .context("failed to subscribe to command channel")?;
    router
        .subscribe(transport.as_ref(), &config.status_topic, ingestor)
        .await
        .context("failed to subscribe to status channel")?;

    router.run(inbound_rx, shutdown).await;

    if let Err(e) = transport.disconnect().await {
        warn!(error = %e, "transport did not disconnect cleanly");
    }
    store.flush().await.context("failed to flush store")?;

    info!("drone-sync stopped");
    Ok(())
}

/// Resolve on Ctrl-C or SIGTERM, naming the signal
async fn wait_for_shutdown(mut terminate: Signal) -> &'static str {
    tokio::select! {
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => "interrupt",
            Err(e) => {
                error!(error = %e, "failed to listen for interrupt signal");
                terminate.recv().await;
                "terminate"
            }
        },
        _ = terminate.recv() => "terminate",
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(fmt::layer()).init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_terminate_signal_triggers_shutdown() {
        let terminate = signal(SignalKind::terminate()).unwrap();
        let waiting = tokio::spawn(wait_for_shutdown(terminate));

        let status = std::process::Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        let received = tokio::time::timeout(Duration::from_secs(5), waiting)
            .await
            .expect("shutdown not triggered")
            .unwrap();
        assert_eq!(received, "terminate");
    }
}
