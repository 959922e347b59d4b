//! Process configuration from command-line flags and environment variables

use crate::connection::BackoffPolicy;
use crate::transport::MqttConfig;
use clap::{Parser, ValueEnum};
use drone_sync_shared::topics;
use std::path::PathBuf;
use std::time::Duration;

/// Which broker connection to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TransportKind {
    Mqtt,
    /// In-process loopback, no broker needed
    Memory,
}

/// Where drone records are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    Memory,
    Sled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "drone-sync")]
#[command(about = "Drone command and status synchronization engine")]
#[command(version)]
pub struct Config {
    #[arg(long, value_enum, env = "DRONE_SYNC_TRANSPORT", default_value = "mqtt")]
    pub transport: TransportKind,

    /// MQTT broker host
    #[arg(long, env = "MQTT_HOST", default_value = "localhost")]
    pub mqtt_host: String,

    #[arg(long, env = "MQTT_PORT", default_value_t = 1883)]
    pub mqtt_port: u16,

    #[arg(long, env = "MQTT_CLIENT_ID", default_value = "drone-sync")]
    pub mqtt_client_id: String,

    /// MQTT keep-alive interval in seconds
    #[arg(long, env = "MQTT_KEEP_ALIVE_SECS", default_value_t = 30)]
    pub mqtt_keep_alive_secs: u64,

    #[arg(long, env = "DRONE_SYNC_COMMAND_TOPIC", default_value = topics::COMMAND_TOPIC)]
    pub command_topic: String,

    #[arg(long, env = "DRONE_SYNC_STATUS_TOPIC", default_value = topics::STATUS_TOPIC)]
    pub status_topic: String,

    #[arg(long, value_enum, env = "DRONE_SYNC_STORE", default_value = "sled")]
    pub store: StoreKind,

    /// Database directory for the sled store
    #[arg(long, env = "DRONE_SYNC_DB_PATH", default_value = "./data/drones")]
    pub db_path: PathBuf,

    /// Broker connection attempts at startup (0 = retry forever)
    #[arg(long, env = "DRONE_SYNC_CONNECT_ATTEMPTS", default_value_t = 10)]
    pub connect_attempts: u32,

    /// First reconnect delay in milliseconds, doubled per attempt
    #[arg(long, env = "DRONE_SYNC_RECONNECT_INITIAL_MS", default_value_t = 1000)]
    pub reconnect_initial_ms: u64,

    #[arg(long, env = "DRONE_SYNC_RECONNECT_MAX_MS", default_value_t = 30_000)]
    pub reconnect_max_ms: u64,

    /// Depth of the inbound message queue
    #[arg(long, env = "DRONE_SYNC_INBOUND_CAPACITY", default_value_t = 1024)]
    pub inbound_capacity: usize,

    #[arg(long, value_enum, env = "DRONE_SYNC_LOG_FORMAT", default_value = "text")]
    pub log_format: LogFormat,

    /// Register a drone at startup if it is not already known, as ID or ID@DOCK
    #[arg(long = "register", value_name = "ID[@DOCK]")]
    pub register: Vec<String>,
}

impl Config {
    pub fn mqtt_config(&self) -> MqttConfig {
        MqttConfig {
            host: self.mqtt_host.clone(),
            port: self.mqtt_port,
            client_id: self.mqtt_client_id.clone(),
            keep_alive: Duration::from_secs(self.mqtt_keep_alive_secs),
            ..Default::default()
        }
    }

    /// Drones to register at startup as `(drone_id, dock_id)`
    pub fn registrations(&self) -> Vec<(String, Option<String>)> {
        self.register
            .iter()
            .map(|entry| match entry.split_once('@') {
                Some((id, dock)) => (id.to_string(), Some(dock.to_string())),
                None => (entry.clone(), None),
            })
            .collect()
    }

    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            initial_delay: Duration::from_millis(self.reconnect_initial_ms),
            max_delay: Duration::from_millis(self.reconnect_max_ms.max(self.reconnect_initial_ms)),
            max_attempts: self.connect_attempts,
        }
    }
}
