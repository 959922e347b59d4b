//! Command-channel handler

use super::CommandDispatcher;
use crate::transport::{InboundMessage, MessageHandler};
use async_trait::async_trait;
use drone_sync_shared::{codec, DroneResult};
use std::sync::Arc;
use tracing::warn;

/// Decodes command messages and hands them to the dispatcher
///
/// Undecodable messages and rejected commands are logged and acknowledged;
/// only transient failures are returned so the broker redelivers.
pub struct CommandChannelHandler {
    dispatcher: Arc<CommandDispatcher>,
}

impl CommandChannelHandler {
    pub fn new(dispatcher: Arc<CommandDispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl MessageHandler for CommandChannelHandler {
    async fn handle(&self, message: &InboundMessage) -> DroneResult<()> {
        let command = match codec::decode_command(&message.payload) {
            Ok(command) => command,
            Err(e) => {
                warn!(topic = %message.topic, error = %e, "discarding malformed command");
                return Ok(());
            }
        };

        match self.dispatcher.dispatch(&command).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_retryable() => Err(e),
            Err(e) => {
                warn!(
                    drone_id = %command.drone_id,
                    command = %command.command,
                    error = %e,
                    "command rejected"
                );
                Ok(())
            }
        }
    }

    fn name(&self) -> &'static str {
        "command-dispatcher"
    }
}
