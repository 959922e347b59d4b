//! Operator commands
//!
//! This module handles:
//! - Applying commands to drone records through the state machine
//! - Decoding command-channel messages for the dispatcher

mod dispatcher;
mod handler;

pub use dispatcher::CommandDispatcher;
pub use handler::CommandChannelHandler;
