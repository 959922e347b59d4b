//! Status reporting
//!
//! This module handles:
//! - Publishing drone snapshots on the status channel
//! - Reconciling inbound status reports into the record store

mod ingestor;
mod publisher;

pub use ingestor::{IngestOutcome, StatusIngestor};
pub use publisher::StatusPublisher;
