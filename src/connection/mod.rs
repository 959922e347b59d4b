//! Broker connection management
//!
//! This module handles:
//! - Connecting the transport at startup
//! - Exponential backoff between failed attempts
//! - Giving up after a bounded number of attempts

mod backoff;

pub use backoff::{connect_with_backoff, BackoffPolicy};
