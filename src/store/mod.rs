//! Drone record storage
//!
//! This module handles:
//! - The `DroneStore` seam the dispatcher and ingestor depend on
//! - An in-memory store for development and tests
//! - A sled-backed document store for durable deployments

mod memory;
mod sled_store;
mod traits;

pub use memory::MemoryDroneStore;
pub use sled_store::SledDroneStore;
pub use traits::DroneStore;
