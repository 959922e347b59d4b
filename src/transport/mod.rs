pub mod memory;
pub mod mqtt;
pub mod router;
pub mod topic;
pub mod traits;

pub use memory::{MemoryTransport, PublishedMessage};
pub use mqtt::{MqttConfig, MqttTransport};
pub use router::{MessageHandler, Router};
pub use topic::topic_matches;
pub use traits::{DeliveryGuarantee, InboundMessage, Transport};
