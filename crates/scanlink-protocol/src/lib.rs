//! Wire vocabulary spoken between the service and fingerprint scanners.
//!
//! - [`topic`]: topic layout, subscription filters and wildcard matching
//! - [`command`]: outbound command actions and payload building
//! - [`inbound`]: closed set of inbound message schemas, decoded defensively

pub mod command;
pub mod error;
pub mod inbound;
pub mod topic;

pub use command::{Action, CommandBuilder, DeviceCommand};
pub use error::DecodeError;
pub use inbound::{
    CommandOutcome, DeviceInfo, DeviceResponse, DeviceStatus, EnrollStep, FingerprintEvent,
    Heartbeat, Inbound, InboundMessage, decode,
};
pub use topic::{Channel, TopicScheme, topic_matches};
