//! Publish/subscribe transport for scanlink.
//!
//! The rest of the workspace treats the broker connection as an opaque
//! primitive: something that can [`publish`](Transport::publish) a payload on a
//! topic, plus a stream of [`Delivery`] values for the topic filters it
//! subscribed to.
//!
//! # Components
//!
//! - **Transport**: publish-only seam the command dispatcher depends on
//! - **InMemoryBroker**: in-process broker with MQTT-style filter subscriptions,
//!   used by tests, the simulated scanner and the demo binary
//!
//! # Example
//!
//! ```
//! use scanlink_transport::{InMemoryBroker, Transport};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let broker = InMemoryBroker::new();
//! let mut responses = broker.subscribe(["device/+/response"]);
//!
//! broker.publish("device/esp01/response", br#"{"status":"pong"}"#.to_vec()).await?;
//!
//! let delivery = responses.recv().await.unwrap();
//! assert_eq!(delivery.topic, "device/esp01/response");
//! # Ok(())
//! # }
//! ```

mod broker;
mod transport;

pub use broker::{BrokerStats, InMemoryBroker, Subscription};
pub use transport::{Delivery, Transport, TransportError};
