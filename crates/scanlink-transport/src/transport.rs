//! Publish seam and delivery type.
//!
//! # Design Principles
//!
//! The transport is a thin layer:
//! - **No automatic retry**: callers decide retry strategy
//! - **Fire-and-forget publish**: success means the broker accepted the message,
//!   not that a device acted on it
//! - **Simple error handling**: clear errors, no recovery

use bytes::Bytes;
use std::future::Future;
use thiserror::Error;

/// A message received on a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Concrete topic the message was published on.
    pub topic: String,

    /// Raw payload bytes.
    pub payload: Bytes,
}

impl Delivery {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Errors that can occur while publishing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Broker connection is down
    #[error("Not connected to broker")]
    NotConnected,

    /// Publish did not complete in time
    #[error("Publish timeout after {0}ms")]
    PublishTimeout(u64),

    /// Topic is not publishable (empty or contains wildcards)
    #[error("Invalid topic: {0}")]
    InvalidTopic(String),

    /// Broker rejected the message
    #[error("Broker rejected publish: {0}")]
    Rejected(String),
}

impl From<TransportError> for scanlink_core::Error {
    fn from(error: TransportError) -> Self {
        scanlink_core::Error::Transport(error.to_string())
    }
}

/// Outbound half of a publish/subscribe connection.
///
/// Implementations must be cheap to share (`Arc<T>` or internally
/// reference-counted) since every component that sends commands holds one.
pub trait Transport: Send + Sync + 'static {
    /// Hand `payload` to the broker for delivery on `topic`.
    fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

impl<T: Transport> Transport for std::sync::Arc<T> {
    fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        (**self).publish(topic, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            TransportError::NotConnected.to_string(),
            "Not connected to broker"
        );
        assert_eq!(
            TransportError::PublishTimeout(3000).to_string(),
            "Publish timeout after 3000ms"
        );
    }

    #[test]
    fn test_into_core_error() {
        let error: scanlink_core::Error = TransportError::NotConnected.into();
        assert_eq!(
            error,
            scanlink_core::Error::Transport("Not connected to broker".to_string())
        );
    }

    #[test]
    fn test_delivery_new() {
        let delivery = Delivery::new("device/esp01/status", b"{}".to_vec());
        assert_eq!(delivery.topic, "device/esp01/status");
        assert_eq!(&delivery.payload[..], b"{}");
    }
}
