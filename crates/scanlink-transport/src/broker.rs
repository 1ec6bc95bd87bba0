//! In-process publish/subscribe broker.

use crate::transport::{Delivery, Transport, TransportError};
use bytes::Bytes;
use scanlink_core::constants::{WILDCARD_MULTI, WILDCARD_SINGLE};
use scanlink_protocol::topic_matches;
use std::future::{Future, ready};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Receiving end of a broker subscription.
///
/// Dropping the subscription unsubscribes it; the broker prunes closed
/// subscribers on the next publish.
#[derive(Debug)]
pub struct Subscription {
    filters: Vec<String>,
    rx: mpsc::UnboundedReceiver<Delivery>,
}

impl Subscription {
    /// Next delivery, or `None` once the broker is gone.
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.rx.recv().await
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<Delivery> {
        self.rx.try_recv().ok()
    }

    #[must_use]
    pub fn filters(&self) -> &[String] {
        &self.filters
    }

    /// Unwrap into the raw channel receiver (what the inbound router consumes).
    #[must_use]
    pub fn into_receiver(self) -> mpsc::UnboundedReceiver<Delivery> {
        self.rx
    }
}

/// Broker counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BrokerStats {
    pub published: u64,
    pub delivered: u64,
    pub rejected: u64,
}

#[derive(Debug)]
struct Subscriber {
    filters: Vec<String>,
    tx: mpsc::UnboundedSender<Delivery>,
}

impl Subscriber {
    fn matches(&self, topic: &str) -> bool {
        self.filters.iter().any(|f| topic_matches(f, topic))
    }
}

#[derive(Debug, Default)]
struct Inner {
    subscribers: Mutex<Vec<Subscriber>>,
    offline: AtomicBool,
    published: AtomicU64,
    delivered: AtomicU64,
    rejected: AtomicU64,
}

/// Broker living inside the process.
///
/// Cloning is cheap; clones share subscribers and state. Delivery is
/// at-most-once and in publish order per subscriber.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBroker {
    inner: Arc<Inner>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to one or more topic filters (`+` and `#` wildcards allowed).
    pub fn subscribe<I, S>(&self, filters: I) -> Subscription
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let filters: Vec<String> = filters.into_iter().map(Into::into).collect();
        let (tx, rx) = mpsc::unbounded_channel();

        debug!(filters = ?filters, "Subscribing");

        self.subscribers().push(Subscriber {
            filters: filters.clone(),
            tx,
        });

        Subscription { filters, rx }
    }

    /// Simulate losing (or regaining) the broker connection.
    ///
    /// While offline every publish fails with [`TransportError::NotConnected`].
    pub fn set_offline(&self, offline: bool) {
        if offline {
            warn!("Broker connection marked offline");
        } else {
            debug!("Broker connection restored");
        }
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        !self.inner.offline.load(Ordering::SeqCst)
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers();
        subscribers.retain(|s| !s.tx.is_closed());
        subscribers.len()
    }

    #[must_use]
    pub fn stats(&self) -> BrokerStats {
        BrokerStats {
            published: self.inner.published.load(Ordering::Relaxed),
            delivered: self.inner.delivered.load(Ordering::Relaxed),
            rejected: self.inner.rejected.load(Ordering::Relaxed),
        }
    }

    /// Route a message to every matching subscriber.
    ///
    /// # Errors
    /// `NotConnected` while offline, `InvalidTopic` for an empty topic or one
    /// containing wildcards.
    pub fn publish_now(&self, topic: &str, payload: impl Into<Bytes>) -> Result<usize, TransportError> {
        if !self.is_connected() {
            self.inner.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(TransportError::NotConnected);
        }

        if !is_publishable(topic) {
            self.inner.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(TransportError::InvalidTopic(topic.to_string()));
        }

        let payload = payload.into();
        let mut delivered = 0;
        let mut subscribers = self.subscribers();

        subscribers.retain(|subscriber| {
            if !subscriber.matches(topic) {
                return !subscriber.tx.is_closed();
            }
            match subscriber.tx.send(Delivery::new(topic, payload.clone())) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(_) => false,
            }
        });
        drop(subscribers);

        self.inner.published.fetch_add(1, Ordering::Relaxed);
        self.inner
            .delivered
            .fetch_add(delivered as u64, Ordering::Relaxed);

        trace!(topic, bytes = payload.len(), delivered, "Published");
        Ok(delivered)
    }

    fn subscribers(&self) -> MutexGuard<'_, Vec<Subscriber>> {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Transport for InMemoryBroker {
    fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        ready(self.publish_now(topic, payload).map(|_| ()))
    }
}

fn is_publishable(topic: &str) -> bool {
    !topic.is_empty()
        && !topic
            .split('/')
            .any(|level| level == WILDCARD_SINGLE || level == WILDCARD_MULTI)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_routes_by_filter() {
        let broker = InMemoryBroker::new();
        let mut responses = broker.subscribe(["device/+/response"]);
        let mut status = broker.subscribe(["device/+/status"]);

        let delivered = broker
            .publish_now("device/esp01/response", b"{}".to_vec())
            .unwrap();

        assert_eq!(delivered, 1);
        assert_eq!(responses.try_recv().unwrap().topic, "device/esp01/response");
        assert!(status.try_recv().is_none());
    }

    #[test]
    fn test_publish_without_subscribers() {
        let broker = InMemoryBroker::new();
        assert_eq!(broker.publish_now("device/esp01/command", Vec::new()).unwrap(), 0);
        assert_eq!(broker.stats().published, 1);
    }

    #[test]
    fn test_offline_rejects() {
        let broker = InMemoryBroker::new();
        broker.set_offline(true);

        assert_eq!(
            broker.publish_now("device/esp01/command", Vec::new()),
            Err(TransportError::NotConnected)
        );
        assert_eq!(broker.stats().rejected, 1);

        broker.set_offline(false);
        assert!(broker.publish_now("device/esp01/command", Vec::new()).is_ok());
    }

    #[test]
    fn test_wildcard_topic_rejected() {
        let broker = InMemoryBroker::new();
        assert!(matches!(
            broker.publish_now("device/+/command", Vec::new()),
            Err(TransportError::InvalidTopic(_))
        ));
        assert!(matches!(
            broker.publish_now("", Vec::new()),
            Err(TransportError::InvalidTopic(_))
        ));
    }

    #[test]
    fn test_dropped_subscription_is_pruned() {
        let broker = InMemoryBroker::new();
        let sub = broker.subscribe(["#"]);
        assert_eq!(broker.subscriber_count(), 1);

        drop(sub);
        broker.publish_now("device/esp01/info", Vec::new()).unwrap();
        assert_eq!(broker.subscriber_count(), 0);
    }
}
