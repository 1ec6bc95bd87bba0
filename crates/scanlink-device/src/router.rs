//! Inbound message routing.
//!
//! One sequential loop consumes every delivery on the inbound channels,
//! decodes it and hands it to the registry or the lifecycle manager.
//! Messages from one device are therefore handled in arrival order.
//!
//! ```text
//! broker ──> Subscription ──> InboundRouter ──┬──> DeviceRegistry
//!                                             └──> FingerprintManager ──> Notifier
//! ```
//!
//! Undecodable messages are logged under the `scanlink::dead_letter` target
//! and dropped; routing continues.

use crate::lifecycle::FingerprintManager;
use crate::registry::DeviceRegistry;
use scanlink_core::DeviceId;
use scanlink_protocol::{DeviceResponse, Inbound, InboundMessage, TopicScheme, decode};
use scanlink_storage::EmployeeDirectory;
use scanlink_transport::{Delivery, Transport};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Counters for routed and dropped deliveries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStats {
    pub routed: u64,
    pub dead_letters: u64,
}

/// Decodes deliveries and dispatches them in order.
pub struct InboundRouter<T, D> {
    scheme: TopicScheme,
    manager: Arc<FingerprintManager<T, D>>,
    registry: Arc<DeviceRegistry>,
    routed: AtomicU64,
    dead_letters: AtomicU64,
}

impl<T: Transport, D: EmployeeDirectory> InboundRouter<T, D> {
    pub fn new(manager: Arc<FingerprintManager<T, D>>, registry: Arc<DeviceRegistry>) -> Self {
        Self {
            scheme: manager.config().scheme.clone(),
            manager,
            registry,
            routed: AtomicU64::new(0),
            dead_letters: AtomicU64::new(0),
        }
    }

    /// Filters the router expects its subscription to carry.
    #[must_use]
    pub fn filters(&self) -> Vec<String> {
        self.scheme.inbound_filters()
    }

    #[must_use]
    pub fn stats(&self) -> RouterStats {
        RouterStats {
            routed: self.routed.load(Ordering::Relaxed),
            dead_letters: self.dead_letters.load(Ordering::Relaxed),
        }
    }

    /// Route deliveries until the channel closes.
    pub async fn run(&self, mut deliveries: mpsc::UnboundedReceiver<Delivery>) {
        info!(filters = ?self.filters(), "Inbound router started");
        while let Some(delivery) = deliveries.recv().await {
            self.route(&delivery).await;
        }
        info!(stats = ?self.stats(), "Inbound router stopped");
    }

    /// Decode and handle a single delivery.
    pub async fn route(&self, delivery: &Delivery) {
        let message = match decode(&self.scheme, &delivery.topic, &delivery.payload) {
            Ok(message) => message,
            Err(error) => {
                self.dead_letters.fetch_add(1, Ordering::Relaxed);
                warn!(
                    target: "scanlink::dead_letter",
                    topic = %delivery.topic,
                    payload = %String::from_utf8_lossy(&delivery.payload),
                    %error,
                    "Dropping undecodable message"
                );
                return;
            }
        };

        self.routed.fetch_add(1, Ordering::Relaxed);
        self.handle(message).await;
    }

    async fn handle(&self, message: InboundMessage) {
        let InboundMessage { device_id, inbound } = message;
        self.registry.touch(&device_id);

        match inbound {
            Inbound::Response(response) => self.handle_response(&device_id, response).await,
            Inbound::Status(status) => self.registry.record_status(&device_id, &status),
            Inbound::Heartbeat(heartbeat) => self.registry.record_heartbeat(&device_id, &heartbeat),
            Inbound::Info(info) => self.registry.record_info(&device_id, &info),
            Inbound::Fingerprint(event) => {
                self.manager.handle_fingerprint_event(&device_id, &event).await;
            }
        }
    }

    async fn handle_response(&self, device_id: &DeviceId, response: DeviceResponse) {
        match response {
            DeviceResponse::Pong { timestamp } => {
                debug!(device_id = %device_id, ?timestamp, "Pong");
            }
            DeviceResponse::EnrollStep { employee_id, step } => {
                self.manager.handle_enroll_step(device_id, employee_id, step);
            }
            DeviceResponse::Enroll {
                employee_id,
                fingerprint_id,
                outcome,
            } => {
                self.manager
                    .handle_enroll_result(device_id, employee_id, fingerprint_id, &outcome)
                    .await;
            }
            DeviceResponse::Delete {
                employee_id,
                fingerprint_id,
                outcome,
            } => {
                self.manager
                    .handle_delete_result(device_id, employee_id, fingerprint_id, &outcome)
                    .await;
            }
            DeviceResponse::FingerCount {
                outcome,
                enrolled,
                capacity,
            } => match outcome.failure_message() {
                None => {
                    info!(device_id = %device_id, ?enrolled, ?capacity, "Finger count");
                    self.registry.record_finger_count(device_id, enrolled, capacity);
                }
                Some(message) => {
                    warn!(device_id = %device_id, error = %message, "Finger count failed");
                }
            },
            DeviceResponse::Error { message } => {
                warn!(device_id = %device_id, error = ?message, "Device reported an error");
            }
            DeviceResponse::Acknowledged { action, status } => {
                info!(device_id = %device_id, %action, ?status, "Command acknowledged");
            }
        }
    }

    /// Run the router on its own task.
    pub fn spawn(self: Arc<Self>, deliveries: mpsc::UnboundedReceiver<Delivery>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(deliveries).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LifecycleConfig;
    use scanlink_core::{EmployeeId, FingerprintId};
    use scanlink_notify::NullNotifier;
    use scanlink_storage::{MemoryEmployeeDirectory, NewEmployee};
    use scanlink_transport::InMemoryBroker;
    use serde_json::json;

    type Router = InboundRouter<InMemoryBroker, Arc<MemoryEmployeeDirectory>>;

    fn router(directory: Arc<MemoryEmployeeDirectory>) -> (Router, Arc<DeviceRegistry>) {
        let manager = Arc::new(FingerprintManager::new(
            InMemoryBroker::new(),
            directory,
            Arc::new(NullNotifier),
            LifecycleConfig::default(),
        ));
        let registry = Arc::new(DeviceRegistry::new());
        (InboundRouter::new(manager, registry.clone()), registry)
    }

    fn delivery(topic: &str, body: serde_json::Value) -> Delivery {
        Delivery::new(topic, body.to_string())
    }

    #[tokio::test]
    async fn test_malformed_payload_is_dead_lettered() {
        let (router, _) = router(Arc::new(MemoryEmployeeDirectory::new()));

        router
            .route(&Delivery::new("device/esp01/response", "not json"))
            .await;
        router
            .route(&delivery("device/esp01/status", json!({"deviceId": "esp01"})))
            .await;

        assert_eq!(
            router.stats(),
            RouterStats {
                routed: 0,
                dead_letters: 2
            }
        );
    }

    #[tokio::test]
    async fn test_status_and_heartbeat_update_registry() {
        let (router, registry) = router(Arc::new(MemoryEmployeeDirectory::new()));

        router
            .route(&delivery(
                "device/esp01/status",
                json!({"deviceId": "esp01", "status": "online"}),
            ))
            .await;
        router
            .route(&delivery(
                "device/esp01/heartbeat",
                json!({"deviceId": "esp01", "uptime": 5000, "freeHeap": 80000}),
            ))
            .await;
        router
            .route(&delivery(
                "device/esp01/response",
                json!({"action": "get_finger_count", "status": "success", "enrolledCount": 4, "capacity": 127}),
            ))
            .await;

        let snapshot = registry.get(&DeviceId::new("esp01").unwrap()).unwrap();
        assert_eq!(snapshot.status.as_deref(), Some("online"));
        assert_eq!(snapshot.uptime_ms, Some(5000));
        assert_eq!(snapshot.enrolled_count, Some(4));
        assert_eq!(router.stats().routed, 3);
    }

    #[tokio::test]
    async fn test_delete_response_reaches_directory() {
        let directory = Arc::new(
            MemoryEmployeeDirectory::with_employees([NewEmployee::new(EmployeeId::new(7), "A")
                .fingerprint(FingerprintId::new(2).unwrap())])
            .unwrap(),
        );
        let (router, _) = router(directory.clone());

        router
            .route(&delivery(
                "device/esp01/response",
                json!({"action": "delete_finger", "status": "success", "employeeID": 7, "fingerID": 2}),
            ))
            .await;

        let employee = directory.find_by_id(EmployeeId::new(7)).await.unwrap().unwrap();
        assert_eq!(employee.fingerprint_id, None);
    }

    #[tokio::test]
    async fn test_spawned_router_stops_when_channel_closes() {
        let (router, registry) = router(Arc::new(MemoryEmployeeDirectory::new()));
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = Arc::new(router).spawn(rx);

        tx.send(delivery(
            "device/esp02/info",
            json!({"firmware": "2.0.1"}),
        ))
        .unwrap();
        drop(tx);
        handle.await.unwrap();

        let snapshot = registry.get(&DeviceId::new("esp02").unwrap()).unwrap();
        assert_eq!(snapshot.info["firmware"], "2.0.1");
    }
}
