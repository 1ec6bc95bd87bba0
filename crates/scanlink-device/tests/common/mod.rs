//! Shared wiring for device integration tests.
//!
//! A [`Harness`] assembles the full in-process stack: broker, memory
//! directory, notification hub, lifecycle manager, inbound router and one
//! simulated scanner (`esp01`).

#![allow(dead_code)]

use scanlink_core::{DeviceId, EmployeeId, FingerprintId};
use scanlink_device::{
    DeviceRegistry, DeviceService, FingerprintManager, InboundRouter, LifecycleConfig,
    ScannerConfig, SimulatedScanner,
};
use scanlink_notify::{ClientConnection, NotificationHub, OutboundMessage};
use scanlink_storage::{EmployeeDirectory, MemoryEmployeeDirectory, NewEmployee};
use scanlink_transport::InMemoryBroker;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub const DEVICE: &str = "esp01";
pub const CONFIRM_TIMEOUT: Duration = Duration::from_secs(10);

pub type Directory = Arc<MemoryEmployeeDirectory>;
pub type Manager = FingerprintManager<InMemoryBroker, Directory>;

pub struct Harness {
    pub broker: InMemoryBroker,
    pub directory: Directory,
    pub hub: Arc<NotificationHub>,
    pub manager: Arc<Manager>,
    pub registry: Arc<DeviceRegistry>,
    pub router: Arc<InboundRouter<InMemoryBroker, Directory>>,
    pub service: DeviceService<InMemoryBroker, Directory>,
    pub scanner: SimulatedScanner,
    router_task: JoinHandle<()>,
}

impl Harness {
    pub fn start(employees: Vec<NewEmployee>) -> Self {
        Self::with_scanner(employees, ScannerConfig::default())
    }

    pub fn with_scanner(employees: Vec<NewEmployee>, scanner: ScannerConfig) -> Self {
        let broker = InMemoryBroker::new();
        let directory = Arc::new(MemoryEmployeeDirectory::with_employees(employees).unwrap());
        let hub = Arc::new(NotificationHub::default());
        let config = LifecycleConfig::default().confirm_timeout(CONFIRM_TIMEOUT);

        let manager = Arc::new(FingerprintManager::new(
            broker.clone(),
            directory.clone(),
            hub.clone(),
            config.clone(),
        ));
        let registry = Arc::new(DeviceRegistry::new());
        let router = Arc::new(InboundRouter::new(manager.clone(), registry.clone()));
        let inbound = broker.subscribe(router.filters());
        let router_task = router.clone().spawn(inbound.into_receiver());

        let scanner = SimulatedScanner::spawn(&broker, device(), config.scheme.clone(), scanner);
        let service = DeviceService::new(manager.clone(), registry.clone());

        Self {
            broker,
            directory,
            hub,
            manager,
            registry,
            router,
            service,
            scanner,
            router_task,
        }
    }

    pub async fn fingerprint_of(&self, employee_id: i64) -> Option<FingerprintId> {
        self.directory
            .find_by_id(EmployeeId::new(employee_id))
            .await
            .unwrap()
            .unwrap()
            .fingerprint_id
    }

    /// Connect a client to the employee's room and drain the handshake.
    pub fn employee_client(&self, employee_id: i64) -> ClientConnection {
        let mut client = self.hub.connect();
        self.hub
            .handle_client_event(client.id, "subscribe_employee", json!({ "employeeID": employee_id }))
            .unwrap();
        drain(&mut client);
        client
    }

    /// Connect a client to the global room with the given role.
    pub fn global_client(&self, role: &str) -> ClientConnection {
        let mut client = self.hub.connect();
        self.hub
            .handle_client_event(client.id, "subscribe_global", json!({ "userRole": role }))
            .unwrap();
        drain(&mut client);
        client
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.router_task.abort();
    }
}

pub fn device() -> DeviceId {
    DeviceId::new(DEVICE).unwrap()
}

pub fn slot(n: u32) -> FingerprintId {
    FingerprintId::new(n).unwrap()
}

pub fn employee(id: i64, name: &str) -> NewEmployee {
    NewEmployee::new(EmployeeId::new(id), name)
}

pub fn drain(client: &mut ClientConnection) -> Vec<OutboundMessage> {
    std::iter::from_fn(|| client.try_recv()).collect()
}

/// Poll `check` until it holds, giving spawned tasks time to run.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..400 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

/// Receive client messages until one named `event` arrives.
pub async fn next_event(client: &mut ClientConnection, event: &str) -> OutboundMessage {
    let wait = async {
        loop {
            match client.recv().await {
                Some(message) if message.event == event => return message,
                Some(_) => continue,
                None => panic!("client channel closed while waiting for {event}"),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(2), wait)
        .await
        .unwrap_or_else(|_| panic!("no {event} event"))
}
