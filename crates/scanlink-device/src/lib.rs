//! Device-side fingerprint lifecycle for scanlink.
//!
//! This crate turns operator requests into scanner commands and device
//! responses into directory updates and progress events.
//!
//! # Components
//!
//! - **CommandDispatcher**: builds and publishes commands on
//!   `[namespace/]device/{id}/command`
//! - **CorrelationTable**: parks callers waiting for a device answer, with
//!   per-entry timeouts
//! - **allocator**: gap-filling slot allocation
//! - **EnrollmentSessions**: per-employee enrollment state machine
//! - **FingerprintManager**: enroll, delete and delete-and-confirm workflows
//! - **InboundRouter**: sequential decode and dispatch of inbound traffic
//! - **DeviceRegistry**: last known status, heartbeat, info and finger count
//! - **DeviceService**: management operations returning [`ApiResponse`]
//! - **SimulatedScanner**: in-process firmware stand-in for tests and demos
//!
//! # Wiring
//!
//! ```
//! use scanlink_core::{DeviceId, EmployeeId};
//! use scanlink_device::{DeviceRegistry, FingerprintManager, InboundRouter, LifecycleConfig};
//! use scanlink_notify::NotificationHub;
//! use scanlink_storage::{MemoryEmployeeDirectory, NewEmployee};
//! use scanlink_transport::InMemoryBroker;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let broker = InMemoryBroker::new();
//! let directory = Arc::new(MemoryEmployeeDirectory::new());
//! directory.insert(NewEmployee::new(EmployeeId::new(7), "Ana")).await?;
//!
//! let hub = Arc::new(NotificationHub::default());
//! let config = LifecycleConfig::default();
//! let manager = Arc::new(FingerprintManager::new(broker.clone(), directory, hub, config));
//! let registry = Arc::new(DeviceRegistry::new());
//!
//! let router = Arc::new(InboundRouter::new(manager.clone(), registry));
//! let inbound = broker.subscribe(router.filters());
//! router.spawn(inbound.into_receiver());
//!
//! let ticket = manager.enroll(&DeviceId::new("esp01")?, EmployeeId::new(7)).await?;
//! assert_eq!(ticket.fingerprint_id.get(), 1);
//! # Ok(())
//! # }
//! ```

pub mod allocator;
pub mod config;
pub mod correlation;
pub mod dispatcher;
pub mod enrollment;
pub mod lifecycle;
pub mod registry;
pub mod router;
pub mod service;
pub mod sim;

pub use allocator::next_available_id;
pub use config::LifecycleConfig;
pub use correlation::{Claim, CorrelationTable, PendingOperation};
pub use dispatcher::CommandDispatcher;
pub use enrollment::{EnrollmentSessions, EnrollmentState, Resolution};
pub use lifecycle::{DeleteOutcome, EnrollTicket, FingerprintManager};
pub use registry::{DeviceRegistry, DeviceSnapshot};
pub use router::{InboundRouter, RouterStats};
pub use service::{ApiResponse, DeviceService};
pub use sim::{Behavior, ScannerConfig, SimulatedScanner};
