//! Room-scoped push notifications for scanlink.
//!
//! Connected clients (operator dashboards, enrollment kiosks) join rooms and
//! receive every event emitted into them:
//!
//! | Room | Name | Access |
//! |------|------|--------|
//! | per employee | `employee_{id}` | any client |
//! | global broadcast | `global_notifications` | configured staff roles |
//! | scanning staff | `employee_notifications` | exactly one role |
//!
//! Producers depend only on the [`Notifier`] trait; [`NotificationHub`] is the
//! in-process implementation that tracks clients and their rooms.
//!
//! # Example
//!
//! ```
//! use scanlink_notify::{NotificationHub, Notifier, ProgressEvent, Room};
//! use scanlink_core::EmployeeId;
//! use serde_json::json;
//!
//! let hub = NotificationHub::default();
//! let mut client = hub.connect();
//! hub.handle_client_event(client.id, "subscribe_employee", json!({"employeeID": 7}))
//!     .unwrap();
//!
//! hub.emit(
//!     &Room::Employee(EmployeeId::new(7)),
//!     ProgressEvent::EnrollFailure {
//!         employee_id: EmployeeId::new(7),
//!         error: "sensor busy".into(),
//!     }
//!     .into(),
//! );
//!
//! let names: Vec<_> = std::iter::from_fn(|| client.try_recv()).map(|m| m.event).collect();
//! assert_eq!(names, ["connected", "subscribed", "enroll_failure"]);
//! ```

pub mod error;
pub mod event;
pub mod hub;
pub mod notifier;
pub mod room;

pub use error::NotifyError;
pub use event::{Event, OutboundMessage, ProgressEvent};
pub use hub::{ClientConnection, ClientEvent, ClientId, HubConfig, NotificationHub};
pub use notifier::{Notifier, NullNotifier};
pub use room::Room;
