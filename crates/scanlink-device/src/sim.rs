//! Simulated scanner for tests and local runs.
//!
//! The simulator subscribes to its command topic on an [`InMemoryBroker`] and
//! answers the way scanner firmware does: `pong` for pings, enrollment
//! prompts followed by a result for `enroll_finger`, and so on. Each action
//! can be switched to fail, stay silent, or hold its answers until
//! [`flush_held`](SimulatedScanner::flush_held) is called.
//!
//! # Examples
//!
//! ```
//! use scanlink_core::DeviceId;
//! use scanlink_device::sim::{ScannerConfig, SimulatedScanner};
//! use scanlink_protocol::TopicScheme;
//! use scanlink_transport::InMemoryBroker;
//!
//! #[tokio::main]
//! async fn main() {
//!     let broker = InMemoryBroker::new();
//!     let mut responses = broker.subscribe(["device/+/response"]);
//!     let scanner = SimulatedScanner::spawn(
//!         &broker,
//!         DeviceId::new("esp01").unwrap(),
//!         TopicScheme::new(),
//!         ScannerConfig::default(),
//!     );
//!
//!     broker
//!         .publish_now("device/esp01/command", r#"{"action":"ping"}"#)
//!         .unwrap();
//!     let reply = responses.recv().await.unwrap();
//!     assert!(String::from_utf8_lossy(&reply.payload).contains("pong"));
//!     assert_eq!(scanner.command_count("ping"), 1);
//! }
//! ```

use scanlink_core::constants::{FIELD_DEVICE_ID, FIELD_EMPLOYEE_ID, FIELD_FINGER_ID, STATUS_ERROR, STATUS_PONG, STATUS_SUCCESS};
use scanlink_core::{DeviceId, FingerprintId, now_millis};
use scanlink_protocol::{Channel, TopicScheme};
use scanlink_transport::{Delivery, InMemoryBroker};
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// How the simulator answers one action.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Behavior {
    /// Answer normally.
    #[default]
    Respond,
    /// Answer with `status: "error"` and this message.
    Fail(String),
    /// Never answer.
    Silent,
    /// Compute the normal answer but keep it until flushed.
    Hold,
}

#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// Number of template slots on the sensor.
    pub capacity: u32,
    /// Emit `remove_finger` / `place_again` prompts before an enroll result.
    pub enroll_steps: bool,
    /// Confidence reported with simulated matches.
    pub confidence: f64,
    pub firmware: String,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            capacity: 127,
            enroll_steps: true,
            confidence: 92.0,
            firmware: "sim-1.0.0".to_string(),
        }
    }
}

impl ScannerConfig {
    pub fn capacity(mut self, capacity: u32) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn enroll_steps(mut self, enabled: bool) -> Self {
        self.enroll_steps = enabled;
        self
    }
}

#[derive(Debug, Default)]
struct State {
    behaviors: HashMap<String, Behavior>,
    slots: BTreeMap<u32, i64>,
    received: Vec<Value>,
    held: Vec<(String, Value)>,
}

struct Shared {
    device_id: DeviceId,
    scheme: TopicScheme,
    broker: InMemoryBroker,
    config: ScannerConfig,
    state: Mutex<State>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, channel: Channel, body: &Value) {
        let topic = self.scheme.topic(&self.device_id, channel);
        if let Err(error) = self.broker.publish_now(&topic, body.to_string()) {
            warn!(device_id = %self.device_id, %topic, %error, "Simulated scanner publish failed");
        }
    }

    fn handle(&self, delivery: &Delivery) {
        let command: Value = match serde_json::from_slice(&delivery.payload) {
            Ok(Value::Object(object)) => Value::Object(object),
            _ => {
                warn!(device_id = %self.device_id, "Simulated scanner ignoring malformed command");
                return;
            }
        };

        let action = command
            .get("action")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        debug!(device_id = %self.device_id, %action, "Simulated scanner received command");

        let behavior = {
            let mut state = self.state();
            state.received.push(command.clone());
            state.behaviors.get(&action).cloned().unwrap_or_default()
        };

        let replies = match &behavior {
            Behavior::Silent => return,
            Behavior::Fail(message) => vec![(Channel::Response, failure(&action, &command, message))],
            Behavior::Respond | Behavior::Hold => self.answer(&action, &command),
        };

        if behavior == Behavior::Hold {
            let mut state = self.state();
            state.held.extend(replies.into_iter().map(|(channel, body)| {
                (self.scheme.topic(&self.device_id, channel), body)
            }));
            return;
        }

        for (channel, body) in replies {
            self.publish(channel, &body);
        }
    }

    fn answer(&self, action: &str, command: &Value) -> Vec<(Channel, Value)> {
        match action {
            "ping" => vec![(
                Channel::Response,
                json!({ "status": STATUS_PONG, "timestamp": now_millis() }),
            )],
            "get_status" => vec![
                (
                    Channel::Status,
                    json!({ FIELD_DEVICE_ID: self.device_id.as_str(), "status": "online" }),
                ),
                (Channel::Response, ack(action)),
            ],
            "enroll_finger" => self.enroll(command),
            "delete_finger" => self.delete(command),
            "get_finger_count" => {
                let enrolled = self.state().slots.len();
                vec![(
                    Channel::Response,
                    json!({
                        "action": action,
                        "status": STATUS_SUCCESS,
                        "enrolledCount": enrolled,
                        "capacity": self.config.capacity,
                    }),
                )]
            }
            _ => vec![(Channel::Response, ack(action))],
        }
    }

    fn enroll(&self, command: &Value) -> Vec<(Channel, Value)> {
        let employee = command.get(FIELD_EMPLOYEE_ID).cloned().unwrap_or(Value::Null);
        let mut replies = Vec::new();

        if self.config.enroll_steps {
            for step in ["remove_finger", "place_again"] {
                replies.push((
                    Channel::Response,
                    json!({ "action": "enroll_step", FIELD_EMPLOYEE_ID: employee, "step": step }),
                ));
            }
        }

        let slot = command.get(FIELD_FINGER_ID).and_then(Value::as_u64);
        let outcome = match slot.and_then(|s| u32::try_from(s).ok()) {
            Some(slot) if slot >= 1 && slot <= self.config.capacity => {
                self.state()
                    .slots
                    .insert(slot, employee.as_i64().unwrap_or_default());
                result("enroll_finger", command, STATUS_SUCCESS, "Fingerprint enrolled")
            }
            _ => failure("enroll_finger", command, "Invalid fingerprint slot"),
        };
        replies.push((Channel::Response, outcome));
        replies
    }

    fn delete(&self, command: &Value) -> Vec<(Channel, Value)> {
        if let Some(slot) = command
            .get(FIELD_FINGER_ID)
            .and_then(Value::as_u64)
            .and_then(|s| u32::try_from(s).ok())
        {
            self.state().slots.remove(&slot);
        }
        vec![(
            Channel::Response,
            result("delete_finger", command, STATUS_SUCCESS, "Fingerprint deleted"),
        )]
    }
}

fn ack(action: &str) -> Value {
    json!({ "action": action, "status": STATUS_SUCCESS })
}

fn result(action: &str, command: &Value, status: &str, message: &str) -> Value {
    let mut body = Map::new();
    body.insert("action".into(), action.into());
    body.insert("status".into(), status.into());
    body.insert("message".into(), message.into());
    for field in [FIELD_EMPLOYEE_ID, FIELD_FINGER_ID] {
        if let Some(value) = command.get(field) {
            body.insert(field.into(), value.clone());
        }
    }
    Value::Object(body)
}

fn failure(action: &str, command: &Value, message: &str) -> Value {
    result(action, command, STATUS_ERROR, message)
}

/// An in-process scanner attached to a broker.
///
/// Dropping the handle stops the simulator.
pub struct SimulatedScanner {
    shared: Arc<Shared>,
    task: JoinHandle<()>,
}

impl std::fmt::Debug for SimulatedScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedScanner")
            .field("device_id", &self.shared.device_id)
            .finish_non_exhaustive()
    }
}

impl SimulatedScanner {
    /// Subscribe to the device's command topic and start answering.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        broker: &InMemoryBroker,
        device_id: DeviceId,
        scheme: TopicScheme,
        config: ScannerConfig,
    ) -> Self {
        let mut commands = broker.subscribe([scheme.command_topic(&device_id)]);
        let shared = Arc::new(Shared {
            device_id,
            scheme,
            broker: broker.clone(),
            config,
            state: Mutex::new(State::default()),
        });

        let worker = shared.clone();
        let task = tokio::spawn(async move {
            while let Some(delivery) = commands.recv().await {
                worker.handle(&delivery);
            }
        });

        Self { shared, task }
    }

    #[must_use]
    pub fn device_id(&self) -> &DeviceId {
        &self.shared.device_id
    }

    /// Change how `action` is answered from now on.
    pub fn set_behavior(&self, action: &str, behavior: Behavior) {
        self.shared
            .state()
            .behaviors
            .insert(action.to_string(), behavior);
    }

    /// Publish every held answer in order. Returns how many were sent.
    pub fn flush_held(&self) -> usize {
        let held = std::mem::take(&mut self.shared.state().held);
        let count = held.len();
        for (topic, body) in held {
            if let Err(error) = self.shared.broker.publish_now(&topic, body.to_string()) {
                warn!(%topic, %error, "Simulated scanner flush failed");
            }
        }
        count
    }

    #[must_use]
    pub fn held_count(&self) -> usize {
        self.shared.state().held.len()
    }

    /// Every command received so far, in arrival order.
    #[must_use]
    pub fn commands(&self) -> Vec<Value> {
        self.shared.state().received.clone()
    }

    #[must_use]
    pub fn command_count(&self, action: &str) -> usize {
        self.shared
            .state()
            .received
            .iter()
            .filter(|c| c.get("action").and_then(Value::as_str) == Some(action))
            .count()
    }

    /// Slots currently programmed on the simulated sensor.
    #[must_use]
    pub fn enrolled_slots(&self) -> Vec<FingerprintId> {
        self.shared
            .state()
            .slots
            .keys()
            .filter_map(|slot| FingerprintId::new(*slot).ok())
            .collect()
    }

    /// Pretend a finger matched `slot`.
    pub fn publish_match(&self, slot: FingerprintId) {
        self.shared.publish(
            Channel::Fingerprint,
            &json!({
                "eventType": "match",
                FIELD_FINGER_ID: slot.get(),
                FIELD_DEVICE_ID: self.shared.device_id.as_str(),
                "confidence": self.shared.config.confidence,
            }),
        );
    }

    /// Pretend an unknown finger was read.
    pub fn publish_unknown(&self) {
        self.shared.publish(
            Channel::Fingerprint,
            &json!({ "eventType": "unknown", FIELD_DEVICE_ID: self.shared.device_id.as_str() }),
        );
    }

    /// Publish the boot sequence: status, info and a first heartbeat.
    pub fn announce(&self) {
        let id = self.shared.device_id.as_str();
        self.shared
            .publish(Channel::Status, &json!({ FIELD_DEVICE_ID: id, "status": "online" }));
        self.shared.publish(
            Channel::Info,
            &json!({
                FIELD_DEVICE_ID: id,
                "firmware": self.shared.config.firmware,
                "capacity": self.shared.config.capacity,
            }),
        );
        self.heartbeat(0);
    }

    pub fn heartbeat(&self, uptime_ms: u64) {
        self.shared.publish(
            Channel::Heartbeat,
            &json!({
                FIELD_DEVICE_ID: self.shared.device_id.as_str(),
                "uptime": uptime_ms,
                "freeHeap": 41_000,
            }),
        );
    }
}

impl Drop for SimulatedScanner {
    fn drop(&mut self) {
        self.task.abort();
    }
}
