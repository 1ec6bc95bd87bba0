//! Events pushed to clients.

use scanlink_core::{EmployeeId, FingerprintId, now_millis};
use serde::Serialize;
use serde_json::{Map, Value, json};

/// A named event with a JSON object payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub name: String,
    pub payload: Map<String, Value>,
}

impl Event {
    /// Build an event from any payload. Non-object payloads are wrapped as `{"data": ...}`.
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        let payload = match payload {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("data".to_string(), other);
                map
            }
        };
        Self {
            name: name.into(),
            payload,
        }
    }

    /// Wire form: `{type, ...payload, timestamp}`.
    ///
    /// `type` and `timestamp` always win over payload keys of the same name.
    #[must_use]
    pub fn enrich(&self, timestamp: i64) -> Value {
        let mut body = self.payload.clone();
        body.insert("type".to_string(), Value::String(self.name.clone()));
        body.insert("timestamp".to_string(), Value::from(timestamp));
        Value::Object(body)
    }
}

/// Typed enrollment and scan events emitted by the lifecycle manager.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    EnrollStarted {
        employee_id: EmployeeId,
        fingerprint_id: FingerprintId,
    },
    EnrollStep {
        employee_id: EmployeeId,
        step: String,
    },
    EnrollSuccess {
        employee_id: EmployeeId,
        fingerprint_id: FingerprintId,
    },
    EnrollFailure {
        employee_id: EmployeeId,
        error: String,
    },
    FingerprintMatch {
        device_id: String,
        employee_id: Option<EmployeeId>,
        fingerprint_id: FingerprintId,
        confidence: Option<f64>,
    },
    FingerprintUnknown {
        device_id: String,
    },
}

impl ProgressEvent {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ProgressEvent::EnrollStarted { .. } => "enroll_started",
            ProgressEvent::EnrollStep { .. } => "enroll_step",
            ProgressEvent::EnrollSuccess { .. } => "enroll_success",
            ProgressEvent::EnrollFailure { .. } => "enroll_failure",
            ProgressEvent::FingerprintMatch { .. } => "fingerprint_match",
            ProgressEvent::FingerprintUnknown { .. } => "fingerprint_unknown",
        }
    }

    fn payload(&self) -> Value {
        match self {
            ProgressEvent::EnrollStarted {
                employee_id,
                fingerprint_id,
            }
            | ProgressEvent::EnrollSuccess {
                employee_id,
                fingerprint_id,
            } => json!({ "employeeID": employee_id, "fingerID": fingerprint_id }),
            ProgressEvent::EnrollStep { employee_id, step } => {
                json!({ "employeeID": employee_id, "step": step })
            }
            ProgressEvent::EnrollFailure { employee_id, error } => {
                json!({ "employeeID": employee_id, "error": error })
            }
            ProgressEvent::FingerprintMatch {
                device_id,
                employee_id,
                fingerprint_id,
                confidence,
            } => json!({
                "deviceId": device_id,
                "employeeID": employee_id,
                "fingerID": fingerprint_id,
                "confidence": confidence,
            }),
            ProgressEvent::FingerprintUnknown { device_id } => json!({ "deviceId": device_id }),
        }
    }
}

impl From<ProgressEvent> for Event {
    fn from(event: ProgressEvent) -> Self {
        Event::new(event.name(), event.payload())
    }
}

/// A message delivered to one client.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundMessage {
    pub event: String,
    pub data: Value,
}

impl OutboundMessage {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    pub(crate) fn enriched(event: &Event) -> Self {
        Self::new(event.name.clone(), event.enrich(now_millis()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enrich_adds_type_and_timestamp() {
        let event = Event::new("enroll_step", json!({"employeeID": 7, "step": "place_again"}));
        let body = event.enrich(1_700_000_000_000);

        assert_eq!(body["type"], "enroll_step");
        assert_eq!(body["timestamp"], 1_700_000_000_000_i64);
        assert_eq!(body["step"], "place_again");
    }

    #[test]
    fn test_enrich_overrides_reserved_payload_keys() {
        let event = Event::new("custom", json!({"type": "forged", "timestamp": 1}));
        let body = event.enrich(42);

        assert_eq!(body["type"], "custom");
        assert_eq!(body["timestamp"], 42);
    }

    #[test]
    fn test_non_object_payload_is_wrapped() {
        let event = Event::new("note", json!("hello"));
        assert_eq!(event.payload["data"], "hello");
        assert!(Event::new("empty", Value::Null).payload.is_empty());
    }

    #[test]
    fn test_progress_event_payloads() {
        let started: Event = ProgressEvent::EnrollStarted {
            employee_id: EmployeeId::new(7),
            fingerprint_id: FingerprintId::new(3).unwrap(),
        }
        .into();
        assert_eq!(started.name, "enroll_started");
        assert_eq!(started.payload["employeeID"], 7);
        assert_eq!(started.payload["fingerID"], 3);

        let failure: Event = ProgressEvent::EnrollFailure {
            employee_id: EmployeeId::new(7),
            error: "timeout".into(),
        }
        .into();
        assert_eq!(failure.payload["error"], "timeout");

        let unknown: Event = ProgressEvent::FingerprintUnknown {
            device_id: "esp01".into(),
        }
        .into();
        assert_eq!(unknown.name, "fingerprint_unknown");
        assert_eq!(unknown.payload["deviceId"], "esp01");
    }
}
