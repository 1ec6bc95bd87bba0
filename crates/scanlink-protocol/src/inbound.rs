//! Inbound message schemas.
//!
//! Scanner firmware publishes loosely-typed JSON. Each inbound channel is
//! decoded into a closed enum so that routing code matches exhaustively and a
//! new message shape shows up as a [`DecodeError`] instead of silently falling
//! through.
//!
//! # Example
//!
//! ```
//! use scanlink_protocol::{decode, Inbound, DeviceResponse, CommandOutcome, TopicScheme};
//!
//! let scheme = TopicScheme::new();
//! let message = decode(
//!     &scheme,
//!     "device/esp01/response",
//!     br#"{"action":"delete_finger","status":"success","employeeID":7,"fingerID":3}"#,
//! )
//! .unwrap();
//!
//! match message.inbound {
//!     Inbound::Response(DeviceResponse::Delete { employee_id, outcome, .. }) => {
//!         assert_eq!(employee_id.get(), 7);
//!         assert_eq!(outcome, CommandOutcome::Success);
//!     }
//!     other => panic!("unexpected {other:?}"),
//! }
//! ```

use crate::error::DecodeError;
use crate::topic::{Channel, TopicScheme};
use scanlink_core::{
    DeviceId, EmployeeId, FingerprintId,
    constants::{FIELD_EMPLOYEE_ID, FIELD_FINGER_ID, STATUS_ERROR, STATUS_PONG, STATUS_SUCCESS},
};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

const RESPONSE: &str = "response";
const ENROLL_STEP: &str = "enroll_step";
const STATUS: &str = "status";
const FINGERPRINT: &str = "fingerprint";

/// A decoded inbound message together with the device it came from.
///
/// The device id is taken from the topic, never from the payload.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub device_id: DeviceId,
    pub inbound: Inbound,
}

/// Inbound traffic, one variant per channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Response(DeviceResponse),
    Status(DeviceStatus),
    Heartbeat(Heartbeat),
    Info(DeviceInfo),
    Fingerprint(FingerprintEvent),
}

/// Result a device reports for a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Success,
    Failure {
        status: String,
        message: Option<String>,
    },
}

impl CommandOutcome {
    fn from_status(status: &str, message: Option<String>) -> Self {
        if status == STATUS_SUCCESS {
            CommandOutcome::Success
        } else {
            CommandOutcome::Failure {
                status: status.to_string(),
                message,
            }
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, CommandOutcome::Success)
    }

    /// Human-readable failure reason, falling back to the raw status.
    #[must_use]
    pub fn failure_message(&self) -> Option<String> {
        match self {
            CommandOutcome::Success => None,
            CommandOutcome::Failure {
                message: Some(message),
                ..
            } => Some(message.clone()),
            CommandOutcome::Failure { status, .. } => Some(format!("device status {status}")),
        }
    }
}

/// Intermediate enrollment prompts relayed to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollStep {
    RemoveFinger,
    PlaceAgain,
}

impl EnrollStep {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EnrollStep::RemoveFinger => "remove_finger",
            EnrollStep::PlaceAgain => "place_again",
        }
    }
}

impl fmt::Display for EnrollStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Messages on the `response` channel.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceResponse {
    /// Reply to `ping`.
    Pong { timestamp: Option<i64> },

    /// Progress prompt during enrollment.
    EnrollStep {
        employee_id: EmployeeId,
        step: EnrollStep,
    },

    /// Final result of `enroll_finger`.
    Enroll {
        employee_id: EmployeeId,
        fingerprint_id: Option<FingerprintId>,
        outcome: CommandOutcome,
    },

    /// Final result of `delete_finger`.
    Delete {
        employee_id: EmployeeId,
        fingerprint_id: Option<FingerprintId>,
        outcome: CommandOutcome,
    },

    /// Result of `get_finger_count`.
    FingerCount {
        outcome: CommandOutcome,
        enrolled: Option<u32>,
        capacity: Option<u32>,
    },

    /// Generic failure not tied to a known action.
    Error { message: Option<String> },

    /// Acknowledgement of any other action (reset, register, custom, ...).
    Acknowledged {
        action: String,
        status: Option<String>,
    },
}

/// Messages on the `status` channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceStatus {
    Online,
    Offline,
    Other(String),
}

impl DeviceStatus {
    fn parse(raw: &str) -> Self {
        match raw {
            "online" => DeviceStatus::Online,
            "offline" => DeviceStatus::Offline,
            other => DeviceStatus::Other(other.to_string()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            DeviceStatus::Online => "online",
            DeviceStatus::Offline => "offline",
            DeviceStatus::Other(raw) => raw.as_str(),
        }
    }
}

/// Messages on the `heartbeat` channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Heartbeat {
    /// Milliseconds since device boot.
    pub uptime_ms: Option<u64>,
    /// Free heap bytes reported by the firmware.
    pub free_heap: Option<u64>,
}

/// Free-form document published on the `info` channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceInfo(pub Map<String, Value>);

/// Messages on the `fingerprint` channel.
#[derive(Debug, Clone, PartialEq)]
pub enum FingerprintEvent {
    /// A finger matched a stored slot.
    Match {
        fingerprint_id: FingerprintId,
        confidence: Option<f64>,
    },
    /// A finger was read but matched nothing.
    Unknown,
}

/// Decode a broker delivery into an [`InboundMessage`].
///
/// # Errors
/// Returns a [`DecodeError`] when the topic is outside `scheme`, names the
/// outbound command channel, or the payload does not fit the channel schema.
pub fn decode(
    scheme: &TopicScheme,
    topic: &str,
    payload: &[u8],
) -> Result<InboundMessage, DecodeError> {
    let (device_id, channel) = scheme
        .parse(topic)
        .ok_or_else(|| DecodeError::UnknownTopic(topic.to_string()))?;

    if !channel.is_inbound() {
        return Err(DecodeError::NotInbound(topic.to_string()));
    }

    let object = match serde_json::from_slice::<Value>(payload) {
        Ok(Value::Object(object)) => object,
        Ok(other) => {
            return Err(DecodeError::MalformedPayload {
                topic: topic.to_string(),
                reason: format!("expected a JSON object, got {}", kind_of(&other)),
            });
        }
        Err(e) => {
            return Err(DecodeError::MalformedPayload {
                topic: topic.to_string(),
                reason: e.to_string(),
            });
        }
    };

    let inbound = match channel {
        Channel::Response => Inbound::Response(decode_response(&object)?),
        Channel::Status => Inbound::Status(decode_status(&object)?),
        Channel::Heartbeat => Inbound::Heartbeat(decode_heartbeat(&object)),
        Channel::Info => Inbound::Info(DeviceInfo(object)),
        Channel::Fingerprint => Inbound::Fingerprint(decode_fingerprint(&object)?),
        Channel::Command => return Err(DecodeError::NotInbound(topic.to_string())),
    };

    Ok(InboundMessage { device_id, inbound })
}

fn decode_response(object: &Map<String, Value>) -> Result<DeviceResponse, DecodeError> {
    let action = str_field(object, "action");
    let status = str_field(object, "status");
    let message = str_field(object, "message").map(str::to_string);

    match action {
        Some(ENROLL_STEP) => {
            let employee_id = employee_field(object, ENROLL_STEP)?;
            let step = match str_field(object, "step") {
                Some("remove_finger") => EnrollStep::RemoveFinger,
                Some("place_again") => EnrollStep::PlaceAgain,
                Some(other) => return Err(DecodeError::invalid(ENROLL_STEP, "step", other)),
                None => return Err(DecodeError::missing(ENROLL_STEP, "step")),
            };
            Ok(DeviceResponse::EnrollStep { employee_id, step })
        }
        Some("enroll_finger") => {
            let status = status.ok_or(DecodeError::missing(RESPONSE, "status"))?;
            Ok(DeviceResponse::Enroll {
                employee_id: employee_field(object, RESPONSE)?,
                fingerprint_id: finger_field(object)?,
                outcome: CommandOutcome::from_status(status, message),
            })
        }
        Some("delete_finger") => {
            let status = status.ok_or(DecodeError::missing(RESPONSE, "status"))?;
            Ok(DeviceResponse::Delete {
                employee_id: employee_field(object, RESPONSE)?,
                fingerprint_id: finger_field(object)?,
                outcome: CommandOutcome::from_status(status, message),
            })
        }
        Some("get_finger_count") => {
            let status = status.ok_or(DecodeError::missing(RESPONSE, "status"))?;
            Ok(DeviceResponse::FingerCount {
                outcome: CommandOutcome::from_status(status, message),
                enrolled: u32_field(object, "enrolledCount"),
                capacity: u32_field(object, "capacity"),
            })
        }
        _ if status == Some(STATUS_PONG) => Ok(DeviceResponse::Pong {
            timestamp: object.get("timestamp").and_then(Value::as_i64),
        }),
        _ if status == Some(STATUS_ERROR) => Ok(DeviceResponse::Error { message }),
        Some(other) => Ok(DeviceResponse::Acknowledged {
            action: other.to_string(),
            status: status.map(str::to_string),
        }),
        None => Err(DecodeError::missing(RESPONSE, "action")),
    }
}

fn decode_status(object: &Map<String, Value>) -> Result<DeviceStatus, DecodeError> {
    str_field(object, "status")
        .map(DeviceStatus::parse)
        .ok_or(DecodeError::missing(STATUS, "status"))
}

fn decode_heartbeat(object: &Map<String, Value>) -> Heartbeat {
    Heartbeat {
        uptime_ms: object.get("uptime").and_then(Value::as_u64),
        free_heap: object.get("freeHeap").and_then(Value::as_u64),
    }
}

fn decode_fingerprint(object: &Map<String, Value>) -> Result<FingerprintEvent, DecodeError> {
    match str_field(object, "eventType") {
        Some("match") => {
            let fingerprint_id =
                finger_field(object)?.ok_or(DecodeError::missing(FINGERPRINT, FIELD_FINGER_ID))?;
            Ok(FingerprintEvent::Match {
                fingerprint_id,
                confidence: object.get("confidence").and_then(Value::as_f64),
            })
        }
        Some("unknown") => Ok(FingerprintEvent::Unknown),
        Some(other) => Err(DecodeError::invalid(FINGERPRINT, "eventType", other)),
        None => Err(DecodeError::missing(FINGERPRINT, "eventType")),
    }
}

fn str_field<'a>(object: &'a Map<String, Value>, name: &str) -> Option<&'a str> {
    object.get(name).and_then(Value::as_str)
}

/// Integer field that firmware may send either as a number or a numeric string.
fn int_field(object: &Map<String, Value>, name: &str) -> Option<Result<i64, String>> {
    match object.get(name)? {
        Value::Null => None,
        Value::Number(n) => Some(n.as_i64().ok_or_else(|| format!("not an integer: {n}"))),
        Value::String(s) => Some(s.trim().parse().map_err(|_| format!("not an integer: {s:?}"))),
        other => Some(Err(format!("expected integer, got {}", kind_of(other)))),
    }
}

fn u32_field(object: &Map<String, Value>, name: &str) -> Option<u32> {
    int_field(object, name)?
        .ok()
        .and_then(|v| u32::try_from(v).ok())
}

fn employee_field(
    object: &Map<String, Value>,
    schema: &'static str,
) -> Result<EmployeeId, DecodeError> {
    match int_field(object, FIELD_EMPLOYEE_ID) {
        Some(Ok(raw)) => Ok(EmployeeId::new(raw)),
        Some(Err(reason)) => Err(DecodeError::invalid(schema, FIELD_EMPLOYEE_ID, reason)),
        None => Err(DecodeError::missing(schema, FIELD_EMPLOYEE_ID)),
    }
}

fn finger_field(object: &Map<String, Value>) -> Result<Option<FingerprintId>, DecodeError> {
    match int_field(object, FIELD_FINGER_ID) {
        Some(Ok(raw)) => FingerprintId::try_from(raw)
            .map(Some)
            .map_err(|e| DecodeError::invalid(RESPONSE, FIELD_FINGER_ID, e.to_string())),
        Some(Err(reason)) => Err(DecodeError::invalid(RESPONSE, FIELD_FINGER_ID, reason)),
        None => Ok(None),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
