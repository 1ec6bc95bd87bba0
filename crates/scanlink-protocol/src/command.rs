//! Outbound device commands.
//!
//! Every command published to `device/{id}/command` carries the action name,
//! a freshly generated request id and a unix-millisecond timestamp, followed
//! by action-specific fields:
//!
//! ```json
//! {"action":"enroll_finger","requestId":"req_1733900000000_3f9a1c2b7","timestamp":1733900000000,"employeeID":7,"fingerID":3}
//! ```
//!
//! # Example
//!
//! ```
//! use scanlink_protocol::{Action, CommandBuilder};
//! use scanlink_core::{EmployeeId, FingerprintId};
//!
//! let command = CommandBuilder::new(Action::EnrollFinger)
//!     .employee(EmployeeId::new(7))
//!     .finger(FingerprintId::new(3).unwrap())
//!     .build();
//!
//! let json = command.to_json().unwrap();
//! assert_eq!(json["action"], "enroll_finger");
//! assert_eq!(json["employeeID"], 7);
//! assert_eq!(json["fingerID"], 3);
//! ```

use scanlink_core::{
    EmployeeId, Error, FingerprintId, RequestId, Result,
    constants::{FIELD_EMPLOYEE_ID, FIELD_FINGER_ID},
    now_millis,
};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Command vocabulary understood by scanner firmware.
///
/// Operators may also send arbitrary actions through [`Action::Custom`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Action {
    Ping,
    GetStatus,
    Reset,
    Register,
    EnrollFinger,
    DeleteFinger,
    GetFingerCount,
    Custom(String),
}

impl Action {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Action::Ping => "ping",
            Action::GetStatus => "get_status",
            Action::Reset => "reset",
            Action::Register => "register",
            Action::EnrollFinger => "enroll_finger",
            Action::DeleteFinger => "delete_finger",
            Action::GetFingerCount => "get_finger_count",
            Action::Custom(name) => name.as_str(),
        }
    }

    /// Parse an action name, mapping unknown names to [`Action::Custom`].
    ///
    /// # Errors
    /// Returns `Error::InvalidArgument` for an empty or whitespace-only name.
    pub fn parse(name: &str) -> Result<Self> {
        let name = name.trim();
        Ok(match name {
            "" => {
                return Err(Error::InvalidArgument(
                    "Action name must not be empty".to_string(),
                ));
            }
            "ping" => Action::Ping,
            "get_status" => Action::GetStatus,
            "reset" => Action::Reset,
            "register" => Action::Register,
            "enroll_finger" => Action::EnrollFinger,
            "delete_finger" => Action::DeleteFinger,
            "get_finger_count" => Action::GetFingerCount,
            other => Action::Custom(other.to_string()),
        })
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Action::parse(s)
    }
}

impl Serialize for Action {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A command ready to publish. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceCommand {
    action: Action,
    #[serde(rename = "requestId")]
    request_id: RequestId,
    timestamp: i64,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl DeviceCommand {
    #[must_use]
    pub fn action(&self) -> &Action {
        &self.action
    }

    #[must_use]
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    #[must_use]
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Serialize to the JSON document published on the wire.
    ///
    /// # Errors
    /// Returns `Error::InvalidArgument` if a field cannot be represented as JSON.
    pub fn to_json(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(|e| Error::InvalidArgument(e.to_string()))
    }

    /// Serialize to wire bytes.
    ///
    /// # Errors
    /// Returns `Error::InvalidArgument` if a field cannot be represented as JSON.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::InvalidArgument(e.to_string()))
    }
}

/// Fluent builder for [`DeviceCommand`].
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    action: Action,
    fields: Map<String, Value>,
}

impl CommandBuilder {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            fields: Map::new(),
        }
    }

    /// Attach the `employeeID` field.
    pub fn employee(self, employee_id: EmployeeId) -> Self {
        self.field(FIELD_EMPLOYEE_ID, employee_id.get())
    }

    /// Attach the `fingerID` field.
    pub fn finger(self, fingerprint_id: FingerprintId) -> Self {
        self.field(FIELD_FINGER_ID, fingerprint_id.get())
    }

    /// Attach an arbitrary field. The reserved envelope keys
    /// (`action`, `requestId`, `timestamp`) are ignored.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let name = name.into();
        if !is_reserved(&name) {
            self.fields.insert(name, value.into());
        }
        self
    }

    /// Merge every key of a JSON object (operator-supplied custom data).
    ///
    /// # Errors
    /// Returns `Error::InvalidArgument` if `data` is neither an object nor null.
    pub fn merge(mut self, data: Value) -> Result<Self> {
        match data {
            Value::Null => Ok(self),
            Value::Object(map) => {
                for (key, value) in map {
                    self = self.field(key, value);
                }
                Ok(self)
            }
            other => Err(Error::InvalidArgument(format!(
                "Command data must be a JSON object, got {other}"
            ))),
        }
    }

    /// Stamp the command with a request id and the current time.
    #[must_use]
    pub fn build(self) -> DeviceCommand {
        DeviceCommand {
            action: self.action,
            request_id: RequestId::generate(),
            timestamp: now_millis(),
            fields: self.fields,
        }
    }
}

fn is_reserved(name: &str) -> bool {
    matches!(name, "action" | "requestId" | "timestamp")
}
