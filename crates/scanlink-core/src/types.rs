use crate::{
    Result,
    constants::{MAX_DEVICE_ID_LENGTH, TOPIC_SEPARATOR, WILDCARD_MULTI, WILDCARD_SINGLE},
    error::Error,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Scanner identifier used as a single topic level (e.g. `esp01`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceId(String);

impl DeviceId {
    /// Create a new device ID with validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidArgument` if the ID is empty, too long, or
    /// contains a topic separator or wildcard.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();

        if id.is_empty() {
            return Err(Error::InvalidArgument(
                "Device ID must not be empty".to_string(),
            ));
        }

        if id.len() > MAX_DEVICE_ID_LENGTH {
            return Err(Error::InvalidArgument(format!(
                "Device ID must be at most {MAX_DEVICE_ID_LENGTH} chars, got {}",
                id.len()
            )));
        }

        if id.contains(TOPIC_SEPARATOR)
            || id.contains(WILDCARD_SINGLE)
            || id.contains(WILDCARD_MULTI)
            || id.chars().any(char::is_whitespace)
        {
            return Err(Error::InvalidArgument(format!(
                "Device ID must be a single topic level: {id}"
            )));
        }

        Ok(DeviceId(id))
    }

    /// Get the device ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for DeviceId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        DeviceId::new(s)
    }
}

impl TryFrom<String> for DeviceId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        DeviceId::new(value)
    }
}

impl From<DeviceId> for String {
    fn from(value: DeviceId) -> Self {
        value.0
    }
}

/// Employee identifier as stored in the employee directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmployeeId(i64);

impl EmployeeId {
    #[must_use]
    pub const fn new(id: i64) -> Self {
        EmployeeId(id)
    }

    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for EmployeeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for EmployeeId {
    fn from(value: i64) -> Self {
        EmployeeId(value)
    }
}

/// Hardware fingerprint storage slot (1-based).
///
/// Slot identifiers are small positive integers; `0` is never a valid slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct FingerprintId(u32);

impl FingerprintId {
    /// First slot handed out by the allocator.
    pub const FIRST: FingerprintId = FingerprintId(1);

    /// Create a new fingerprint slot id with validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidArgument` if the slot is `0`.
    pub fn new(id: u32) -> Result<Self> {
        if id == 0 {
            return Err(Error::InvalidArgument(
                "Fingerprint ID must be positive".to_string(),
            ));
        }
        Ok(FingerprintId(id))
    }

    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// The slot immediately after this one, or `None` on overflow.
    #[must_use]
    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(FingerprintId)
    }
}

impl fmt::Display for FingerprintId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u32> for FingerprintId {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        FingerprintId::new(value)
    }
}

impl TryFrom<i64> for FingerprintId {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self> {
        let raw = u32::try_from(value)
            .map_err(|_| Error::InvalidArgument(format!("Fingerprint ID out of range: {value}")))?;
        FingerprintId::new(raw)
    }
}

impl From<FingerprintId> for u32 {
    fn from(value: FingerprintId) -> Self {
        value.0
    }
}

impl From<FingerprintId> for i64 {
    fn from(value: FingerprintId) -> Self {
        i64::from(value.0)
    }
}

/// Per-command identifier used to de-duplicate logs.
///
/// Format: `req_{unix_millis}_{9 hex chars}`. Not used for response correlation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Generate a fresh request id from the current time and a random suffix.
    #[must_use]
    pub fn generate() -> Self {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        RequestId(format!(
            "req_{}_{}",
            Utc::now().timestamp_millis(),
            &suffix[..9]
        ))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Current wall-clock time in unix milliseconds, as stamped on commands and events.
#[must_use]
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
