//! Core constants for the scanlink device protocol.
//!
//! Scanners are addressed over a publish/subscribe broker using topics of the
//! form:
//!
//! ```text
//! [namespace/]device/{deviceId}/{channel}
//! ```
//!
//! | Channel | Direction | Payload |
//! |---------|-----------|---------|
//! | `command` | outbound | `{action, requestId, timestamp, ...}` |
//! | `response` | inbound | `{action, status, employeeID, fingerID, message?}` |
//! | `status` | inbound | `{deviceId, status}` |
//! | `heartbeat` | inbound | `{deviceId, uptime, freeHeap}` |
//! | `info` | inbound | free-form device document |
//! | `fingerprint` | inbound | `{eventType, fingerID, deviceId, confidence?}` |
//!
//! # Usage
//!
//! ```
//! use scanlink_core::constants::*;
//!
//! assert_eq!(DEVICE_SEGMENT, "device");
//! assert_eq!(DEFAULT_CONFIRM_TIMEOUT_MS, 10_000);
//! ```

// ============================================================================
// Topic Segments
// ============================================================================

/// Topic segment that precedes the device identifier.
pub const DEVICE_SEGMENT: &str = "device";

/// Single-level wildcard used in subscription filters.
pub const WILDCARD_SINGLE: &str = "+";

/// Multi-level wildcard used in subscription filters (last segment only).
pub const WILDCARD_MULTI: &str = "#";

/// Topic level separator.
pub const TOPIC_SEPARATOR: char = '/';

/// Maximum accepted device identifier length.
pub const MAX_DEVICE_ID_LENGTH: usize = 64;

// ============================================================================
// Payload Field Names
// ============================================================================

/// Employee identifier field in device payloads.
pub const FIELD_EMPLOYEE_ID: &str = "employeeID";

/// Fingerprint slot field in device payloads.
pub const FIELD_FINGER_ID: &str = "fingerID";

/// Device identifier field in device payloads.
pub const FIELD_DEVICE_ID: &str = "deviceId";

// ============================================================================
// Response Status Values
// ============================================================================

/// Status reported by a device when a command succeeded.
pub const STATUS_SUCCESS: &str = "success";

/// Status reported by a device as a ping reply.
pub const STATUS_PONG: &str = "pong";

/// Status reported by a device for a generic failure.
pub const STATUS_ERROR: &str = "error";

// ============================================================================
// Timeouts
// ============================================================================

/// Default time a blocking delete waits for device confirmation (milliseconds).
pub const DEFAULT_CONFIRM_TIMEOUT_MS: u64 = 10_000;

// ============================================================================
// Notification Rooms
// ============================================================================

/// Prefix of per-employee notification rooms (`employee_{id}`).
pub const EMPLOYEE_ROOM_PREFIX: &str = "employee_";

/// Global broadcast room, gated to staff roles.
pub const GLOBAL_ROOM: &str = "global_notifications";

/// Broadcast room for scanning staff, gated to a single role.
pub const ALL_EMPLOYEE_ROOM: &str = "employee_notifications";

/// Roles allowed into the global broadcast room by default.
pub const DEFAULT_GLOBAL_ROLES: [&str; 4] = ["employee", "wh_manager", "hr_manager", "admin"];

/// Role allowed into the scanning staff room by default.
pub const DEFAULT_STAFF_ROLE: &str = "employee";

// ============================================================================
// Management Messages
// ============================================================================

/// Warning attached to reset responses.
pub const MSG_RESET_WARNING: &str = "Device will restart in 2 seconds";

/// Message returned when a delete finds no assigned slot.
pub const MSG_NOTHING_TO_DELETE: &str = "No fingerprint assigned, nothing to delete";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_names_are_distinct() {
        assert_ne!(GLOBAL_ROOM, ALL_EMPLOYEE_ROOM);
        assert!(!GLOBAL_ROOM.starts_with(EMPLOYEE_ROOM_PREFIX));
    }

    #[test]
    fn test_staff_role_is_global_role() {
        assert!(DEFAULT_GLOBAL_ROLES.contains(&DEFAULT_STAFF_ROLE));
    }
}
