use thiserror::Error;

/// Service-level error taxonomy shared by every scanlink crate.
///
/// Lower layers (transport, storage, protocol decoding) keep their own error
/// enums and convert into this one at the boundary where a caller of the
/// fingerprint lifecycle sees them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // Lookup errors
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    // Correlation errors
    #[error("Operation already pending for {key}")]
    Conflict { key: String },

    // Device errors
    #[error("Device reported failure for {action}: {message}")]
    Device { action: String, message: String },

    #[error("No device response within {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    // Infrastructure errors
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    // Validation errors
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing configuration key: {0}")]
    MissingConfig(String),
}

impl Error {
    /// Create a not-found error for an entity reference.
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Create a conflict error for a correlation key.
    pub fn conflict(key: impl ToString) -> Self {
        Self::Conflict {
            key: key.to_string(),
        }
    }

    /// Create a device failure error.
    pub fn device(action: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Device {
            action: action.into(),
            message: message.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// HTTP-style status code for structured failure responses.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Error::NotFound { .. } => 404,
            Error::Conflict { .. } => 409,
            Error::InvalidArgument(_) => 400,
            Error::Device { .. } | Error::Transport(_) => 502,
            Error::Timeout { .. } => 504,
            Error::Persistence(_)
            | Error::Cancelled(_)
            | Error::Config(_)
            | Error::MissingConfig(_) => 500,
        }
    }

    /// Returns `true` for errors that are raised before any command is sent.
    #[must_use]
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Error::NotFound { .. } | Error::Conflict { .. } | Error::InvalidArgument(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_not_found_display() {
        let error = Error::not_found("Employee", 7);
        assert_eq!(error.to_string(), "Employee not found: 7");
    }

    #[test]
    fn test_device_display() {
        let error = Error::device("delete_finger", "sensor busy");
        assert_eq!(
            error.to_string(),
            "Device reported failure for delete_finger: sensor busy"
        );
    }

    #[rstest]
    #[case(Error::not_found("Employee", 1), 404)]
    #[case(Error::conflict("employee 1"), 409)]
    #[case(Error::InvalidArgument("x".into()), 400)]
    #[case(Error::device("enroll_finger", "bad"), 502)]
    #[case(Error::Transport("down".into()), 502)]
    #[case(Error::timeout(10_000), 504)]
    #[case(Error::Persistence("db".into()), 500)]
    #[case(Error::Cancelled("claim dropped".into()), 500)]
    fn test_status_codes(#[case] error: Error, #[case] expected: u16) {
        assert_eq!(error.status_code(), expected);
    }

    #[test]
    fn test_precondition_errors() {
        assert!(Error::not_found("Employee", 1).is_precondition());
        assert!(Error::conflict(1).is_precondition());
        assert!(!Error::timeout(1).is_precondition());
        assert!(!Error::Persistence("x".into()).is_precondition());
        assert!(!Error::Cancelled("x".into()).is_precondition());
    }
}
