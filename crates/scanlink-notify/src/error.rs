use thiserror::Error;

/// Errors raised while handling client-originated events.
///
/// Emission itself never fails: it is fire-and-forget.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotifyError {
    #[error("Unknown client: {0}")]
    UnknownClient(String),

    #[error("Unknown client event: {0}")]
    UnknownEvent(String),

    #[error("Malformed {event} event: {reason}")]
    MalformedEvent { event: String, reason: String },
}

pub type Result<T> = std::result::Result<T, NotifyError>;
