use thiserror::Error;

/// Reasons an inbound broker message could not be turned into an [`InboundMessage`].
///
/// Decode failures never abort message routing; the router logs them to the
/// dead-letter target and moves on.
///
/// [`InboundMessage`]: crate::inbound::InboundMessage
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Topic does not follow `[namespace/]device/{id}/{channel}`.
    #[error("Unrecognized topic: {0}")]
    UnknownTopic(String),

    /// Topic is outbound-only (e.g. a command echoed back by the broker).
    #[error("Topic is not an inbound channel: {0}")]
    NotInbound(String),

    /// Payload is not valid JSON or not a JSON object.
    #[error("Malformed payload on {topic}: {reason}")]
    MalformedPayload { topic: String, reason: String },

    /// A field required by the schema is absent.
    #[error("Missing field {field} in {schema}")]
    MissingField { schema: &'static str, field: &'static str },

    /// A field is present but carries an unusable value.
    #[error("Invalid field {field} in {schema}: {reason}")]
    InvalidField {
        schema: &'static str,
        field: &'static str,
        reason: String,
    },
}

impl DecodeError {
    pub(crate) fn missing(schema: &'static str, field: &'static str) -> Self {
        Self::MissingField { schema, field }
    }

    pub(crate) fn invalid(schema: &'static str, field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            schema,
            field,
            reason: reason.into(),
        }
    }
}
