//! Outbound command publishing.

use scanlink_core::{DeviceId, Result};
use scanlink_protocol::{Action, CommandBuilder, DeviceCommand, TopicScheme};
use scanlink_transport::Transport;
use serde_json::Value;
use tracing::{info, warn};

/// Publishes commands to `[namespace/]device/{id}/command`.
///
/// Fire-and-forget: a successful return means the transport accepted the
/// message. Transport failures are returned to the caller and never retried.
#[derive(Debug)]
pub struct CommandDispatcher<T> {
    transport: T,
    scheme: TopicScheme,
}

impl<T: Transport> CommandDispatcher<T> {
    pub fn new(transport: T, scheme: TopicScheme) -> Self {
        Self { transport, scheme }
    }

    #[must_use]
    pub fn scheme(&self) -> &TopicScheme {
        &self.scheme
    }

    /// Build and publish a command. Exactly one publish per call.
    ///
    /// # Errors
    /// `Transport` if the publish fails, `InvalidArgument` if the payload
    /// cannot be serialized.
    pub async fn dispatch(
        &self,
        device_id: &DeviceId,
        builder: CommandBuilder,
    ) -> Result<DeviceCommand> {
        let command = builder.build();
        let payload = command.to_bytes()?;
        let topic = self.scheme.command_topic(device_id);

        if let Err(error) = self.transport.publish(&topic, payload).await {
            warn!(
                device_id = %device_id,
                action = %command.action(),
                %error,
                "Failed to publish command"
            );
            return Err(error.into());
        }

        info!(
            device_id = %device_id,
            action = %command.action(),
            request_id = %command.request_id(),
            "Command sent"
        );
        Ok(command)
    }

    /// Send `action` with optional operator-supplied fields.
    ///
    /// # Errors
    /// `InvalidArgument` if `data` is not a JSON object, otherwise as
    /// [`dispatch`](Self::dispatch).
    pub async fn send_command(
        &self,
        device_id: &DeviceId,
        action: Action,
        data: Option<Value>,
    ) -> Result<DeviceCommand> {
        let builder = CommandBuilder::new(action).merge(data.unwrap_or(Value::Null))?;
        self.dispatch(device_id, builder).await
    }
}
