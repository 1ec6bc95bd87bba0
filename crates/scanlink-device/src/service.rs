//! Management operations with structured responses.
//!
//! Every operation returns an [`ApiResponse`]. Failures are folded into the
//! response (`success: false`, `statusCode`) instead of being returned as
//! errors, so callers can serialize the result directly.

use crate::lifecycle::{DeleteOutcome, FingerprintManager};
use crate::registry::DeviceRegistry;
use chrono::{DateTime, Utc};
use scanlink_core::constants::{MSG_NOTHING_TO_DELETE, MSG_RESET_WARNING};
use scanlink_core::{DeviceId, EmployeeId, Error, Result};
use scanlink_protocol::{Action, CommandBuilder};
use scanlink_storage::EmployeeDirectory;
use scanlink_transport::Transport;
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::warn;

/// Structured result of a management operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// Extra top-level fields (e.g. `deviceName` on register).
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl ApiResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
            warning: None,
            status_code: None,
            fields: Map::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn failure(error: &Error) -> Self {
        Self {
            success: false,
            message: error.to_string(),
            data: None,
            warning: None,
            status_code: Some(error.status_code()),
            fields: Map::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warning = Some(warning.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    fn from_result(operation: &str, result: Result<Self>) -> Self {
        result.unwrap_or_else(|error| {
            warn!(operation, %error, status_code = error.status_code(), "Management operation failed");
            Self::failure(&error)
        })
    }
}

/// Device management facade over the lifecycle manager and registry.
pub struct DeviceService<T, D> {
    manager: Arc<FingerprintManager<T, D>>,
    registry: Arc<DeviceRegistry>,
}

impl<T, D> Clone for DeviceService<T, D> {
    fn clone(&self) -> Self {
        Self {
            manager: self.manager.clone(),
            registry: self.registry.clone(),
        }
    }
}

impl<T: Transport, D: EmployeeDirectory> DeviceService<T, D> {
    pub fn new(manager: Arc<FingerprintManager<T, D>>, registry: Arc<DeviceRegistry>) -> Self {
        Self { manager, registry }
    }

    #[must_use]
    pub fn manager(&self) -> &Arc<FingerprintManager<T, D>> {
        &self.manager
    }

    async fn send(&self, device_id: &DeviceId, builder: CommandBuilder) -> Result<()> {
        self.manager.dispatcher().dispatch(device_id, builder).await?;
        Ok(())
    }

    pub async fn ping(&self, device_id: &DeviceId) -> ApiResponse {
        let result = self
            .send(device_id, CommandBuilder::new(Action::Ping))
            .await
            .map(|()| ApiResponse::ok(format!("Ping command sent to {device_id}")));
        ApiResponse::from_result("ping", result)
    }

    pub async fn get_status(&self, device_id: &DeviceId) -> ApiResponse {
        let result = self
            .send(device_id, CommandBuilder::new(Action::GetStatus))
            .await
            .map(|()| ApiResponse::ok(format!("Status request sent to {device_id}")));
        ApiResponse::from_result("get_status", result)
    }

    pub async fn reset(&self, device_id: &DeviceId) -> ApiResponse {
        let result = self
            .send(device_id, CommandBuilder::new(Action::Reset))
            .await
            .map(|()| {
                ApiResponse::ok(format!("Reset command sent to {device_id}"))
                    .with_warning(MSG_RESET_WARNING)
            });
        ApiResponse::from_result("reset", result)
    }

    pub async fn register(&self, device_id: &DeviceId, device_name: &str, location: &str) -> ApiResponse {
        let builder = CommandBuilder::new(Action::Register)
            .field("deviceName", device_name)
            .field("location", location);
        let result = self.send(device_id, builder).await.map(|()| {
            ApiResponse::ok(format!("Registration request sent to {device_id}"))
                .with_field("deviceName", device_name)
                .with_field("location", location)
        });
        ApiResponse::from_result("register", result)
    }

    /// Send an arbitrary action with optional object data merged into the payload.
    pub async fn custom(&self, device_id: &DeviceId, action: &str, data: Option<Value>) -> ApiResponse {
        let result: Result<ApiResponse> = async {
            let action = Action::parse(action)?;
            let name = action.as_str().to_string();
            self.manager
                .dispatcher()
                .send_command(device_id, action, data)
                .await?;
            Ok(ApiResponse::ok(format!(
                "Custom command '{name}' sent to {device_id}"
            )))
        }
        .await;
        ApiResponse::from_result("custom", result)
    }

    pub async fn finger_count(&self, device_id: &DeviceId) -> ApiResponse {
        let result = self
            .send(device_id, CommandBuilder::new(Action::GetFingerCount))
            .await
            .map(|()| ApiResponse::ok(format!("Finger count request sent to {device_id}")));
        ApiResponse::from_result("finger_count", result)
    }

    pub async fn enroll(&self, device_id: &DeviceId, employee_id: EmployeeId) -> ApiResponse {
        let result = self
            .manager
            .enroll(device_id, employee_id)
            .await
            .and_then(|ticket| {
                let data = serde_json::to_value(&ticket)
                    .map_err(|e| Error::InvalidArgument(e.to_string()))?;
                Ok(ApiResponse::ok(format!(
                    "Enrollment started for employee {employee_id} on slot {}",
                    ticket.fingerprint_id
                ))
                .with_data(data))
            });
        ApiResponse::from_result("enroll", result)
    }

    pub async fn delete(&self, device_id: &DeviceId, employee_id: EmployeeId) -> ApiResponse {
        let result = self
            .manager
            .delete(device_id, employee_id)
            .await
            .map(|outcome| delete_response(employee_id, outcome));
        ApiResponse::from_result("delete", result)
    }

    pub async fn delete_and_confirm(&self, device_id: &DeviceId, employee_id: EmployeeId) -> ApiResponse {
        let result = self
            .manager
            .delete_and_confirm(device_id, employee_id)
            .await
            .map(|outcome| delete_response(employee_id, outcome));
        ApiResponse::from_result("delete_and_confirm", result)
    }

    pub async fn next_available_id(&self) -> ApiResponse {
        let result = self.manager.next_available_id().await.map(|slot| {
            ApiResponse::ok(format!("Next available fingerprint ID is {slot}"))
                .with_data(json!({ "nextFingerID": slot }))
        });
        ApiResponse::from_result("next_available_id", result)
    }

    pub fn device(&self, device_id: &DeviceId) -> ApiResponse {
        let result = self.registry.get(device_id).and_then(|snapshot| {
            let data = serde_json::to_value(&snapshot)
                .map_err(|e| Error::InvalidArgument(e.to_string()))?;
            Ok(ApiResponse::ok(format!("Device {device_id}")).with_data(data))
        });
        ApiResponse::from_result("device", result)
    }

    pub fn devices(&self) -> ApiResponse {
        let devices = self.registry.list();
        let count = devices.len();
        let data = serde_json::to_value(&devices).unwrap_or(Value::Null);
        ApiResponse::ok(format!("{count} device(s) known")).with_data(data)
    }
}

fn delete_response(employee_id: EmployeeId, outcome: DeleteOutcome) -> ApiResponse {
    match outcome {
        DeleteOutcome::NothingToDelete => ApiResponse::ok(MSG_NOTHING_TO_DELETE),
        DeleteOutcome::Dispatched { fingerprint_id } => ApiResponse::ok(format!(
            "Delete command sent for employee {employee_id}"
        ))
        .with_data(json!({ "employeeID": employee_id, "fingerID": fingerprint_id })),
        DeleteOutcome::Confirmed { fingerprint_id } => ApiResponse::ok(format!(
            "Fingerprint deleted for employee {employee_id}"
        ))
        .with_data(json!({ "employeeID": employee_id, "fingerID": fingerprint_id })),
    }
}
