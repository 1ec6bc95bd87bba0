//! Last known state of every device heard from.

use chrono::{DateTime, Utc};
use scanlink_core::{DeviceId, Error, Result};
use scanlink_protocol::{DeviceInfo, DeviceStatus, Heartbeat};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// Snapshot of a device as reported over the inbound channels.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSnapshot {
    pub device_id: DeviceId,
    pub status: Option<String>,
    pub uptime_ms: Option<u64>,
    pub free_heap: Option<u64>,
    pub enrolled_count: Option<u32>,
    pub capacity: Option<u32>,
    pub info: Map<String, Value>,
    pub last_seen: DateTime<Utc>,
}

impl DeviceSnapshot {
    fn new(device_id: DeviceId) -> Self {
        Self {
            device_id,
            status: None,
            uptime_ms: None,
            free_heap: None,
            enrolled_count: None,
            capacity: None,
            info: Map::new(),
            last_seen: Utc::now(),
        }
    }
}

/// Registry of device snapshots.
///
/// Purely observational: commands are sent to any device id whether or not
/// it appears here.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: RwLock<HashMap<DeviceId, DeviceSnapshot>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn update(&self, device_id: &DeviceId, apply: impl FnOnce(&mut DeviceSnapshot)) {
        let mut devices = self.devices.write().unwrap_or_else(PoisonError::into_inner);
        let snapshot = devices
            .entry(device_id.clone())
            .or_insert_with(|| DeviceSnapshot::new(device_id.clone()));
        snapshot.last_seen = Utc::now();
        apply(snapshot);
    }

    /// Note that a device sent something.
    pub fn touch(&self, device_id: &DeviceId) {
        self.update(device_id, |_| {});
    }

    pub fn record_status(&self, device_id: &DeviceId, status: &DeviceStatus) {
        debug!(device_id = %device_id, status = status.as_str(), "Device status");
        self.update(device_id, |s| s.status = Some(status.as_str().to_string()));
    }

    pub fn record_heartbeat(&self, device_id: &DeviceId, heartbeat: &Heartbeat) {
        self.update(device_id, |s| {
            if heartbeat.uptime_ms.is_some() {
                s.uptime_ms = heartbeat.uptime_ms;
            }
            if heartbeat.free_heap.is_some() {
                s.free_heap = heartbeat.free_heap;
            }
        });
    }

    /// Merge an info document into the stored one.
    pub fn record_info(&self, device_id: &DeviceId, info: &DeviceInfo) {
        self.update(device_id, |s| {
            for (key, value) in &info.0 {
                s.info.insert(key.clone(), value.clone());
            }
        });
    }

    pub fn record_finger_count(
        &self,
        device_id: &DeviceId,
        enrolled: Option<u32>,
        capacity: Option<u32>,
    ) {
        self.update(device_id, |s| {
            if enrolled.is_some() {
                s.enrolled_count = enrolled;
            }
            if capacity.is_some() {
                s.capacity = capacity;
            }
        });
    }

    /// Snapshot for one device.
    ///
    /// # Errors
    /// `NotFound` if the device never sent anything.
    pub fn get(&self, device_id: &DeviceId) -> Result<DeviceSnapshot> {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(device_id)
            .cloned()
            .ok_or_else(|| Error::not_found("Device", device_id))
    }

    /// Every known device, ordered by id.
    #[must_use]
    pub fn list(&self) -> Vec<DeviceSnapshot> {
        let mut devices: Vec<_> = self
            .devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        devices.sort_by(|a, b| a.device_id.as_str().cmp(b.device_id.as_str()));
        devices
    }
}
