// Wire types for the topology backend.
//
// Field names follow the server's JSON. The REST serializers emit
// snake_case while the push channel emits camelCase, so every
// multi-word field accepts both spellings.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Push-channel event names.
pub mod events {
    pub const NETWORK_UPDATE: &str = "network_update";
    pub const DEVICE_UPDATED: &str = "device_updated";
    pub const NETWORK_TOPOLOGY_UPDATE: &str = "network_topology_update";
    pub const SCAN_PROGRESS: &str = "scan_progress";
    pub const START_NETWORK_SCAN: &str = "start_network_scan";
    pub const CANCEL_NETWORK_SCAN: &str = "cancel_network_scan";
    pub const CHECK_SCAN_STATUS: &str = "check_scan_status";
    pub const GET_NETWORK_TOPOLOGY: &str = "get_network_topology";
}

// ── Entities ────────────────────────────────────────────────────────

/// A device as the server serializes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    #[serde(default)]
    pub id: String,
    pub label: String,
    #[serde(rename = "type", default)]
    pub device_type: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub mac: Option<String>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, alias = "last_seen")]
    pub last_seen: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub metadata: Option<Value>,
    #[serde(default, alias = "is_ignored")]
    pub is_ignored: bool,
    #[serde(default, alias = "is_manually_added")]
    pub is_manually_added: bool,
}

/// A connection between two devices.
///
/// `source` and `target` are device ids (the REST serializer emits the
/// foreign-key primary keys directly).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRecord {
    #[serde(default)]
    pub id: Option<String>,
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(rename = "type", default)]
    pub connection_type: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub bandwidth: Option<f64>,
    #[serde(default)]
    pub latency: Option<f64>,
    #[serde(default, alias = "packet_loss")]
    pub packet_loss: Option<f64>,
    #[serde(default)]
    pub traffic: Option<f64>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// A discovery scan descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, alias = "discovered_devices")]
    pub discovered_devices: u32,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default, alias = "is_stale")]
    pub is_stale: bool,
    #[serde(default, alias = "error_message")]
    pub error_message: Option<String>,
}

/// Full topology snapshot: the response of the snapshot fetch and the
/// payload of `network_topology_update`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopologyPayload {
    #[serde(default)]
    pub devices: Vec<DeviceRecord>,
    #[serde(default)]
    pub connections: Vec<ConnectionRecord>,
    #[serde(default, alias = "last_scan")]
    pub last_scan: Option<ScanRecord>,
    #[serde(default, alias = "active_scan_in_progress")]
    pub active_scan_in_progress: bool,
}

// ── Push payloads ───────────────────────────────────────────────────

/// Partial device carried by `device_status_change`; present fields are
/// merged into the stored device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevicePatch {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, alias = "last_seen", skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// Incremental `network_update` message: `{type, payload}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum NetworkUpdate {
    NewDevice(DeviceRecord),
    DeviceStatusChange(DevicePatch),
    NewConnection(ConnectionRecord),
}

/// `scan_progress` message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanProgress {
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub scan_id: Option<String>,
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub discovered_devices: Option<u32>,
    #[serde(default)]
    pub is_complete: Option<bool>,
}

/// A decoded push-channel event.
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    NetworkUpdate(NetworkUpdate),
    /// A device edited by another client, sent whole.
    DeviceUpdated(DeviceRecord),
    TopologyUpdate(TopologyPayload),
    ScanProgress(ScanProgress),
    /// Any event this client does not model, kept verbatim.
    Other { event: String, data: Value },
}

impl PushEvent {
    /// Decode an event by name. Known events whose payload does not match
    /// the expected shape are kept as [`PushEvent::Other`].
    pub fn decode(event: &str, data: Value) -> Self {
        let decoded = match event {
            events::NETWORK_UPDATE => {
                serde_json::from_value(data.clone()).map(PushEvent::NetworkUpdate)
            }
            events::DEVICE_UPDATED => {
                serde_json::from_value(data.clone()).map(PushEvent::DeviceUpdated)
            }
            events::NETWORK_TOPOLOGY_UPDATE => {
                serde_json::from_value(data.clone()).map(PushEvent::TopologyUpdate)
            }
            events::SCAN_PROGRESS => {
                serde_json::from_value(data.clone()).map(PushEvent::ScanProgress)
            }
            _ => {
                return Self::Other {
                    event: event.to_owned(),
                    data,
                };
            }
        };

        decoded.unwrap_or_else(|e| {
            tracing::debug!(error = %e, event, "push payload did not match its schema");
            Self::Other {
                event: event.to_owned(),
                data,
            }
        })
    }
}

// ── Requests ────────────────────────────────────────────────────────

/// Body of `start_network_scan`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StartScanRequest {
    pub ip_range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_device_id: Option<String>,
}

/// Acknowledgement of `start_network_scan` / `cancel_network_scan` /
/// `check_scan_status`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanAck {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub scan_id: Option<String>,
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub scan: Option<ScanRecord>,
    #[serde(default)]
    pub cleaned_scans: Option<u32>,
}

impl ScanAck {
    pub fn is_success(&self) -> bool {
        self.status.eq_ignore_ascii_case("success")
    }

    /// The scan id, whether sent flat or inside the nested scan record.
    pub fn scan_id(&self) -> Option<&str> {
        self.scan_id
            .as_deref()
            .or_else(|| self.scan.as_ref().and_then(|s| s.id.as_deref()))
    }
}

/// Body of the device-create request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateDeviceRequest {
    pub label: String,
    #[serde(rename = "type")]
    pub device_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Body of the device-edit request. Only present fields are sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateDeviceRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

// ── Tests ────────────────────────────────────────────────────────────
