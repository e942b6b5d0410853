// ── Command request types ──
//
// Typed input for device commands, converted into glacier-api request
// bodies at the edge.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use glacier_api::{CreateDeviceRequest, UpdateDeviceRequest};

use crate::error::CoreError;
use crate::model::{DeviceKind, MacAddress};

/// Input for creating a device. The server assigns id, status and
/// last-seen time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDevice {
    pub label: String,
    pub kind: DeviceKind,
    #[serde(default)]
    pub ip: Option<IpAddr>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub mac: Option<MacAddress>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl NewDevice {
    pub fn new(label: impl Into<String>, kind: DeviceKind) -> Self {
        Self {
            label: label.into(),
            kind,
            ip: None,
            hostname: None,
            mac: None,
            tags: Vec::new(),
        }
    }

    pub(crate) fn validate(&self) -> Result<(), CoreError> {
        if self.label.trim().is_empty() {
            return Err(CoreError::validation("Device label must not be empty"));
        }
        Ok(())
    }
}

impl From<&NewDevice> for CreateDeviceRequest {
    fn from(d: &NewDevice) -> Self {
        CreateDeviceRequest {
            label: d.label.trim().to_owned(),
            device_type: d.kind.to_string(),
            ip: d.ip.map(|ip| ip.to_string()),
            hostname: d.hostname.clone(),
            mac: d.mac.as_ref().map(ToString::to_string),
            tags: d.tags.clone(),
        }
    }
}

/// Changed fields for an existing device. `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceUpdate {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub kind: Option<DeviceKind>,
    #[serde(default)]
    pub ip: Option<IpAddr>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub mac: Option<MacAddress>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

impl DeviceUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub(crate) fn validate(&self) -> Result<(), CoreError> {
        if self.is_empty() {
            return Err(CoreError::validation("Nothing to update"));
        }
        if self.label.as_deref().is_some_and(|l| l.trim().is_empty()) {
            return Err(CoreError::validation("Device label must not be empty"));
        }
        Ok(())
    }
}

impl From<&DeviceUpdate> for UpdateDeviceRequest {
    fn from(u: &DeviceUpdate) -> Self {
        UpdateDeviceRequest {
            label: u.label.as_deref().map(|l| l.trim().to_owned()),
            device_type: u.kind.map(|k| k.to_string()),
            ip: u.ip.map(|ip| ip.to_string()),
            hostname: u.hostname.clone(),
            mac: u.mac.as_ref().map(ToString::to_string),
            tags: u.tags.clone(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn new_device_maps_to_wire_body() {
        let mut device = NewDevice::new(" nas ", DeviceKind::Server);
        device.ip = Some("10.0.0.5".parse().unwrap());

        let body = serde_json::to_value(CreateDeviceRequest::from(&device)).unwrap();
        assert_eq!(
            body,
            json!({ "label": "nas", "type": "server", "ip": "10.0.0.5", "tags": [] })
        );
    }

    #[test]
    fn blank_label_is_rejected() {
        assert!(NewDevice::new("  ", DeviceKind::Other).validate().is_err());
        assert!(DeviceUpdate::default().validate().is_err());
    }
}
