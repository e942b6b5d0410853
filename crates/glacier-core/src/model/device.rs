// ── Device domain types ──

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{AsRefStr, Display, EnumIter, EnumString};

use super::entity_id::{EntityId, MacAddress};

/// Device category. Unrecognized server values map to `Other`.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    AsRefStr,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum DeviceKind {
    Server,
    Workstation,
    Router,
    Switch,
    Firewall,
    #[default]
    Other,
}

/// Device operational status.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    AsRefStr,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum DeviceStatus {
    #[default]
    Online,
    Offline,
    Warning,
    Error,
}

impl DeviceStatus {
    pub fn is_online(self) -> bool {
        matches!(self, Self::Online)
    }

    /// The status a toggle switches to: online ↔ offline. Warning and
    /// error devices toggle back online.
    pub fn toggled(self) -> Self {
        match self {
            Self::Online => Self::Offline,
            Self::Offline | Self::Warning | Self::Error => Self::Online,
        }
    }
}

/// 2-D layout coordinate (node center).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// `(0, 0)` is a valid position; only non-finite coordinates are not.
    pub fn is_valid(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// A network device in the topology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: EntityId,
    pub label: String,
    pub kind: DeviceKind,
    pub ip: Option<IpAddr>,
    pub mac: Option<MacAddress>,
    pub hostname: Option<String>,
    pub last_seen: Option<DateTime<Utc>>,
    pub status: DeviceStatus,
    pub tags: Vec<String>,
    pub metadata: Option<Value>,
    pub is_ignored: bool,
    pub is_manually_added: bool,

    /// Client-side layout annotation; `None` until the layout engine runs.
    pub position: Option<Position>,
}

impl Device {
    pub fn has_position(&self) -> bool {
        self.position.is_some_and(|p| p.is_valid())
    }

    /// Merge the fields present in `changes`.
    pub fn apply_changes(&mut self, changes: &DeviceChanges) {
        if let Some(ref label) = changes.label {
            self.label.clone_from(label);
        }
        if let Some(kind) = changes.kind {
            self.kind = kind;
        }
        if let Some(ip) = changes.ip {
            self.ip = Some(ip);
        }
        if let Some(ref mac) = changes.mac {
            self.mac = Some(mac.clone());
        }
        if let Some(ref hostname) = changes.hostname {
            self.hostname = Some(hostname.clone());
        }
        if let Some(status) = changes.status {
            self.status = status;
        }
        if let Some(last_seen) = changes.last_seen {
            self.last_seen = Some(last_seen);
        }
        if let Some(ref tags) = changes.tags {
            self.tags.clone_from(tags);
        }
        if let Some(ref metadata) = changes.metadata {
            self.metadata = Some(metadata.clone());
        }
    }
}

/// Partial device update, as carried by `device_status_change` events.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceChanges {
    pub id: EntityId,
    pub label: Option<String>,
    pub kind: Option<DeviceKind>,
    pub ip: Option<IpAddr>,
    pub mac: Option<MacAddress>,
    pub hostname: Option<String>,
    pub status: Option<DeviceStatus>,
    pub last_seen: Option<DateTime<Utc>>,
    pub tags: Option<Vec<String>>,
    pub metadata: Option<Value>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("ONLINE".parse::<DeviceStatus>().unwrap(), DeviceStatus::Online);
        assert!("sleeping".parse::<DeviceStatus>().is_err());
    }

    #[test]
    fn toggle_flips_online_and_offline() {
        assert_eq!(DeviceStatus::Online.toggled(), DeviceStatus::Offline);
        assert_eq!(DeviceStatus::Offline.toggled(), DeviceStatus::Online);
        assert_eq!(DeviceStatus::Warning.toggled(), DeviceStatus::Online);
    }

    #[test]
    fn origin_is_a_valid_position() {
        assert!(Position::new(0.0, 0.0).is_valid());
        assert!(!Position::new(f64::NAN, 1.0).is_valid());
    }
}
