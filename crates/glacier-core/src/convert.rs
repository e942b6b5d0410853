// ── API-to-domain type conversions ──
//
// Bridges raw `glacier_api` records into canonical `glacier_core::model`
// types. Each `From` impl parses strings into strong types and fills
// defaults for missing optional data; unparseable values are dropped
// rather than failing the whole snapshot.

use std::net::IpAddr;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};

use glacier_api::{
    ConnectionRecord, DevicePatch, DeviceRecord, NetworkUpdate, ScanRecord, TopologyPayload,
};

use crate::model::{
    Connection, ConnectionKind, ConnectionStatus, Device, DeviceChanges, DeviceKind,
    DeviceStatus, EntityId, MacAddress, ScanDescriptor, ScanStatus, Topology,
};
use crate::store::TopologyEvent;

// ── Helpers ────────────────────────────────────────────────────────

fn parse_ip(raw: Option<&str>) -> Option<IpAddr> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse().ok())
}

fn parse_mac(raw: Option<&str>) -> Option<MacAddress> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(MacAddress::new)
}

/// Parse an ISO-8601 timestamp. Offset-less values are taken as UTC.
pub(crate) fn parse_datetime(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn parse_or_default<T: FromStr + Default>(raw: Option<&str>, field: &'static str) -> T {
    match raw {
        Some(s) => s.parse().unwrap_or_else(|_| {
            tracing::debug!(field, value = s, "unrecognized value, using default");
            T::default()
        }),
        None => T::default(),
    }
}

fn non_empty(raw: Option<String>) -> Option<String> {
    raw.filter(|s| !s.trim().is_empty())
}

// ── Devices ────────────────────────────────────────────────────────

impl From<DeviceRecord> for Device {
    fn from(r: DeviceRecord) -> Self {
        Device {
            id: EntityId::from(r.id),
            label: r.label,
            kind: parse_or_default::<DeviceKind>(r.device_type.as_deref(), "type"),
            ip: parse_ip(r.ip.as_deref()),
            mac: parse_mac(r.mac.as_deref()),
            hostname: non_empty(r.hostname),
            last_seen: parse_datetime(r.last_seen.as_deref()),
            status: parse_or_default::<DeviceStatus>(r.status.as_deref(), "status"),
            tags: r.tags.unwrap_or_default(),
            metadata: r.metadata.filter(|v| !v.is_null()),
            is_ignored: r.is_ignored,
            is_manually_added: r.is_manually_added,
            position: None,
        }
    }
}

impl From<DevicePatch> for DeviceChanges {
    fn from(p: DevicePatch) -> Self {
        DeviceChanges {
            id: EntityId::from(p.id),
            label: p.label,
            kind: p.device_type.as_deref().and_then(|s| s.parse().ok()),
            ip: parse_ip(p.ip.as_deref()),
            mac: parse_mac(p.mac.as_deref()),
            hostname: non_empty(p.hostname),
            status: p.status.as_deref().and_then(|s| s.parse().ok()),
            last_seen: parse_datetime(p.last_seen.as_deref()),
            tags: p.tags,
            metadata: p.metadata,
        }
    }
}

// ── Connections ────────────────────────────────────────────────────

impl From<ConnectionRecord> for Connection {
    fn from(r: ConnectionRecord) -> Self {
        Connection {
            id: non_empty(r.id).map(EntityId::from),
            source: EntityId::from(r.source),
            target: EntityId::from(r.target),
            status: parse_or_default::<ConnectionStatus>(r.status.as_deref(), "status"),
            kind: r
                .connection_type
                .as_deref()
                .map(|s| s.parse().unwrap_or(ConnectionKind::Other)),
            label: non_empty(r.label),
            bandwidth: r.bandwidth,
            latency: r.latency,
            packet_loss: r.packet_loss,
            traffic: r.traffic,
            metadata: r.metadata.filter(|v| !v.is_null()),
        }
    }
}

// ── Scans ──────────────────────────────────────────────────────────

impl From<ScanRecord> for ScanDescriptor {
    fn from(r: ScanRecord) -> Self {
        ScanDescriptor {
            id: non_empty(r.id),
            timestamp: parse_datetime(r.timestamp.as_deref()),
            status: r.status.as_deref().and_then(|s| s.parse::<ScanStatus>().ok()),
            discovered_devices: r.discovered_devices,
            duration: r.duration,
            is_stale: r.is_stale,
            error_message: non_empty(r.error_message),
        }
    }
}

// ── Topology ───────────────────────────────────────────────────────

impl From<TopologyPayload> for Topology {
    fn from(p: TopologyPayload) -> Self {
        let devices = p.devices.into_iter().filter_map(|record| {
            if record.id.is_empty() {
                tracing::warn!(label = %record.label, "dropping device without id from snapshot");
                None
            } else {
                Some(Device::from(record))
            }
        });
        let connections = p.connections.into_iter().map(Connection::from).collect();
        let mut topology = Topology::from_parts(devices, connections);
        topology.last_scan = p.last_scan.map(ScanDescriptor::from);
        topology.active_scan_in_progress = p.active_scan_in_progress;
        topology
    }
}

// ── Push updates ───────────────────────────────────────────────────

impl From<NetworkUpdate> for TopologyEvent {
    fn from(update: NetworkUpdate) -> Self {
        match update {
            NetworkUpdate::NewDevice(record) => TopologyEvent::DeviceUpserted(record.into()),
            NetworkUpdate::DeviceStatusChange(patch) => TopologyEvent::DevicePatched(patch.into()),
            NetworkUpdate::NewConnection(record) => TopologyEvent::ConnectionUpserted(record.into()),
        }
    }
}
