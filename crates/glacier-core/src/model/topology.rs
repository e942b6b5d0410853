// ── Topology aggregate ──
//
// Devices keyed by id in insertion order, plus the connection list and
// scan metadata. Mutations happen on a private copy inside the reducer;
// published topologies are never modified in place.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::connection::Connection;
use super::device::{Device, Position};
use super::entity_id::EntityId;
use super::scan::ScanDescriptor;

/// The set of known devices and the links between them at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    pub devices: IndexMap<EntityId, Device>,
    pub connections: Vec<Connection>,
    pub last_scan: Option<ScanDescriptor>,
    pub active_scan_in_progress: bool,
}

impl Topology {
    /// Build from a device list; later duplicates replace earlier ones
    /// in place.
    pub fn from_parts(devices: impl IntoIterator<Item = Device>, connections: Vec<Connection>) -> Self {
        let mut topology = Self {
            connections,
            ..Self::default()
        };
        for device in devices {
            topology.devices.insert(device.id.clone(), device);
        }
        topology
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn device(&self, id: &EntityId) -> Option<&Device> {
        self.devices.get(id)
    }

    /// Connections whose endpoints are both present. Dangling links may
    /// exist transiently while devices sync, but are never rendered.
    pub fn visible_connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections
            .iter()
            .filter(|c| self.devices.contains_key(&c.source) && self.devices.contains_key(&c.target))
    }

    /// True when any device lacks a valid position.
    pub fn needs_layout(&self) -> bool {
        self.devices.values().any(|d| !d.has_position())
    }

    // ── Mutations (reducer-internal) ─────────────────────────────────

    /// Insert or replace by id. A replaced device keeps its layout
    /// position when the incoming record carries none.
    pub(crate) fn upsert_device(&mut self, mut device: Device) {
        if device.position.is_none() {
            if let Some(existing) = self.devices.get(&device.id) {
                device.position = existing.position;
            }
        }
        self.devices.insert(device.id.clone(), device);
    }

    pub(crate) fn upsert_connection(&mut self, connection: Connection) {
        match self.connections.iter_mut().find(|c| c.same_link(&connection)) {
            Some(slot) => *slot = connection,
            None => self.connections.push(connection),
        }
    }

    /// Remove a device and every connection touching it.
    /// Returns whether the device was present.
    pub(crate) fn remove_device(&mut self, id: &EntityId) -> bool {
        let removed = self.devices.shift_remove(id).is_some();
        self.connections.retain(|c| !c.touches(id));
        removed
    }

    pub(crate) fn apply_positions(&mut self, positions: &[(EntityId, Position)]) {
        for (id, position) in positions {
            if let Some(device) = self.devices.get_mut(id) {
                device.position = Some(*position);
            }
        }
    }
}
