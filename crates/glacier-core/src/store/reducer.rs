// ── Reducer ──
//
// `(state, event) -> state'`. Never mutates its input: the topology is
// copied, changed, and published as a new `Arc`.

use std::sync::Arc;

use crate::model::{Connection, Device, DeviceChanges, EntityId, Position, Topology};
use crate::store::GlacierState;

/// A change to the topology or selection.
#[derive(Debug, Clone, PartialEq)]
pub enum TopologyEvent {
    /// Authoritative full snapshot; replaces everything except layout
    /// positions of devices that are still present.
    Snapshot(Topology),
    /// Insert or replace a device by id.
    DeviceUpserted(Device),
    /// Merge fields into an existing device; no-op when the id is unknown.
    DevicePatched(DeviceChanges),
    /// Insert or replace a connection by id or `source→target`.
    ConnectionUpserted(Connection),
    /// Remove a device and its connections; clears a matching selection.
    DeviceRemoved(EntityId),
    PositionsApplied(Vec<(EntityId, Position)>),
    Selected(Option<EntityId>),
}

impl TopologyEvent {
    /// Whether the event changes devices or connections.
    pub fn touches_topology(&self) -> bool {
        !matches!(self, Self::Selected(_))
    }
}

/// Apply one event.
pub fn reduce(state: &GlacierState, event: &TopologyEvent) -> GlacierState {
    let mut next = state.clone();

    match event {
        TopologyEvent::Snapshot(topology) => {
            let mut topology = topology.clone();
            for device in topology.devices.values_mut() {
                if device.position.is_none() {
                    device.position = state.topology.device(&device.id).and_then(|d| d.position);
                }
            }
            next.topology = Arc::new(topology);
            if next
                .selection
                .as_ref()
                .is_some_and(|id| !next.topology.devices.contains_key(id))
            {
                next.selection = None;
            }
        }
        TopologyEvent::DeviceUpserted(device) => {
            let mut topology = (*state.topology).clone();
            topology.upsert_device(device.clone());
            next.topology = Arc::new(topology);
        }
        TopologyEvent::DevicePatched(changes) => {
            if !state.topology.devices.contains_key(&changes.id) {
                tracing::debug!(id = %changes.id, "status change for unknown device ignored");
                return next;
            }
            let mut topology = (*state.topology).clone();
            if let Some(device) = topology.devices.get_mut(&changes.id) {
                device.apply_changes(changes);
            }
            next.topology = Arc::new(topology);
        }
        TopologyEvent::ConnectionUpserted(connection) => {
            let mut topology = (*state.topology).clone();
            topology.upsert_connection(connection.clone());
            next.topology = Arc::new(topology);
        }
        TopologyEvent::DeviceRemoved(id) => {
            let mut topology = (*state.topology).clone();
            topology.remove_device(id);
            next.topology = Arc::new(topology);
            if next.selection.as_ref() == Some(id) {
                next.selection = None;
            }
        }
        TopologyEvent::PositionsApplied(positions) => {
            let mut topology = (*state.topology).clone();
            topology.apply_positions(positions);
            next.topology = Arc::new(topology);
        }
        TopologyEvent::Selected(selection) => {
            next.selection = selection
                .clone()
                .filter(|id| state.topology.devices.contains_key(id));
        }
    }
    next
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{DeviceKind, DeviceStatus};
    use pretty_assertions::assert_eq;

    fn device(id: &str) -> Device {
        Device {
            id: id.into(),
            label: format!("dev-{id}"),
            kind: DeviceKind::Workstation,
            ip: None,
            mac: None,
            hostname: None,
            last_seen: None,
            status: DeviceStatus::Online,
            tags: Vec::new(),
            metadata: None,
            is_ignored: false,
            is_manually_added: false,
            position: None,
        }
    }

    fn apply_all(state: GlacierState, events: &[TopologyEvent]) -> GlacierState {
        events.iter().fold(state, |s, e| reduce(&s, e))
    }

    #[test]
    fn new_device_upsert_is_idempotent() {
        let event = TopologyEvent::DeviceUpserted(device("a"));
        let once = reduce(&GlacierState::default(), &event);
        let twice = reduce(&once, &event);

        assert_eq!(twice.topology, once.topology);
        assert_eq!(twice.topology.devices.len(), 1);
    }

    #[test]
    fn snapshot_supersedes_incrementals() {
        let state = apply_all(
            GlacierState::default(),
            &[
                TopologyEvent::DeviceUpserted(device("a")),
                TopologyEvent::ConnectionUpserted(Connection::new("a", "b")),
            ],
        );
        let authoritative = Topology::from_parts([device("z")], Vec::new());
        let state = reduce(&state, &TopologyEvent::Snapshot(authoritative.clone()));

        assert_eq!(*state.topology, authoritative);
    }

    #[test]
    fn patch_for_unknown_device_changes_nothing() {
        let state = reduce(
            &GlacierState::default(),
            &TopologyEvent::DeviceUpserted(device("a")),
        );
        let next = reduce(
            &state,
            &TopologyEvent::DevicePatched(DeviceChanges {
                id: "ghost".into(),
                status: Some(DeviceStatus::Offline),
                ..DeviceChanges::default()
            }),
        );

        assert!(Arc::ptr_eq(&state.topology, &next.topology));
    }

    #[test]
    fn patch_merges_present_fields() {
        let state = reduce(
            &GlacierState::default(),
            &TopologyEvent::DeviceUpserted(device("a")),
        );
        let next = reduce(
            &state,
            &TopologyEvent::DevicePatched(DeviceChanges {
                id: "a".into(),
                status: Some(DeviceStatus::Error),
                ..DeviceChanges::default()
            }),
        );

        let patched = next.topology.device(&"a".into()).unwrap();
        assert_eq!(patched.status, DeviceStatus::Error);
        assert_eq!(patched.label, "dev-a");
    }

    #[test]
    fn remove_cascades_and_clears_selection() {
        let mut state = GlacierState::default();
        state.topology = Arc::new(Topology::from_parts(
            [device("a"), device("b"), device("c")],
            vec![
                Connection::new("a", "b"),
                Connection::new("c", "a"),
                Connection::new("b", "c"),
            ],
        ));
        let state = reduce(&state, &TopologyEvent::Selected(Some("a".into())));
        assert_eq!(state.selection, Some("a".into()));
        assert_eq!(state.selected_device().map(|d| d.id.as_str()), Some("a"));

        let state = reduce(&state, &TopologyEvent::DeviceRemoved("a".into()));

        assert!(state.topology.device(&"a".into()).is_none());
        assert_eq!(state.topology.connections, vec![Connection::new("b", "c")]);
        assert_eq!(state.selection, None);
        assert!(state.selected_device().is_none());
    }

    #[test]
    fn upsert_keeps_existing_position() {
        let mut placed = device("a");
        placed.position = Some(Position::new(10.0, 20.0));
        let state = reduce(&GlacierState::default(), &TopologyEvent::DeviceUpserted(placed));

        let mut renamed = device("a");
        renamed.label = "renamed".into();
        let state = reduce(&state, &TopologyEvent::DeviceUpserted(renamed));

        let stored = state.topology.device(&"a".into()).unwrap();
        assert_eq!(stored.label, "renamed");
        assert_eq!(stored.position, Some(Position::new(10.0, 20.0)));
    }

    #[test]
    fn connection_upsert_matches_endpoints() {
        let mut updated = Connection::new("a", "b");
        updated.latency = Some(3.5);
        let state = apply_all(
            GlacierState::default(),
            &[
                TopologyEvent::ConnectionUpserted(Connection::new("a", "b")),
                TopologyEvent::ConnectionUpserted(updated.clone()),
            ],
        );

        assert_eq!(state.topology.connections, vec![updated]);
    }

    #[test]
    fn snapshot_keeps_positions_of_surviving_devices() {
        let mut placed = device("a");
        placed.position = Some(Position::new(5.0, 5.0));
        let state = reduce(&GlacierState::default(), &TopologyEvent::DeviceUpserted(placed));

        let state = reduce(
            &state,
            &TopologyEvent::Snapshot(Topology::from_parts([device("a"), device("b")], Vec::new())),
        );

        assert_eq!(
            state.topology.device(&"a".into()).unwrap().position,
            Some(Position::new(5.0, 5.0))
        );
        assert_eq!(state.topology.device(&"b".into()).unwrap().position, None);
    }

    #[test]
    fn selecting_unknown_device_clears_selection() {
        let state = reduce(
            &GlacierState::default(),
            &TopologyEvent::Selected(Some("ghost".into())),
        );
        assert_eq!(state.selection, None);
    }
}
