// ── Domain model ──
//
// Canonical representation of the topology. Wire records from
// glacier-api are converted into these types in `convert.rs`.

pub mod connection;
pub mod device;
pub mod entity_id;
pub mod scan;
pub mod topology;

pub use connection::{Connection, ConnectionKind, ConnectionStatus};
pub use device::{Device, DeviceChanges, DeviceKind, DeviceStatus, Position};
pub use entity_id::{EntityId, MacAddress};
pub use scan::{ScanDescriptor, ScanStatus};
pub use topology::Topology;
