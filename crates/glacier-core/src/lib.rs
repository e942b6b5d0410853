//! Topology engine between `glacier-api` and presentation consumers.
//!
//! - **[`Glacier`]**: the module handle. [`activate()`](Glacier::activate)
//!   issues the initial snapshot fetch, connects the push channel and spawns
//!   the sync task and command processor; [`deactivate()`](Glacier::deactivate)
//!   tears them down.
//!
//! - **[`TopologyStore`]**: a `watch` channel of [`GlacierState`], replaced
//!   wholesale by the pure [`reduce`] function. Only the sync task writes it,
//!   so fetch results, push events and command results never interleave.
//!
//! - **[`LayoutEngine`]**: layered placement behind the [`LayoutStrategy`]
//!   seam, recomputed only when some device lacks a position.
//!
//! - **[`ScanLifecycle`]**: the discovery-scan state machine, including
//!   stale scans left over from a server restart.
//!
//! - **[`Command`]**: device and scan operations, routed to the REST
//!   inventory or the push channel and folded back into the store.

pub mod backend;
pub mod command;
pub mod config;
pub mod controller;
pub mod convert;
pub mod error;
pub mod layout;
pub mod model;
pub mod scan;
pub mod store;
pub mod stream;
mod sync;

// ── Primary re-exports ──────────────────────────────────────────────
pub use backend::{Backends, DeviceInventory, PushTransport, TopologySource};
pub use command::{Command, CommandResult, DeviceUpdate, NewDevice};
pub use config::{GlacierConfig, PushSettings, TlsVerification};
pub use controller::Glacier;
pub use error::CoreError;
pub use layout::{
    LayeredLayout, LayoutConfig, LayoutEdge, LayoutEngine, LayoutError, LayoutStrategy,
};
pub use scan::{ActiveScan, ScanLifecycle, ScanOutcome, ScanPhase};
pub use store::{GlacierState, TopologyEvent, TopologyStore, reduce};
pub use stream::{StateStream, ViewFilter, visible_devices};

pub use glacier_api::PushState;

pub use model::{
    Connection, ConnectionKind, ConnectionStatus, Device, DeviceChanges, DeviceKind, DeviceStatus,
    EntityId, MacAddress, Position, ScanDescriptor, ScanStatus, Topology,
};
