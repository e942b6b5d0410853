// ── Command API ──
//
// Every user-initiated operation flows through the `Command` enum. The
// command processor routes each variant to the inventory or the push
// channel and folds the authoritative result back into the store.

pub mod requests;

use crate::error::CoreError;
use crate::model::{Device, DeviceStatus, EntityId};

pub use requests::{DeviceUpdate, NewDevice};

/// A command plus the channel its result goes back on.
pub(crate) struct CommandEnvelope {
    pub command: Command,
    pub response_tx: tokio::sync::oneshot::Sender<Result<CommandResult, CoreError>>,
}

/// All operations a consumer can request.
#[derive(Debug, Clone)]
pub enum Command {
    // ── Device operations ────────────────────────────────────────────
    CreateDevice(NewDevice),
    UpdateDevice {
        id: EntityId,
        update: DeviceUpdate,
    },
    /// Flip online ↔ offline.
    ToggleStatus {
        id: EntityId,
    },
    SetStatus {
        id: EntityId,
        status: DeviceStatus,
    },
    RemoveDevice {
        id: EntityId,
    },
    /// Scan just this device's address. Requires a known IP.
    RescanDevice {
        id: EntityId,
    },
    IgnoreDevice {
        id: EntityId,
    },
    UnignoreDevice {
        id: EntityId,
    },

    // ── Scan operations ──────────────────────────────────────────────
    StartScan {
        ip_range: Option<String>,
    },
    /// Cancel the scan currently being tracked.
    CancelScan,
    /// Ask the server to clean up interrupted scans.
    CheckScanStatus,
}

impl Command {
    /// Whether the command mutates the device inventory.
    pub fn is_device_mutation(&self) -> bool {
        matches!(
            self,
            Self::CreateDevice(_)
                | Self::UpdateDevice { .. }
                | Self::ToggleStatus { .. }
                | Self::SetStatus { .. }
                | Self::RemoveDevice { .. }
                | Self::IgnoreDevice { .. }
                | Self::UnignoreDevice { .. }
        )
    }
}

/// Result of a command execution.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandResult {
    Ok,
    Device(Device),
    ScanStarted {
        scan_id: Option<String>,
        job_id: Option<String>,
    },
    Message(String),
}
