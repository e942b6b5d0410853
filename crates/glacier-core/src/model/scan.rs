// ── Scan descriptor ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr, EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum ScanStatus {
    InProgress,
    Completed,
    Failed,
}

/// Metadata about the most recent discovery scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanDescriptor {
    pub id: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub status: Option<ScanStatus>,
    pub discovered_devices: u32,
    /// Seconds.
    pub duration: Option<f64>,
    /// Reported in-progress by a server process that may no longer be alive.
    pub is_stale: bool,
    pub error_message: Option<String>,
}

impl ScanDescriptor {
    /// Whether this descriptor reports a finished scan (completed or failed).
    pub fn is_finished(&self) -> bool {
        matches!(self.status, Some(ScanStatus::Completed | ScanStatus::Failed))
    }
}
