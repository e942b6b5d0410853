// ── View filter ──
//
// Search and filter predicates applied to a topology snapshot without
// touching the store.

use crate::model::{Device, DeviceKind, DeviceStatus, Topology};

/// Free-text search plus optional status and category filters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewFilter {
    /// Case-insensitive substring over label, ip, hostname, mac and tags.
    pub search: Option<String>,
    pub status: Option<DeviceStatus>,
    pub kind: Option<DeviceKind>,
}

impl ViewFilter {
    pub fn is_empty(&self) -> bool {
        self.search.as_deref().is_none_or(|s| s.trim().is_empty())
            && self.status.is_none()
            && self.kind.is_none()
    }

    pub fn matches(&self, device: &Device) -> bool {
        if self.status.is_some_and(|s| s != device.status) {
            return false;
        }
        if self.kind.is_some_and(|k| k != device.kind) {
            return false;
        }
        match self.search.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(needle) => {
                let needle = needle.to_lowercase();
                let hit = |haystack: &str| haystack.to_lowercase().contains(&needle);
                hit(&device.label)
                    || device.ip.is_some_and(|ip| hit(&ip.to_string()))
                    || device.hostname.as_deref().is_some_and(hit)
                    || device.mac.as_ref().is_some_and(|m| hit(m.as_str()))
                    || device.tags.iter().any(|t| hit(t))
            }
        }
    }
}

/// Devices passing `filter`, in store order.
pub fn visible_devices<'a>(topology: &'a Topology, filter: &ViewFilter) -> Vec<&'a Device> {
    topology.devices.values().filter(|d| filter.matches(d)).collect()
}
