// ── Connection domain types ──

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{AsRefStr, Display, EnumString};

use super::entity_id::EntityId;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ConnectionStatus {
    #[default]
    Active,
    Inactive,
    Warning,
    Error,
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ConnectionKind {
    Wired,
    Wireless,
    Vpn,
    #[default]
    Other,
}

/// A directed link between two devices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    /// Server id, when the server assigned one.
    pub id: Option<EntityId>,
    pub source: EntityId,
    pub target: EntityId,
    pub status: ConnectionStatus,
    pub kind: Option<ConnectionKind>,
    pub label: Option<String>,
    pub bandwidth: Option<f64>,
    pub latency: Option<f64>,
    pub packet_loss: Option<f64>,
    pub traffic: Option<f64>,
    pub metadata: Option<Value>,
}

impl Connection {
    pub fn new(source: impl Into<EntityId>, target: impl Into<EntityId>) -> Self {
        Self {
            id: None,
            source: source.into(),
            target: target.into(),
            status: ConnectionStatus::default(),
            kind: None,
            label: None,
            bandwidth: None,
            latency: None,
            packet_loss: None,
            traffic: None,
            metadata: None,
        }
    }

    /// Derived identity: `source→target`.
    pub fn key(&self) -> (&EntityId, &EntityId) {
        (&self.source, &self.target)
    }

    /// Two connections are the same link when their server ids match or,
    /// failing that, when they join the same ordered pair of devices.
    pub fn same_link(&self, other: &Self) -> bool {
        match (&self.id, &other.id) {
            (Some(a), Some(b)) if a == b => true,
            _ => self.key() == other.key(),
        }
    }

    pub fn touches(&self, device: &EntityId) -> bool {
        &self.source == device || &self.target == device
    }
}
