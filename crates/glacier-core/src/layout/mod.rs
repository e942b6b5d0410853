// ── Layout ──
//
// Graph layout behind a swappable strategy. `LayeredLayout` is the
// default rank-based placement; `LayoutEngine` decides when a layout is
// needed and degrades to unpositioned nodes when a strategy fails.

mod engine;
mod layered;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{EntityId, Position};

pub use engine::LayoutEngine;
pub use layered::LayeredLayout;

/// A directed edge between two nodes, by index into the node slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayoutEdge {
    pub source: usize,
    pub target: usize,
}

impl LayoutEdge {
    pub fn new(source: usize, target: usize) -> Self {
        Self { source, target }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum LayoutError {
    #[error("edge references node {index} but only {len} nodes were given")]
    UnknownNode { index: usize, len: usize },

    #[error("invalid layout configuration: {0}")]
    InvalidConfig(String),
}

/// A graph layout algorithm.
///
/// Returns one position per node, in the order of `nodes`.
pub trait LayoutStrategy: Send + Sync {
    fn layout(&self, nodes: &[EntityId], edges: &[LayoutEdge]) -> Result<Vec<Position>, LayoutError>;
}

/// Node footprint and spacing for layered placement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayoutConfig {
    pub node_width: f64,
    pub node_height: f64,
    /// Vertical gap between ranks.
    pub rank_spacing: f64,
    /// Horizontal gap between nodes in one rank.
    pub node_spacing: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            node_width: 172.0,
            node_height: 36.0,
            rank_spacing: 100.0,
            node_spacing: 50.0,
        }
    }
}

impl LayoutConfig {
    pub fn validate(&self) -> Result<(), LayoutError> {
        let sizes = [("node_width", self.node_width), ("node_height", self.node_height)];
        for (name, value) in sizes {
            if !value.is_finite() || value <= 0.0 {
                return Err(LayoutError::InvalidConfig(format!("{name} must be positive, got {value}")));
            }
        }
        let gaps = [("rank_spacing", self.rank_spacing), ("node_spacing", self.node_spacing)];
        for (name, value) in gaps {
            if !value.is_finite() || value < 0.0 {
                return Err(LayoutError::InvalidConfig(format!("{name} must not be negative, got {value}")));
            }
        }
        Ok(())
    }
}
