use std::sync::Arc;

use super::{LayeredLayout, LayoutConfig, LayoutEdge, LayoutStrategy};
use crate::model::{EntityId, Position, Topology};

/// Decides when a layout runs and shields callers from strategy failures.
///
/// Layout only runs when some device lacks a valid position; otherwise
/// existing positions are kept. A failing strategy leaves every node as
/// it was and logs a warning.
#[derive(Clone)]
pub struct LayoutEngine {
    strategy: Arc<dyn LayoutStrategy>,
}

impl LayoutEngine {
    pub fn new(strategy: Arc<dyn LayoutStrategy>) -> Self {
        Self { strategy }
    }

    /// The default rank-based engine.
    pub fn layered(config: LayoutConfig) -> Self {
        Self::new(Arc::new(LayeredLayout::new(config)))
    }

    /// Positions for every device, or `None` when no layout is needed or
    /// the strategy failed.
    pub fn compute(&self, topology: &Topology) -> Option<Vec<(EntityId, Position)>> {
        if !topology.needs_layout() {
            return None;
        }

        let nodes: Vec<EntityId> = topology.devices.keys().cloned().collect();
        let edges: Vec<LayoutEdge> = topology
            .visible_connections()
            .filter_map(|c| {
                Some(LayoutEdge::new(
                    topology.devices.get_index_of(&c.source)?,
                    topology.devices.get_index_of(&c.target)?,
                ))
            })
            .collect();

        match self.strategy.layout(&nodes, &edges) {
            Ok(positions) if positions.len() == nodes.len() => {
                tracing::debug!(nodes = nodes.len(), edges = edges.len(), "layout computed");
                Some(nodes.into_iter().zip(positions).collect())
            }
            Ok(positions) => {
                tracing::warn!(
                    expected = nodes.len(),
                    got = positions.len(),
                    "layout returned the wrong number of positions; leaving nodes unpositioned"
                );
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "layout failed; leaving nodes unpositioned");
                None
            }
        }
    }

    /// A copy of `topology` with layout positions applied.
    pub fn apply(&self, topology: &Topology) -> Topology {
        let mut laid_out = topology.clone();
        if let Some(positions) = self.compute(topology) {
            laid_out.apply_positions(&positions);
        }
        laid_out
    }
}

impl Default for LayoutEngine {
    fn default() -> Self {
        Self::layered(LayoutConfig::default())
    }
}

impl std::fmt::Debug for LayoutEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayoutEngine").finish_non_exhaustive()
    }
}
