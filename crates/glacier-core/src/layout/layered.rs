// Rank-based layered placement.
//
// 1. Cycles are broken by reversing DFS back edges (roots visited in
//    input order, so the result is deterministic).
// 2. Each node's rank is its longest path from any root.
// 3. Ranks are laid out top to bottom; nodes within a rank keep input
//    order and each rank is centered on the widest one.

use std::collections::VecDeque;

use indexmap::IndexSet;

use super::{LayoutConfig, LayoutEdge, LayoutError, LayoutStrategy};
use crate::model::{EntityId, Position};

#[derive(Debug, Clone, Default)]
pub struct LayeredLayout {
    config: LayoutConfig,
}

impl LayeredLayout {
    pub fn new(config: LayoutConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    /// Rank of every node, indexed like the input.
    pub fn ranks(&self, node_count: usize, edges: &[LayoutEdge]) -> Result<Vec<usize>, LayoutError> {
        let successors = adjacency(node_count, edges)?;
        let acyclic = break_cycles(&successors);
        Ok(longest_path_ranks(&acyclic))
    }
}

impl LayoutStrategy for LayeredLayout {
    fn layout(&self, nodes: &[EntityId], edges: &[LayoutEdge]) -> Result<Vec<Position>, LayoutError> {
        self.config.validate()?;
        let ranks = self.ranks(nodes.len(), edges)?;

        let depth = ranks.iter().max().map_or(0, |r| r + 1);
        let mut layers: Vec<Vec<usize>> = vec![Vec::new(); depth];
        for (node, &rank) in ranks.iter().enumerate() {
            layers[rank].push(node);
        }

        let LayoutConfig {
            node_width,
            node_height,
            rank_spacing,
            node_spacing,
        } = self.config;
        let span = |count: usize| {
            if count == 0 {
                0.0
            } else {
                to_f64(count) * node_width + to_f64(count - 1) * node_spacing
            }
        };
        let widest = span(layers.iter().map(Vec::len).max().unwrap_or(0));

        let mut positions = vec![Position::new(0.0, 0.0); nodes.len()];
        for (rank, layer) in layers.iter().enumerate() {
            let offset = (widest - span(layer.len())) / 2.0;
            let y = to_f64(rank) * (node_height + rank_spacing) + node_height / 2.0;
            for (slot, &node) in layer.iter().enumerate() {
                let x = offset + to_f64(slot) * (node_width + node_spacing) + node_width / 2.0;
                positions[node] = Position::new(x, y);
            }
        }
        Ok(positions)
    }
}

fn to_f64(n: usize) -> f64 {
    u32::try_from(n).map_or(f64::from(u32::MAX), f64::from)
}

/// Successor sets, deduplicated, self-loops dropped.
fn adjacency(node_count: usize, edges: &[LayoutEdge]) -> Result<Vec<IndexSet<usize>>, LayoutError> {
    let mut successors = vec![IndexSet::new(); node_count];
    for edge in edges {
        for index in [edge.source, edge.target] {
            if index >= node_count {
                return Err(LayoutError::UnknownNode {
                    index,
                    len: node_count,
                });
            }
        }
        if edge.source != edge.target {
            successors[edge.source].insert(edge.target);
        }
    }
    Ok(successors)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    New,
    Active,
    Done,
}

/// Reverse every edge that closes a cycle during an iterative DFS.
fn break_cycles(successors: &[IndexSet<usize>]) -> Vec<IndexSet<usize>> {
    let mut acyclic = vec![IndexSet::new(); successors.len()];
    let mut mark = vec![Mark::New; successors.len()];

    for root in 0..successors.len() {
        if mark[root] != Mark::New {
            continue;
        }
        mark[root] = Mark::Active;
        let mut stack = vec![(root, 0_usize)];

        while let Some(top) = stack.last_mut() {
            let (node, cursor) = *top;
            top.1 += 1;

            let Some(&next) = successors[node].get_index(cursor) else {
                mark[node] = Mark::Done;
                stack.pop();
                continue;
            };
            match mark[next] {
                Mark::Active => {
                    acyclic[next].insert(node);
                }
                Mark::Done => {
                    acyclic[node].insert(next);
                }
                Mark::New => {
                    acyclic[node].insert(next);
                    mark[next] = Mark::Active;
                    stack.push((next, 0));
                }
            }
        }
    }
    acyclic
}

/// Longest path from any root, via Kahn's algorithm in input order.
fn longest_path_ranks(successors: &[IndexSet<usize>]) -> Vec<usize> {
    let mut indegree = vec![0_usize; successors.len()];
    for targets in successors {
        for &target in targets {
            indegree[target] += 1;
        }
    }

    let mut queue: VecDeque<usize> = (0..successors.len()).filter(|&n| indegree[n] == 0).collect();
    let mut ranks = vec![0_usize; successors.len()];

    while let Some(node) = queue.pop_front() {
        for &target in &successors[node] {
            ranks[target] = ranks[target].max(ranks[node] + 1);
            indegree[target] -= 1;
            if indegree[target] == 0 {
                queue.push_back(target);
            }
        }
    }
    ranks
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ids(n: usize) -> Vec<EntityId> {
        (0..n).map(|i| EntityId::from(format!("n{i}"))).collect()
    }

    fn edges(pairs: &[(usize, usize)]) -> Vec<LayoutEdge> {
        pairs.iter().map(|&(s, t)| LayoutEdge::new(s, t)).collect()
    }

    #[test]
    fn ranks_follow_longest_path() {
        // 0 → 1 → 3, 0 → 3, 2 isolated
        let layout = LayeredLayout::default();
        let ranks = layout.ranks(4, &edges(&[(0, 1), (1, 3), (0, 3)])).unwrap();
        assert_eq!(ranks, vec![0, 1, 0, 2]);
    }

    #[test]
    fn cycles_are_broken_not_rejected() {
        let layout = LayeredLayout::default();
        let ranks = layout.ranks(3, &edges(&[(0, 1), (1, 2), (2, 0)])).unwrap();
        assert_eq!(ranks, vec![0, 1, 2]);
    }

    #[test]
    fn self_loops_and_duplicates_are_ignored() {
        let layout = LayeredLayout::default();
        let ranks = layout.ranks(2, &edges(&[(0, 0), (0, 1), (0, 1)])).unwrap();
        assert_eq!(ranks, vec![0, 1]);
    }

    #[test]
    fn unknown_node_is_an_error() {
        let layout = LayeredLayout::default();
        let err = layout.layout(&ids(2), &edges(&[(0, 5)])).unwrap_err();
        assert_eq!(err, LayoutError::UnknownNode { index: 5, len: 2 });
    }

    #[test]
    fn invalid_config_is_an_error() {
        let layout = LayeredLayout::new(LayoutConfig {
            node_width: 0.0,
            ..LayoutConfig::default()
        });
        assert!(matches!(
            layout.layout(&ids(1), &[]),
            Err(LayoutError::InvalidConfig(_))
        ));
    }

    #[test]
    fn ranks_are_centered_and_keep_input_order() {
        // router → {switch-a, switch-b}
        let layout = LayeredLayout::default();
        let positions = layout.layout(&ids(3), &edges(&[(0, 1), (0, 2)])).unwrap();

        // widest rank: 2 × 172 + 50 = 394; top rank centered
        assert_eq!(positions[0], Position::new(197.0, 18.0));
        assert_eq!(positions[1], Position::new(86.0, 154.0));
        assert_eq!(positions[2], Position::new(308.0, 154.0));
    }

    #[test]
    fn layout_is_deterministic() {
        let layout = LayeredLayout::default();
        let graph = edges(&[(3, 0), (0, 1), (1, 2), (2, 0), (4, 2)]);
        let first = layout.layout(&ids(5), &graph).unwrap();
        let second = layout.layout(&ids(5), &graph).unwrap();
        assert_eq!(first, second);
    }
}
