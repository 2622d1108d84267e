//! All-pairs shortest transit times over the topology
//!
//! `PathMatrix` runs Floyd-Warshall over a dense index of the nodes present
//! at build time. `RoutingTable` keeps two of them: a live one weighted by the
//! congestion-aware transit time of each edge, rebuilt every tick, and a
//! congestion-free one used only for the travel time baseline of a vehicle.

use anyhow::{Context, Result};
use std::collections::HashMap;

use super::road_network::SimRoadNetwork;
use super::types::{EdgeId, NodeId, SimEdge};

/// Cost standing for "no connection"; large but finite so sums never overflow
pub const NO_CONNECTION: f64 = 1e15;

/// Shortest time and predecessor matrices for one edge weighting
#[derive(Debug, Clone, Default)]
pub struct PathMatrix {
    /// Node handle for each dense index
    nodes: Vec<NodeId>,
    /// Dense index for each node handle
    index: HashMap<NodeId, usize>,
    /// Row-major `time[i * n + j]`
    time: Vec<f64>,
    /// Row-major predecessor of `j` on the shortest path from `i`
    prev: Vec<Option<usize>>,
    /// Cheapest direct edge between two nodes, if any
    direct: Vec<Option<EdgeId>>,
}

impl PathMatrix {
    /// Builds the matrices using `weight` as the cost of each edge
    pub fn build(network: &SimRoadNetwork, weight: impl Fn(&SimEdge) -> f64) -> Self {
        let nodes: Vec<NodeId> = network.node_ids().collect();
        let index: HashMap<NodeId, usize> =
            nodes.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        let n = nodes.len();

        let mut time = vec![NO_CONNECTION; n * n];
        let mut prev = vec![None; n * n];
        let mut direct = vec![None; n * n];

        for i in 0..n {
            time[i * n + i] = 0.0;
        }

        // Adjacency: keep the cheapest of parallel edges
        for edge_id in network.edge_ids() {
            let Some(edge) = network.edge(edge_id) else {
                continue;
            };
            let (Some(&i), Some(&j)) = (index.get(&edge.begin), index.get(&edge.end)) else {
                continue;
            };
            let cost = weight(edge);
            if cost < time[i * n + j] {
                time[i * n + j] = cost;
                prev[i * n + j] = Some(i);
                direct[i * n + j] = Some(edge_id);
            }
        }

        for k in 0..n {
            for i in 0..n {
                let ik = time[i * n + k];
                if ik >= NO_CONNECTION {
                    continue;
                }
                for j in 0..n {
                    let kj = time[k * n + j];
                    if kj >= NO_CONNECTION {
                        continue;
                    }
                    let through = ik + kj;
                    if through < time[i * n + j] {
                        time[i * n + j] = through;
                        prev[i * n + j] = prev[k * n + j];
                    }
                }
            }
        }

        Self {
            nodes,
            index,
            time,
            prev,
            direct,
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Node handles in dense index order
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// Dense index of a node; fails for handles not present at build time
    pub fn index_of(&self, node: NodeId) -> Result<usize> {
        self.index
            .get(&node)
            .copied()
            .with_context(|| format!("Node {:?} is not indexed by the routing table", node))
    }

    /// Shortest time between two nodes, `NO_CONNECTION` if unreachable
    pub fn time(&self, from: NodeId, to: NodeId) -> Result<f64> {
        let i = self.index_of(from)?;
        let j = self.index_of(to)?;
        Ok(self.time[i * self.nodes.len() + j])
    }

    /// Shortest time between two dense indices
    pub fn time_at(&self, i: usize, j: usize) -> f64 {
        self.time[i * self.nodes.len() + j]
    }

    pub fn is_reachable(&self, from: NodeId, to: NodeId) -> Result<bool> {
        Ok(self.time(from, to)? < NO_CONNECTION)
    }

    /// First edge of the shortest path from `from` to `to`
    ///
    /// Walks the predecessor row of `from` backwards from `to` until the node
    /// right after `from` is found. `None` when unreachable or `from == to`.
    pub fn next_edge(&self, from: NodeId, to: NodeId) -> Result<Option<EdgeId>> {
        let n = self.nodes.len();
        let i = self.index_of(from)?;
        let j = self.index_of(to)?;
        if i == j || self.time[i * n + j] >= NO_CONNECTION {
            return Ok(None);
        }

        let mut p = j;
        for _ in 0..n {
            match self.prev[i * n + p] {
                Some(q) if q == i => return Ok(self.direct[i * n + p]),
                Some(q) => p = q,
                None => return Ok(None),
            }
        }
        anyhow::bail!("Predecessor chain from {:?} to {:?} does not terminate", from, to)
    }
}

/// Live and congestion-free routing matrices
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    live: PathMatrix,
    free: PathMatrix,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds both matrices; required after every topology edit
    pub fn rebuild_all(&mut self, network: &SimRoadNetwork) {
        self.free = PathMatrix::build(network, SimEdge::free_transit_time);
        self.rebuild(network);
    }

    /// Rebuilds the congestion-aware matrix from the current edge estimates
    pub fn rebuild(&mut self, network: &SimRoadNetwork) {
        self.live = PathMatrix::build(network, |edge| edge.transit_time);
    }

    /// Next edge to take from `from` towards `to` under current congestion
    pub fn find_next_edge(&self, from: NodeId, to: NodeId) -> Result<Option<EdgeId>> {
        self.live.next_edge(from, to)
    }

    /// Congestion-free travel time between two nodes
    pub fn expected_time(&self, from: NodeId, to: NodeId) -> Result<f64> {
        self.free.time(from, to)
    }

    /// Congestion-aware travel time between two nodes
    pub fn transit_time(&self, from: NodeId, to: NodeId) -> Result<f64> {
        self.live.time(from, to)
    }

    pub fn live(&self) -> &PathMatrix {
        &self.live
    }

    pub fn free(&self) -> &PathMatrix {
        &self.free
    }
}
