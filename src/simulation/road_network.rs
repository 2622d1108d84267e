//! Topology arena: nodes, directed edges and the vehicles queued on them
//!
//! Nodes and edges live in a petgraph `StableDiGraph`, so handles stay valid
//! across removals of unrelated elements. Every handle carries a serial that
//! is checked on lookup, so a handle to a removed element never resolves to
//! whatever later takes over its slot.

use anyhow::{Context, Result};
use log::debug;
use ordered_float::OrderedFloat;
use petgraph::stable_graph::StableDiGraph;
use std::collections::HashMap;

use super::config::SimConfig;
use super::types::{EdgeId, NodeId, NodeKind, Position, SimEdge, SimNode, VehicleId};

/// Standalone road network graph
#[derive(Default)]
pub struct SimRoadNetwork {
    /// The underlying directed graph (one-way edges)
    graph: StableDiGraph<SimNode, SimEdge>,

    /// Maps node names to their handles, rebuilt on every topology change
    names: HashMap<String, NodeId>,

    /// Serial handed to the next node or edge
    next_serial: u64,
}

impl SimRoadNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node with a unique name
    pub fn add_node(&mut self, name: &str, position: Position, kind: NodeKind) -> Result<NodeId> {
        if self.names.contains_key(name) {
            anyhow::bail!("Node named {:?} already exists", name);
        }
        let serial = self.issue_serial();
        let index = self.graph.add_node(SimNode {
            name: name.to_string(),
            position,
            kind,
            serial,
        });
        let id = NodeId { index, serial };
        self.rebuild_names();
        debug!("Added {:?} node {} as {:?}", kind, name, id);
        Ok(id)
    }

    /// Adds a directed edge, deriving its length from the endpoint positions
    pub fn add_edge(
        &mut self,
        begin: NodeId,
        end: NodeId,
        speed_limit: f64,
        priority: i32,
    ) -> Result<EdgeId> {
        if begin == end {
            anyhow::bail!("Edge must connect two distinct nodes");
        }
        if !(speed_limit.is_finite() && speed_limit > 0.0) {
            anyhow::bail!("Speed limit must be positive, got {}", speed_limit);
        }
        let begin_pos = self.node(begin).context("Begin node not found")?.position;
        let end_pos = self.node(end).context("End node not found")?.position;
        if begin_pos.distance(&end_pos) <= 0.0 {
            anyhow::bail!("Edge endpoints share the same location");
        }

        let serial = self.issue_serial();
        let edge = SimEdge::new(begin, end, &begin_pos, &end_pos, speed_limit, priority, serial);
        let index = self.graph.add_edge(begin.index, end.index, edge);
        Ok(EdgeId { index, serial })
    }

    fn issue_serial(&mut self) -> u64 {
        let serial = self.next_serial;
        self.next_serial += 1;
        serial
    }

    /// Removes an edge and returns the vehicles that were on it
    pub fn remove_edge(&mut self, edge_id: EdgeId) -> Result<Vec<VehicleId>> {
        if self.edge(edge_id).is_none() {
            anyhow::bail!("Edge {:?} not found", edge_id);
        }
        let edge = self
            .graph
            .remove_edge(edge_id.index)
            .context("Edge not found")?;
        Ok(edge.queue.iter().map(|(_, id)| *id).collect())
    }

    /// Removes a node and all incident edges
    /// Returns (removed_edge_ids, vehicles_on_removed_edges)
    pub fn remove_node(&mut self, node_id: NodeId) -> Result<(Vec<EdgeId>, Vec<VehicleId>)> {
        if self.node(node_id).is_none() {
            anyhow::bail!("Node {:?} not found", node_id);
        }

        let incident: Vec<EdgeId> = self
            .edge_ids()
            .filter(|id| {
                self.edge(*id)
                    .is_some_and(|e| e.begin == node_id || e.end == node_id)
            })
            .collect();

        let mut vehicles = Vec::new();
        for edge_id in &incident {
            vehicles.extend(self.remove_edge(*edge_id)?);
        }

        self.graph.remove_node(node_id.index);
        self.rebuild_names();
        Ok((incident, vehicles))
    }

    fn rebuild_names(&mut self) {
        self.names = self
            .graph
            .node_indices()
            .filter_map(|index| {
                self.graph.node_weight(index).map(|node| {
                    let id = NodeId {
                        index,
                        serial: node.serial,
                    };
                    (node.name.clone(), id)
                })
            })
            .collect();
    }

    /// Node behind a handle; `None` once the node is removed
    pub fn node(&self, node_id: NodeId) -> Option<&SimNode> {
        self.graph
            .node_weight(node_id.index)
            .filter(|node| node.serial == node_id.serial)
    }

    pub fn edge(&self, edge_id: EdgeId) -> Option<&SimEdge> {
        self.graph
            .edge_weight(edge_id.index)
            .filter(|edge| edge.serial == edge_id.serial)
    }

    pub fn edge_mut(&mut self, edge_id: EdgeId) -> Option<&mut SimEdge> {
        self.graph
            .edge_weight_mut(edge_id.index)
            .filter(|edge| edge.serial == edge_id.serial)
    }

    /// Looks a node up by name
    pub fn find_node(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied()
    }

    /// All node handles in ascending handle order
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.graph.node_indices().filter_map(|index| {
            let serial = self.graph.node_weight(index)?.serial;
            Some(NodeId { index, serial })
        })
    }

    /// All edge handles in ascending handle order
    pub fn edge_ids(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.graph.edge_indices().filter_map(|index| {
            let serial = self.graph.edge_weight(index)?.serial;
            Some(EdgeId { index, serial })
        })
    }

    /// Handles of every site node
    pub fn sites(&self) -> Vec<NodeId> {
        self.node_ids()
            .filter(|id| self.node(*id).is_some_and(SimNode::is_site))
            .collect()
    }

    pub fn site_count(&self) -> usize {
        self.sites().len()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Finds an edge from `begin` to `end`, if one exists
    pub fn find_edge_between(&self, begin: NodeId, end: NodeId) -> Option<EdgeId> {
        self.node(begin)?;
        self.node(end)?;
        let index = self.graph.find_edge(begin.index, end.index)?;
        let serial = self.graph.edge_weight(index)?.serial;
        Some(EdgeId { index, serial })
    }

    /// Puts a vehicle on an edge at the given distance
    pub fn place_vehicle(&mut self, edge_id: EdgeId, vehicle: VehicleId, distance: f64) -> Result<()> {
        let edge = self.edge_mut(edge_id).context("Edge not found")?;
        edge.queue.insert((OrderedFloat(distance), vehicle));
        Ok(())
    }

    /// Updates a vehicle position within an edge queue
    pub fn move_vehicle(
        &mut self,
        edge_id: EdgeId,
        vehicle: VehicleId,
        from: f64,
        to: f64,
    ) -> Result<()> {
        let edge = self.edge_mut(edge_id).context("Edge not found")?;
        edge.queue
            .remove_item(&(OrderedFloat(from), vehicle))
            .context("Vehicle not queued at the expected distance")?;
        edge.queue.insert((OrderedFloat(to), vehicle));
        Ok(())
    }

    /// Takes a vehicle off an edge
    pub fn remove_vehicle(&mut self, edge_id: EdgeId, vehicle: VehicleId, distance: f64) -> Result<()> {
        let edge = self.edge_mut(edge_id).context("Edge not found")?;
        if edge
            .queue
            .remove_item(&(OrderedFloat(distance), vehicle))
            .is_none()
        {
            // Fall back to a scan when the recorded distance drifted
            edge.queue.retain(|(_, id)| *id != vehicle);
        }
        Ok(())
    }

    /// Whether a new vehicle can enter the edge at distance 0
    pub fn is_entry_blocked(&self, edge_id: EdgeId, config: &SimConfig) -> Result<bool> {
        let edge = self.edge(edge_id).context("Edge not found")?;
        Ok(edge
            .tail()
            .is_some_and(|(distance, _)| distance < config.vehicle_length))
    }

    /// Speed a vehicle can sustain given the current density on the edge
    pub fn achievable_speed(edge: &SimEdge, config: &SimConfig) -> f64 {
        let count = edge.vehicle_count();
        if count == 0 {
            return edge.speed_limit;
        }
        let gap = edge.length / count as f64;
        config.following_speed(gap).min(edge.speed_limit)
    }

    /// Normalized congestion of an edge in [0, 1]
    pub fn traffic_level(edge: &SimEdge, config: &SimConfig) -> f64 {
        (1.0 - Self::achievable_speed(edge, config) / edge.speed_limit).max(0.0)
    }

    /// Recomputes every edge's congestion-aware transit time
    pub fn refresh_transit_times(&mut self, config: &SimConfig) {
        let edge_ids: Vec<EdgeId> = self.edge_ids().collect();
        for edge_id in edge_ids {
            if let Some(edge) = self.edge_mut(edge_id) {
                let speed = Self::achievable_speed(edge, config).max(config.min_speed);
                edge.transit_time = edge.length / speed;
            }
        }
    }

    /// Traffic level of every edge
    pub fn traffic_levels(&self, config: &SimConfig) -> Vec<(EdgeId, f64)> {
        self.edge_ids()
            .filter_map(|id| {
                self.edge(id)
                    .map(|edge| (id, Self::traffic_level(edge, config)))
            })
            .collect()
    }

    /// Location and heading of a point `distance` meters along an edge
    pub fn point_on_edge(&self, edge_id: EdgeId, distance: f64) -> Option<(Position, f64)> {
        let edge = self.edge(edge_id)?;
        let begin = self.node(edge.begin)?.position;
        let end = self.node(edge.end)?.position;
        let ratio = (distance / edge.length).clamp(0.0, 1.0);
        Some((begin.lerp(&end, ratio), edge.angle))
    }
}
