//! Vehicle movement logic for the route simulation
//!
//! Car-following kinematics along an edge and waypoint handling at its end.

use anyhow::{Context, Result};
use std::collections::VecDeque;

use super::config::SimConfig;
use super::road_network::SimRoadNetwork;
use super::routing::RoutingTable;
use super::types::{EdgeId, NodeId, VehicleId};

/// Where a running vehicle stands on its current edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleState {
    /// Moving along the edge
    InTransit,
    /// Holding at the edge end until the next edge can be entered
    Queued,
}

/// Result of a vehicle update indicating what action should be taken
#[derive(Debug, Clone, PartialEq)]
pub enum VehicleUpdate {
    /// Vehicle keeps running
    Continue,
    /// Vehicle completed its final waypoint and left the network
    Arrived {
        destination: NodeId,
        traveling_time: f64,
        delay: f64,
    },
    /// No edge leads towards the current waypoint; vehicle left the network
    Unreachable { target: NodeId },
}

/// A vehicle in the route simulation
#[derive(Debug, Clone)]
pub struct SimVehicle {
    pub id: VehicleId,
    /// Edge the vehicle is on, `None` when not running
    pub current_edge: Option<EdgeId>,
    /// Distance traveled along the current edge
    pub distance: f64,
    /// Time spent on the current edge
    pub transit_time: f64,
    /// Time spent since the last waypoint
    pub traveling_time: f64,
    /// Congestion-free time of the current leg
    pub expected_traveling_time: f64,
    /// Site the vehicle is currently heading to
    pub target: NodeId,
    /// Waypoints still to visit after `target`
    pub waypoints: VecDeque<NodeId>,
    /// Priority of the edge last entered
    pub priority: i32,
    pub state: VehicleState,
}

impl SimVehicle {
    pub fn new(id: VehicleId, target: NodeId, waypoints: VecDeque<NodeId>) -> Self {
        Self {
            id,
            current_edge: None,
            distance: 0.0,
            transit_time: 0.0,
            traveling_time: 0.0,
            expected_traveling_time: 0.0,
            target,
            waypoints,
            priority: 0,
            state: VehicleState::InTransit,
        }
    }

    /// Final destination of the itinerary
    pub fn destination(&self) -> NodeId {
        self.waypoints.back().copied().unwrap_or(self.target)
    }

    pub fn is_running(&self) -> bool {
        self.current_edge.is_some()
    }

    pub fn is_delayed(&self) -> bool {
        self.traveling_time > self.expected_traveling_time
    }

    /// Time lost against the congestion-free baseline of the current leg
    pub fn delay(&self) -> f64 {
        self.traveling_time - self.expected_traveling_time
    }

    /// Whether the itinerary mentions a node
    pub fn visits(&self, node: NodeId) -> bool {
        self.target == node || self.waypoints.contains(&node)
    }

    /// Puts the vehicle at the entry of an edge
    pub fn enter_edge(&mut self, edge_id: EdgeId, network: &mut SimRoadNetwork) -> Result<()> {
        let priority = network.edge(edge_id).context("Edge not found")?.priority;
        network.place_vehicle(edge_id, self.id, 0.0)?;
        self.current_edge = Some(edge_id);
        self.distance = 0.0;
        self.transit_time = 0.0;
        self.priority = priority;
        self.state = VehicleState::InTransit;
        Ok(())
    }

    /// Takes the vehicle off its current edge
    pub fn leave_edge(&mut self, network: &mut SimRoadNetwork) -> Result<()> {
        if let Some(edge_id) = self.current_edge.take() {
            network.remove_vehicle(edge_id, self.id, self.distance)?;
        }
        Ok(())
    }

    /// Advance the vehicle by one tick
    pub fn update(
        &mut self,
        delta_secs: f64,
        network: &mut SimRoadNetwork,
        routing: &RoutingTable,
        config: &SimConfig,
    ) -> Result<VehicleUpdate> {
        let edge_id = self.current_edge.context("Vehicle is not running")?;

        self.transit_time += delta_secs;
        self.traveling_time += delta_secs;

        if self.state == VehicleState::Queued {
            // Released by the queue head pass, not by motion
            return Ok(VehicleUpdate::Continue);
        }

        let edge = network.edge(edge_id).context("Edge not found")?;
        let length = edge.length;
        let mut advance = delta_secs * edge.speed_limit;

        if let Some((ahead_distance, _)) = edge.vehicle_ahead(self.distance) {
            let gap = ahead_distance - self.distance;
            if advance + config.security_distance > gap {
                advance = config
                    .braking_advance(gap, delta_secs)
                    .clamp(0.0, gap.max(0.0));
            }
        }
        let advance = advance.min(length - self.distance).max(0.0);

        let previous = self.distance;
        self.distance = (previous + advance).min(length);
        network.move_vehicle(edge_id, self.id, previous, self.distance)?;

        if self.distance >= length {
            return self.reach_edge_end(network, routing, config);
        }
        Ok(VehicleUpdate::Continue)
    }

    /// Handle the end of the current edge: waypoint bookkeeping and dispatch
    fn reach_edge_end(
        &mut self,
        network: &mut SimRoadNetwork,
        routing: &RoutingTable,
        config: &SimConfig,
    ) -> Result<VehicleUpdate> {
        let edge_id = self.current_edge.context("Vehicle is not running")?;
        let reached = network.edge(edge_id).context("Edge not found")?.end;

        if reached == self.target {
            match self.waypoints.pop_front() {
                None => {
                    let traveling_time = self.traveling_time;
                    let delay = self.delay();
                    self.leave_edge(network)?;
                    return Ok(VehicleUpdate::Arrived {
                        destination: reached,
                        traveling_time,
                        delay,
                    });
                }
                Some(next) => {
                    self.target = next;
                    self.traveling_time = 0.0;
                    self.expected_traveling_time = routing.expected_time(reached, next)?;
                }
            }
        }

        self.try_transfer(network, routing, config)
    }

    /// Move from the end of the current edge onto the next one.
    ///
    /// Holds as `Queued` while the next edge's entry is blocked.
    pub fn try_transfer(
        &mut self,
        network: &mut SimRoadNetwork,
        routing: &RoutingTable,
        config: &SimConfig,
    ) -> Result<VehicleUpdate> {
        let edge_id = self.current_edge.context("Vehicle is not running")?;
        let from = network.edge(edge_id).context("Edge not found")?.end;

        let Some(next_edge) = routing.find_next_edge(from, self.target)? else {
            self.leave_edge(network)?;
            return Ok(VehicleUpdate::Unreachable {
                target: self.target,
            });
        };

        if network.is_entry_blocked(next_edge, config)? {
            self.state = VehicleState::Queued;
            return Ok(VehicleUpdate::Continue);
        }

        self.leave_edge(network)?;
        self.enter_edge(next_edge, network)?;
        Ok(VehicleUpdate::Continue)
    }
}
