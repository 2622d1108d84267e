//! Aggregated statistics and read-only snapshots exposed to outer layers

use super::types::{EdgeId, NodeId, Position, VehicleId};

/// Cumulative simulation counters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulationStats {
    pub elapsed_time: f64,
    pub ticks: u64,
    pub vehicles_spawned: u64,
    pub vehicles_arrived: u64,
    /// Vehicles removed because no route led to their waypoint
    pub vehicles_unreachable: u64,
    /// Arrivals dropped because the first edge was blocked or unreachable
    pub arrivals_dropped: u64,
    /// Sum of delays of completed trips
    pub total_trip_delay: f64,
}

impl SimulationStats {
    /// Share of spawned vehicles that completed their itinerary
    pub fn success_rate(&self) -> f64 {
        if self.vehicles_spawned == 0 {
            0.0
        } else {
            self.vehicles_arrived as f64 / self.vehicles_spawned as f64 * 100.0
        }
    }

    pub fn average_trip_delay(&self) -> f64 {
        if self.vehicles_arrived == 0 {
            0.0
        } else {
            self.total_trip_delay / self.vehicles_arrived as f64
        }
    }
}

/// Traffic heading to one destination
#[derive(Debug, Clone, PartialEq)]
pub struct TrafficInfo {
    pub destination: NodeId,
    pub name: String,
    pub vehicle_count: usize,
    pub delayed_count: usize,
    /// Sum of delays of the delayed vehicles
    pub total_delay: f64,
}

impl TrafficInfo {
    pub fn new(destination: NodeId, name: String) -> Self {
        Self {
            destination,
            name,
            vehicle_count: 0,
            delayed_count: 0,
            total_delay: 0.0,
        }
    }

    pub fn delayed_percentage(&self) -> f64 {
        if self.vehicle_count == 0 {
            0.0
        } else {
            self.delayed_count as f64 / self.vehicle_count as f64 * 100.0
        }
    }

    /// Average delay over the delayed vehicles
    pub fn average_delay(&self) -> f64 {
        if self.delayed_count == 0 {
            0.0
        } else {
            self.total_delay / self.delayed_count as f64
        }
    }
}

/// Position and heading of a running vehicle, for rendering
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleSnapshot {
    pub id: VehicleId,
    pub edge: EdgeId,
    pub position: Position,
    pub heading: f64,
    pub delayed: bool,
}

/// A completed trip
#[derive(Debug, Clone, PartialEq)]
pub struct TripRecord {
    pub vehicle: VehicleId,
    pub destination: NodeId,
    pub traveling_time: f64,
    pub delay: f64,
}

/// What happened during one tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub completed: Vec<TripRecord>,
    pub spawned: usize,
    pub unreachable: usize,
    pub dropped: usize,
}
