//! Core types for the route simulation
//!
//! Handles, geometry and the node/edge payloads stored in the topology arena.

use ordered_float::OrderedFloat;
use petgraph::stable_graph::{EdgeIndex, NodeIndex};
use sorted_vec::SortedVec;

/// A unique identifier for simulation entities
/// This is a simple wrapper around a usize for type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SimId(pub usize);

/// Handle of a node in the topology arena
///
/// The graph reuses the slots of removed nodes, so a handle also carries the
/// serial of the node it was issued for. A handle whose serial no longer
/// matches the slot is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId {
    pub(crate) index: NodeIndex,
    pub(crate) serial: u64,
}

/// Handle of an edge in the topology arena, serial-checked like `NodeId`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeId {
    pub(crate) index: EdgeIndex,
    pub(crate) serial: u64,
}

/// A wrapper type for vehicle IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VehicleId(pub SimId);

/// A 2D position in the simulation (meters)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn lerp(&self, other: &Position, t: f64) -> Position {
        Position {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
        }
    }

    /// Heading in radians from this position towards another
    pub fn angle_to(&self, other: &Position) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        if dx == 0.0 && dy == 0.0 {
            0.0
        } else {
            dy.atan2(dx)
        }
    }
}

/// Variant of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Internal intersection, never generates or absorbs traffic
    Cross,
    /// Source and sink of travel demand
    Site,
}

/// A node of the topology
#[derive(Debug, Clone)]
pub struct SimNode {
    pub name: String,
    pub position: Position,
    pub kind: NodeKind,
    /// Serial of the handle issued for this node
    pub(crate) serial: u64,
}

impl SimNode {
    pub fn is_site(&self) -> bool {
        matches!(self.kind, NodeKind::Site)
    }
}

/// Vehicles on an edge ordered by distance from the edge entry
pub type EdgeQueue = SortedVec<(OrderedFloat<f64>, VehicleId)>;

/// A directed edge connecting two nodes
#[derive(Debug, Clone)]
pub struct SimEdge {
    pub begin: NodeId,
    pub end: NodeId,
    /// Speed limit in m/s
    pub speed_limit: f64,
    pub priority: i32,
    pub length: f64,
    pub angle: f64,
    /// Vehicles currently on the edge, rearmost first
    pub queue: EdgeQueue,
    /// Congestion-aware transit time estimate, refreshed every tick
    pub transit_time: f64,
    /// Serial of the handle issued for this edge
    pub(crate) serial: u64,
}

impl SimEdge {
    pub fn new(
        begin: NodeId,
        end: NodeId,
        begin_pos: &Position,
        end_pos: &Position,
        speed_limit: f64,
        priority: i32,
        serial: u64,
    ) -> Self {
        let length = begin_pos.distance(end_pos);
        let mut edge = Self {
            begin,
            end,
            speed_limit,
            priority,
            length,
            angle: begin_pos.angle_to(end_pos),
            queue: EdgeQueue::new(),
            transit_time: 0.0,
            serial,
        };
        edge.transit_time = edge.free_transit_time();
        edge
    }

    /// Transit time with no other vehicle on the edge
    pub fn free_transit_time(&self) -> f64 {
        self.length / self.speed_limit
    }

    pub fn vehicle_count(&self) -> usize {
        self.queue.len()
    }

    /// Closest vehicle strictly ahead of `distance`
    pub fn vehicle_ahead(&self, distance: f64) -> Option<(f64, VehicleId)> {
        let idx = self
            .queue
            .partition_point(|(d, _)| d.into_inner() <= distance);
        self.queue.get(idx).map(|(d, id)| (d.into_inner(), *id))
    }

    /// Vehicle closest to the end of the edge
    pub fn head(&self) -> Option<(f64, VehicleId)> {
        self.queue.last().map(|(d, id)| (d.into_inner(), *id))
    }

    /// Vehicle closest to the entry of the edge
    pub fn tail(&self) -> Option<(f64, VehicleId)> {
        self.queue.first().map(|(d, id)| (d.into_inner(), *id))
    }
}

/// Length of a vehicle in meters
pub const VEHICLE_LENGTH: f64 = 5.0;

/// Driver reaction time in seconds
pub const REACTION_TIME: f64 = 1.0;

/// Minimum following gap enforced before braking kicks in
pub const SECURITY_DISTANCE: f64 = 10.0;

/// Speed floor used when estimating transit time on a jammed edge
pub const MIN_SPEED: f64 = 0.1;

/// Default speed limit (90 km/h)
pub const DEFAULT_SPEED_LIMIT: f64 = 25.0;
