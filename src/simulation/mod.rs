//! Standalone route simulation module
//!
//! Shortest-time routing over a directed topology, stochastic demand and
//! car-following kinematics, advanced one externally clocked tick at a time.

mod car;
mod car_manager;
mod config;
mod generator;
mod map_generator;
mod road_network;
mod routing;
mod stats;
mod types;
mod world;

// Re-export public types for external use
pub use car::{SimVehicle, VehicleState, VehicleUpdate};
pub use car_manager::{
    despawn_vehicle, release_queue_heads, spawn_vehicle, update_vehicles, SpawnOutcome,
};
pub use config::SimConfig;
pub use generator::{
    poisson, poisson_capped, Arrival, DemandEntry, TrafficGenerator, MAX_ARRIVALS_PER_ENTRY,
};
pub use map_generator::{generate_map, MapProfile};
pub use road_network::SimRoadNetwork;
pub use routing::{PathMatrix, RoutingTable, NO_CONNECTION};
pub use stats::{SimulationStats, TickReport, TrafficInfo, TripRecord, VehicleSnapshot};
pub use types::{
    EdgeId, EdgeQueue, NodeId, NodeKind, Position, SimEdge, SimId, SimNode, VehicleId,
    DEFAULT_SPEED_LIMIT, MIN_SPEED, REACTION_TIME, SECURITY_DISTANCE, VEHICLE_LENGTH,
};
pub use world::SimWorld;
