//! Vehicle dispatch and management for the route simulation
//!
//! This module contains functions for spawning, despawning, advancing and
//! releasing vehicles. It separates vehicle management from the world facade.

use anyhow::Result;
use log::warn;
use std::collections::{BTreeMap, VecDeque};

use super::car::{SimVehicle, VehicleState, VehicleUpdate};
use super::config::SimConfig;
use super::road_network::SimRoadNetwork;
use super::routing::RoutingTable;
use super::types::{NodeId, VehicleId};

/// Outcome of a dispatch attempt
#[derive(Debug, Clone)]
pub enum SpawnOutcome {
    Spawned(SimVehicle),
    /// No route from departure to destination
    NoConnection,
    /// First edge entry is occupied
    Blocked,
}

/// Dispatch a new vehicle from `departure` to `destination`
///
/// With `round_trip` the departure site is appended as the last waypoint.
/// The vehicle enters the first edge of the route at distance 0 with its
/// baseline set from the congestion-free matrix.
pub fn spawn_vehicle(
    id: VehicleId,
    departure: NodeId,
    destination: NodeId,
    round_trip: bool,
    network: &mut SimRoadNetwork,
    routing: &RoutingTable,
    config: &SimConfig,
) -> Result<SpawnOutcome> {
    let Some(edge_id) = routing.find_next_edge(departure, destination)? else {
        return Ok(SpawnOutcome::NoConnection);
    };

    if network.is_entry_blocked(edge_id, config)? {
        return Ok(SpawnOutcome::Blocked);
    }

    let mut waypoints = VecDeque::new();
    if round_trip {
        waypoints.push_back(departure);
    }

    let mut vehicle = SimVehicle::new(id, destination, waypoints);
    vehicle.expected_traveling_time = routing.expected_time(departure, destination)?;
    vehicle.enter_edge(edge_id, network)?;

    Ok(SpawnOutcome::Spawned(vehicle))
}

/// Despawn a vehicle and clean up its queue entry
pub fn despawn_vehicle(
    vehicle_id: VehicleId,
    vehicles: &mut BTreeMap<VehicleId, SimVehicle>,
    network: &mut SimRoadNetwork,
) {
    if let Some(mut vehicle) = vehicles.remove(&vehicle_id) {
        if let Err(err) = vehicle.leave_edge(network) {
            warn!("Failed to detach vehicle {:?}: {:#}", vehicle_id, err);
        }
    }
}

/// Advance all vehicles in the simulation
///
/// Works on a snapshot of the vehicle ids since an update can remove or
/// relocate vehicles. Returns the vehicles that left the network.
pub fn update_vehicles(
    delta_secs: f64,
    vehicles: &mut BTreeMap<VehicleId, SimVehicle>,
    network: &mut SimRoadNetwork,
    routing: &RoutingTable,
    config: &SimConfig,
) -> Vec<(VehicleId, VehicleUpdate)> {
    let mut results = Vec::new();

    let vehicle_ids: Vec<VehicleId> = vehicles.keys().copied().collect();

    for vehicle_id in vehicle_ids {
        let Some(mut vehicle) = vehicles.remove(&vehicle_id) else {
            continue;
        };

        match vehicle.update(delta_secs, network, routing, config) {
            Ok(VehicleUpdate::Continue) => {
                vehicles.insert(vehicle_id, vehicle);
            }
            Ok(result) => results.push((vehicle_id, result)),
            Err(err) => {
                warn!("Removing vehicle {:?} after failed update: {:#}", vehicle_id, err);
                if let Err(err) = vehicle.leave_edge(network) {
                    warn!("Failed to detach vehicle {:?}: {:#}", vehicle_id, err);
                }
            }
        }
    }

    results
}

/// Move queued edge heads onto their next edge where its entry is free
///
/// Returns the vehicles that left the network because their route vanished.
pub fn release_queue_heads(
    vehicles: &mut BTreeMap<VehicleId, SimVehicle>,
    network: &mut SimRoadNetwork,
    routing: &RoutingTable,
    config: &SimConfig,
) -> Vec<(VehicleId, VehicleUpdate)> {
    let mut results = Vec::new();

    let heads: Vec<VehicleId> = network
        .edge_ids()
        .filter_map(|edge_id| network.edge(edge_id).and_then(|edge| edge.head()))
        .map(|(_, vehicle_id)| vehicle_id)
        .collect();

    for vehicle_id in heads {
        let Some(vehicle) = vehicles.get_mut(&vehicle_id) else {
            continue;
        };
        if vehicle.state != VehicleState::Queued {
            continue;
        }

        match vehicle.try_transfer(network, routing, config) {
            Ok(VehicleUpdate::Continue) => {}
            Ok(result) => {
                vehicles.remove(&vehicle_id);
                results.push((vehicle_id, result));
            }
            Err(err) => {
                warn!("Removing queued vehicle {:?}: {:#}", vehicle_id, err);
                despawn_vehicle(vehicle_id, vehicles, network);
            }
        }
    }

    results
}
