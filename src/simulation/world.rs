//! Main simulation world that ties everything together
//!
//! This is the entry point for building a topology, loading demand and
//! advancing the simulation one externally clocked tick at a time.

use anyhow::{Context, Result};
use log::{debug, info, warn};
use rand::Rng;
use std::collections::BTreeMap;

use super::car::{SimVehicle, VehicleUpdate};
use super::car_manager::{self, SpawnOutcome};
use super::config::SimConfig;
use super::generator::TrafficGenerator;
use super::road_network::SimRoadNetwork;
use super::routing::RoutingTable;
use super::stats::{SimulationStats, TickReport, TrafficInfo, TripRecord, VehicleSnapshot};
use super::types::{EdgeId, NodeId, NodeKind, Position, SimId, VehicleId};

/// The main simulation world
pub struct SimWorld {
    /// Topology arena
    pub road_network: SimRoadNetwork,

    /// Shortest path matrices, valid until the next topology edit
    pub routing: RoutingTable,

    /// All running vehicles
    pub vehicles: BTreeMap<VehicleId, SimVehicle>,

    /// Weighted demand matrix
    pub generator: TrafficGenerator,

    pub config: SimConfig,

    pub stats: SimulationStats,

    /// Next ID to assign
    next_id: usize,
}

impl Default for SimWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl SimWorld {
    pub fn new() -> Self {
        Self::with_config(SimConfig::default())
    }

    pub fn with_config(config: SimConfig) -> Self {
        Self {
            road_network: SimRoadNetwork::new(),
            routing: RoutingTable::new(),
            vehicles: BTreeMap::new(),
            generator: TrafficGenerator::new(),
            config,
            stats: SimulationStats::default(),
            next_id: 0,
        }
    }

    fn next_vehicle_id(&mut self) -> VehicleId {
        let id = VehicleId(SimId(self.next_id));
        self.next_id += 1;
        id
    }

    fn rebuild_routes(&mut self) {
        self.routing.rebuild_all(&self.road_network);
    }

    /// Add an internal intersection
    pub fn add_cross_node(&mut self, name: &str, position: Position) -> Result<NodeId> {
        let id = self.road_network.add_node(name, position, NodeKind::Cross)?;
        self.rebuild_routes();
        Ok(id)
    }

    /// Add a demand source and sink
    pub fn add_site(&mut self, name: &str, position: Position) -> Result<NodeId> {
        let id = self.road_network.add_node(name, position, NodeKind::Site)?;
        self.rebuild_routes();
        Ok(id)
    }

    /// Add a one-way edge
    pub fn add_edge(
        &mut self,
        begin: NodeId,
        end: NodeId,
        speed_limit: f64,
        priority: i32,
    ) -> Result<EdgeId> {
        let id = self.road_network.add_edge(begin, end, speed_limit, priority)?;
        self.rebuild_routes();
        Ok(id)
    }

    /// Add a two-way connection (creates two edges)
    pub fn add_two_way_edge(
        &mut self,
        a: NodeId,
        b: NodeId,
        speed_limit: f64,
        priority: i32,
    ) -> Result<(EdgeId, EdgeId)> {
        let forward = self.road_network.add_edge(a, b, speed_limit, priority)?;
        let backward = self.road_network.add_edge(b, a, speed_limit, priority)?;
        self.rebuild_routes();
        Ok((forward, backward))
    }

    /// Remove an edge; vehicles on it are despawned
    pub fn remove_edge(&mut self, edge_id: EdgeId) -> Result<()> {
        let vehicles = self.road_network.remove_edge(edge_id)?;
        self.drop_vehicles(vehicles);
        self.rebuild_routes();
        Ok(())
    }

    /// Remove a node and everything that depends on it
    ///
    /// Incident edges go with the node, as do the vehicles on them, vehicles
    /// whose itinerary names the node and demand entries referencing it.
    pub fn remove_node(&mut self, node_id: NodeId) -> Result<()> {
        let (edges, mut affected) = self.road_network.remove_node(node_id)?;
        debug!("Removed node {:?} with {} edges", node_id, edges.len());

        affected.extend(
            self.vehicles
                .values()
                .filter(|v| v.visits(node_id))
                .map(|v| v.id),
        );
        self.drop_vehicles(affected);
        self.generator.remove_node(node_id);
        self.rebuild_routes();
        Ok(())
    }

    /// Forget vehicles whose edge is already gone or detach them from their edge
    fn drop_vehicles(&mut self, vehicle_ids: Vec<VehicleId>) {
        for vehicle_id in vehicle_ids {
            if let Some(vehicle) = self.vehicles.get_mut(&vehicle_id) {
                let edge_alive = vehicle
                    .current_edge
                    .is_some_and(|edge_id| self.road_network.edge(edge_id).is_some());
                if !edge_alive {
                    vehicle.current_edge = None;
                }
            }
            car_manager::despawn_vehicle(vehicle_id, &mut self.vehicles, &mut self.road_network);
        }
    }

    /// Set the weight of the demand between two sites
    pub fn set_demand(&mut self, departure: NodeId, destination: NodeId, weight: f64) -> Result<()> {
        for node in [departure, destination] {
            let site = self
                .road_network
                .node(node)
                .with_context(|| format!("Demand node {:?} not found", node))?;
            if !site.is_site() {
                anyhow::bail!("Demand node {} is not a site", site.name);
            }
        }
        self.generator.set_demand(departure, destination, weight)
    }

    pub fn clear_demand(&mut self) {
        self.generator.clear();
    }

    pub fn set_frequency(&mut self, frequency: f64) -> Result<()> {
        if !(frequency.is_finite() && frequency >= 0.0) {
            anyhow::bail!("Frequency must be finite and non-negative, got {}", frequency);
        }
        self.config.frequency = frequency;
        Ok(())
    }

    pub fn find_node(&self, name: &str) -> Option<NodeId> {
        self.road_network.find_node(name)
    }

    /// Dispatch one vehicle right away
    pub fn spawn_vehicle(&mut self, departure: NodeId, destination: NodeId) -> Result<SpawnOutcome> {
        let id = self.next_vehicle_id();
        let outcome = car_manager::spawn_vehicle(
            id,
            departure,
            destination,
            self.config.round_trip,
            &mut self.road_network,
            &self.routing,
            &self.config,
        )?;
        if let SpawnOutcome::Spawned(vehicle) = &outcome {
            self.vehicles.insert(id, vehicle.clone());
            self.stats.vehicles_spawned += 1;
        }
        Ok(outcome)
    }

    /// Main simulation tick
    pub fn tick<R: Rng + ?Sized>(&mut self, delta_secs: f64, rng: &mut R) -> Result<TickReport> {
        if !(delta_secs.is_finite() && delta_secs > 0.0) {
            anyhow::bail!("Tick duration must be positive, got {}", delta_secs);
        }
        let mut report = TickReport::default();

        self.road_network.refresh_transit_times(&self.config);
        self.routing.rebuild(&self.road_network);

        let results = car_manager::update_vehicles(
            delta_secs,
            &mut self.vehicles,
            &mut self.road_network,
            &self.routing,
            &self.config,
        );
        self.record_exits(results, &mut report);

        let arrivals = self.generator.generate(
            rng,
            self.config.frequency,
            delta_secs,
            self.road_network.site_count(),
        );
        for arrival in arrivals {
            match self.spawn_vehicle(arrival.departure, arrival.destination) {
                Ok(SpawnOutcome::Spawned(_)) => report.spawned += 1,
                Ok(SpawnOutcome::NoConnection | SpawnOutcome::Blocked) => {
                    self.stats.arrivals_dropped += 1;
                    report.dropped += 1;
                }
                Err(err) => {
                    warn!(
                        "Dropping arrival from {:?} to {:?}: {:#}",
                        arrival.departure, arrival.destination, err
                    );
                    self.stats.arrivals_dropped += 1;
                    report.dropped += 1;
                }
            }
        }

        let released = car_manager::release_queue_heads(
            &mut self.vehicles,
            &mut self.road_network,
            &self.routing,
            &self.config,
        );
        self.record_exits(released, &mut report);

        self.stats.elapsed_time += delta_secs;
        self.stats.ticks += 1;
        Ok(report)
    }

    fn record_exits(&mut self, results: Vec<(VehicleId, VehicleUpdate)>, report: &mut TickReport) {
        for (vehicle_id, result) in results {
            match result {
                VehicleUpdate::Arrived {
                    destination,
                    traveling_time,
                    delay,
                } => {
                    self.stats.vehicles_arrived += 1;
                    self.stats.total_trip_delay += delay;
                    report.completed.push(TripRecord {
                        vehicle: vehicle_id,
                        destination,
                        traveling_time,
                        delay,
                    });
                }
                VehicleUpdate::Unreachable { target } => {
                    debug!("Vehicle {:?} has no connection to {:?}", vehicle_id, target);
                    self.stats.vehicles_unreachable += 1;
                    report.unreachable += 1;
                }
                VehicleUpdate::Continue => {}
            }
        }
    }

    /// Positions and headings of all running vehicles
    pub fn vehicle_snapshots(&self) -> Vec<VehicleSnapshot> {
        self.vehicles
            .values()
            .filter_map(|vehicle| {
                let edge = vehicle.current_edge?;
                let (position, heading) = self.road_network.point_on_edge(edge, vehicle.distance)?;
                Some(VehicleSnapshot {
                    id: vehicle.id,
                    edge,
                    position,
                    heading,
                    delayed: vehicle.is_delayed(),
                })
            })
            .collect()
    }

    /// Vehicle counts and delays grouped by the final destination of each vehicle
    ///
    /// A round-trip vehicle counts towards the site it returns to.
    pub fn traffic_info(&self) -> Vec<TrafficInfo> {
        let mut by_destination: BTreeMap<NodeId, TrafficInfo> = self
            .road_network
            .sites()
            .into_iter()
            .filter_map(|site| {
                let name = self.road_network.node(site)?.name.clone();
                Some((site, TrafficInfo::new(site, name)))
            })
            .collect();

        for vehicle in self.vehicles.values() {
            if let Some(info) = by_destination.get_mut(&vehicle.destination()) {
                info.vehicle_count += 1;
                if vehicle.is_delayed() {
                    info.delayed_count += 1;
                    info.total_delay += vehicle.delay();
                }
            }
        }

        by_destination.into_values().collect()
    }

    pub fn delayed_count(&self) -> usize {
        self.vehicles.values().filter(|v| v.is_delayed()).count()
    }

    pub fn delayed_percentage(&self) -> f64 {
        if self.vehicles.is_empty() {
            0.0
        } else {
            self.delayed_count() as f64 / self.vehicles.len() as f64 * 100.0
        }
    }

    /// Average delay over the delayed vehicles
    pub fn average_delay(&self) -> f64 {
        let (count, total) = self
            .vehicles
            .values()
            .filter(|v| v.is_delayed())
            .fold((0usize, 0.0), |(n, sum), v| (n + 1, sum + v.delay()));
        if count == 0 {
            0.0
        } else {
            total / count as f64
        }
    }

    /// Congestion level of every edge
    pub fn edge_traffic_levels(&self) -> Vec<(EdgeId, f64)> {
        self.road_network.traffic_levels(&self.config)
    }

    /// Log a summary of the world state
    pub fn print_summary(&self) {
        info!("=== Route Simulation Summary ===");
        info!("Time: {:.2}s", self.stats.elapsed_time);
        info!(
            "Nodes: {}, Edges: {}, Sites: {}",
            self.road_network.node_count(),
            self.road_network.edge_count(),
            self.road_network.site_count()
        );
        info!("Vehicles: {}", self.vehicles.len());
        info!(
            "Delayed: {} ({:.1}%), average delay {:.2}s",
            self.delayed_count(),
            self.delayed_percentage(),
            self.average_delay()
        );
        for traffic in self.traffic_info() {
            if traffic.vehicle_count > 0 {
                info!(
                    "  -> {}: vehicles={}, delayed={:.1}%, avg delay={:.2}s",
                    traffic.name,
                    traffic.vehicle_count,
                    traffic.delayed_percentage(),
                    traffic.average_delay()
                );
            }
        }
        let congested = self
            .edge_traffic_levels()
            .into_iter()
            .filter(|(_, level)| *level > 0.5)
            .count();
        info!("Congested edges: {}", congested);
    }
}
