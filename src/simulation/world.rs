//! Main simulation world that ties everything together
//!
//! The lifecycle manager: owns the topology, the active vehicles, the tuning
//! and the clock, and drives the two-phase tick — recompute every lane's
//! ahead references, then advance every vehicle, routing the ones that exit
//! a road and retiring the ones that arrive or strand.
//!
//! Everything is single-threaded and cooperative; a tick always runs to
//! completion and pausing is simply not calling [`SimWorld::tick`]. All
//! time-bounded state compares against the explicit clock advanced here.

use log::debug;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

use super::error::SimError;
use super::routing;
use super::stats::SimStats;
use super::topology::RoadNetwork;
use super::tuning::SimTuning;
use super::types::{IntersectionId, MapDescription, VehicleId};
use super::vehicle::{KinematicParams, UpdateOutcome, Vehicle};

/// Probability that a randomly drawn trip endpoint comes from the major tier.
const MAJOR_TIER_BIAS: f64 = 0.65;

/// Bound on destination resampling when origin and destination collide.
const RESAMPLE_ATTEMPTS: usize = 16;

/// A per-tick view of one vehicle for rendering/telemetry collaborators.
#[derive(Debug, Clone, Copy)]
pub struct VehicleSnapshot {
    pub id: VehicleId,
    pub x: f64,
    pub y: f64,
    pub direction: i8,
}

/// The main simulation world
pub struct SimWorld {
    /// Topology plus per-road lane state.
    pub network: RoadNetwork,
    /// All active vehicles.
    pub vehicles: HashMap<VehicleId, Vehicle>,
    /// Mutable-between-ticks parameters.
    pub tuning: SimTuning,
    /// Cumulative statistics.
    pub stats: SimStats,
    clock: f64,
    next_vehicle_id: u64,
    rng: StdRng,
    major: Vec<IntersectionId>,
    minor: Vec<IntersectionId>,
}

impl SimWorld {
    fn new_internal(network: RoadNetwork, rng: StdRng) -> Self {
        let mut major = Vec::new();
        let mut minor = Vec::new();
        for intersection in network.intersections() {
            if intersection.major {
                major.push(intersection.id);
            } else {
                minor.push(intersection.id);
            }
        }

        Self {
            network,
            vehicles: HashMap::new(),
            tuning: SimTuning::default(),
            stats: SimStats::default(),
            clock: 0.0,
            next_vehicle_id: 0,
            rng,
            major,
            minor,
        }
    }

    pub fn from_map(map: &MapDescription) -> Self {
        Self::new_internal(RoadNetwork::from_map(map), StdRng::from_os_rng())
    }

    /// Builds a world with a seeded RNG for reproducible simulations.
    pub fn from_map_seeded(map: &MapDescription, seed: u64) -> Self {
        Self::new_internal(RoadNetwork::from_map(map), StdRng::seed_from_u64(seed))
    }

    /// The demo world used by the CLI runner.
    pub fn demo() -> Self {
        Self::from_map(&MapDescription::demo())
    }

    pub fn demo_with_seed(seed: u64) -> Self {
        Self::from_map_seeded(&MapDescription::demo(), seed)
    }

    pub fn clock(&self) -> f64 {
        self.clock
    }

    pub fn vehicle(&self, id: VehicleId) -> Option<&Vehicle> {
        self.vehicles.get(&id)
    }

    pub fn active_count(&self) -> usize {
        self.vehicles.len()
    }

    /// Draws a trip endpoint with the major/minor tier bias.
    fn pick_intersection(&mut self) -> Option<IntersectionId> {
        let use_major = !self.major.is_empty()
            && (self.minor.is_empty() || self.rng.random_bool(MAJOR_TIER_BIAS));
        let tier = if use_major { &self.major } else { &self.minor };
        tier.choose(&mut self.rng).copied()
    }

    /// Creates `n` vehicles. Unspecified endpoints are drawn with the tier
    /// bias, resampling the destination until it differs from the origin.
    /// Each vehicle enters its first road via a routing query; vehicles with
    /// no route are stranded immediately. Returns the ids that entered.
    pub fn spawn_vehicles(
        &mut self,
        n: usize,
        start: Option<IntersectionId>,
        end: Option<IntersectionId>,
    ) -> Vec<VehicleId> {
        let mut entered = Vec::new();
        for _ in 0..n {
            let Some(origin) = start.or_else(|| self.pick_intersection()) else {
                break;
            };
            let destination = match end {
                Some(destination) => destination,
                None => {
                    let mut candidate = None;
                    for _ in 0..RESAMPLE_ATTEMPTS {
                        match self.pick_intersection() {
                            Some(picked) if picked != origin => {
                                candidate = Some(picked);
                                break;
                            }
                            Some(_) => continue,
                            None => break,
                        }
                    }
                    match candidate {
                        Some(destination) => destination,
                        None => continue,
                    }
                }
            };
            if destination == origin {
                continue;
            }

            let id = VehicleId(self.next_vehicle_id);
            self.next_vehicle_id += 1;
            let params = KinematicParams::sample(&mut self.rng);
            let mut vehicle = Vehicle::new(id, origin, destination, self.clock, params);
            self.stats.record_spawn();

            let route = routing::best_route(
                &mut self.network,
                origin,
                destination,
                None,
                self.clock,
                &self.tuning,
            );
            let entry = route.and_then(|road| {
                self.network
                    .road_mut(road)
                    .enter(id, origin)
                    .map(|entry| (road, entry))
            });
            match entry {
                Some((road, entry)) => {
                    vehicle.enter_road(road, entry);
                    self.vehicles.insert(id, vehicle);
                    entered.push(id);
                }
                None => {
                    debug!(
                        "vehicle {:?} stranded at spawn: {}",
                        id,
                        SimError::NoRoute {
                            from: self.network.intersection(origin).name.clone(),
                            to: self.network.intersection(destination).name.clone(),
                        }
                    );
                    self.stats.record_stranding();
                }
            }
        }
        entered
    }

    /// Advances the simulation by `dt` seconds (scaled by the tuning's time
    /// scale).
    pub fn tick(&mut self, dt: f64) {
        let dt = dt * self.tuning.time_scale;
        if dt <= 0.0 {
            return;
        }
        self.clock += dt;

        if self.vehicles.len() < self.tuning.max_vehicles
            && self
                .rng
                .random_bool(self.tuning.spawn_probability.clamp(0.0, 1.0))
        {
            let batch = self
                .rng
                .random_range(1..=self.tuning.max_spawns_per_tick.max(1));
            self.spawn_vehicles(batch, None, None);
        }

        // Refresh stale congestion costs against the tick clock.
        for road in self.network.roads_mut() {
            road.refresh_dynamic_cost(self.clock, &self.vehicles, &self.tuning, dt);
        }

        // Phase 1: derive every lane's ahead references from a sorted
        // snapshot. This must complete for all roads before any vehicle
        // computes kinematics.
        let mut assignments = Vec::new();
        for road in self.network.roads() {
            assignments.extend(road.ahead_assignments());
        }
        for (vehicle_id, ahead) in assignments {
            if let Some(vehicle) = self.vehicles.get_mut(&vehicle_id) {
                vehicle.set_ahead(ahead);
            }
        }

        // Phase 2: advance every vehicle. Each is taken out of the map for
        // the duration of its update so it can read the others immutably.
        let ids: Vec<VehicleId> = self.vehicles.keys().copied().collect();
        for id in ids {
            let Some(mut vehicle) = self.vehicles.remove(&id) else {
                continue;
            };
            let outcome = vehicle.update(
                dt,
                self.clock,
                &mut self.network,
                &self.vehicles,
                &self.tuning,
                &mut self.rng,
            );
            match outcome {
                UpdateOutcome::Continue => {
                    self.vehicles.insert(id, vehicle);
                }
                UpdateOutcome::Arrived => {
                    let major_pair = self.network.intersection(vehicle.origin).major
                        && self.network.intersection(vehicle.destination).major;
                    self.stats.record_arrival(
                        vehicle.origin,
                        vehicle.destination,
                        major_pair,
                        self.clock - vehicle.created_at,
                        vehicle.travelled,
                    );
                }
                UpdateOutcome::Stranded => {
                    self.stats.record_stranding();
                }
            }
        }
    }

    /// World positions of all active vehicles, for rendering collaborators.
    pub fn vehicle_snapshots(&self) -> Vec<VehicleSnapshot> {
        self.vehicles
            .values()
            .filter_map(|vehicle| {
                let road = vehicle.road?;
                let point = self
                    .network
                    .road(road)
                    .project(vehicle.position, vehicle.segment());
                Some(VehicleSnapshot {
                    id: vehicle.id,
                    x: point.x,
                    y: point.y,
                    direction: vehicle.direction,
                })
            })
            .collect()
    }

    /// Prints a plain-text summary of the world state.
    pub fn print_summary(&self) {
        println!("=== Traffic Simulation Summary ===");
        println!("Clock: {:.1}s", self.clock);
        println!(
            "Intersections: {}, Roads: {}",
            self.network.intersection_count(),
            self.network.road_count()
        );
        println!(
            "Vehicles: {} active / {} spawned / {} completed / {} stranded",
            self.vehicles.len(),
            self.stats.spawned,
            self.stats.completed,
            self.stats.stranded
        );
        if let Some(avg) = self.stats.average_travel_time() {
            println!("Average travel time: {:.2}s", avg);
        }
        if let Some(avg) = self.stats.average_velocity() {
            println!("Average velocity: {:.1} units/s", avg);
        }
        println!(
            "Throughput: {:.3} trips/s",
            self.stats.throughput(self.clock)
        );
    }
}
