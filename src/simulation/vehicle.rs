//! Vehicle state and car-following kinematics
//!
//! A vehicle occupies at most one road at a time and moves along it by a
//! scalar position. Follow behavior uses the ahead reference derived each
//! tick by the lane engine together with a short position history, which
//! smooths the gap estimate against single-tick jitter.

use log::{debug, warn};
use rand::rngs::StdRng;
use rand::Rng;
use std::collections::{HashMap, VecDeque};

use super::error::SimError;
use super::road::{Advance, LaneEntry};
use super::routing;
use super::topology::RoadNetwork;
use super::tuning::SimTuning;
use super::types::{IntersectionId, RoadId, VehicleId};

/// Maximum retained position-history frames.
const HISTORY_FRAMES: usize = 90;

/// Seconds of history used to smooth the gap to the ahead vehicle.
const GAP_SMOOTHING_SECS: f64 = 0.5;

/// Probability of snapping onto an out-of-order ahead vehicle instead of
/// driving through it. A stopgap for transient lane-ordering inversions.
const SNAP_PROBABILITY: f64 = 0.8;

/// Braking is this much stronger than ordinary acceleration.
const DECEL_FACTOR: f64 = 4.0;

/// Duration of a random full stop, in simulated seconds.
const HALT_SECS: f64 = 5.0;

/// Fraction of a road's ends within which random halts never trigger.
const HALT_MARGIN: f64 = 0.2;

/// Result of a vehicle update indicating what the world should do with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Vehicle continues moving.
    Continue,
    /// Vehicle reached its destination intersection.
    Arrived,
    /// No route onward exists; the vehicle is dropped.
    Stranded,
}

/// Per-vehicle kinematic parameters, drawn at spawn time.
#[derive(Debug, Clone, Copy)]
pub struct KinematicParams {
    pub max_velocity: f64,
    pub max_acceleration: f64,
    /// Desired clearance to the vehicle ahead, in path units.
    pub ideal_clearance: f64,
    /// Range within which an ahead vehicle influences car following.
    pub look_ahead: f64,
}

impl KinematicParams {
    pub fn sample(rng: &mut StdRng) -> Self {
        Self {
            max_velocity: rng.random_range(50.0..100.0),
            max_acceleration: rng.random_range(15.0..30.0),
            ideal_clearance: rng.random_range(5.0..10.0),
            look_ahead: rng.random_range(50.0..150.0),
        }
    }
}

/// The smoothed state of the vehicle ahead, resolved by `update`.
#[derive(Debug, Clone, Copy)]
struct AheadGap {
    position: f64,
    smoothed_position: f64,
}

/// A vehicle in the traffic simulation
#[derive(Debug, Clone)]
pub struct Vehicle {
    pub id: VehicleId,
    pub road: Option<RoadId>,
    /// +1 along the forward lane, -1 along the backward lane.
    pub direction: i8,
    pub position: f64,
    pub origin: IntersectionId,
    pub destination: IntersectionId,
    pub created_at: f64,
    /// Total path length of roads traversed, including the current exit.
    pub travelled: f64,
    segment: usize,
    velocity: f64,
    params: KinematicParams,
    history: VecDeque<f64>,
    ahead: Option<VehicleId>,
    halted_until: Option<f64>,
}

impl Vehicle {
    pub fn new(
        id: VehicleId,
        origin: IntersectionId,
        destination: IntersectionId,
        created_at: f64,
        params: KinematicParams,
    ) -> Self {
        Self {
            id,
            road: None,
            direction: 0,
            position: 0.0,
            origin,
            destination,
            created_at,
            travelled: 0.0,
            segment: 0,
            velocity: 0.0,
            params,
            history: VecDeque::from([0.0]),
            ahead: None,
            halted_until: None,
        }
    }

    pub fn max_velocity(&self) -> f64 {
        self.params.max_velocity
    }

    pub fn velocity(&self) -> f64 {
        self.velocity
    }

    /// The current ahead reference, as derived by the last recompute phase
    /// or carried from road entry.
    pub fn ahead_id(&self) -> Option<VehicleId> {
        self.ahead
    }

    pub(crate) fn set_ahead(&mut self, ahead: Option<VehicleId>) {
        self.ahead = ahead;
    }

    pub(crate) fn segment(&self) -> usize {
        self.segment
    }

    /// The position recorded `frames` ticks ago, clamped to the oldest
    /// retained entry.
    pub fn past_position(&self, frames: usize) -> f64 {
        let idx = self.history.len().saturating_sub(frames + 1);
        self.history[idx]
    }

    /// Velocity estimate from the position delta over the last `frames`
    /// ticks. `None` until enough history has accumulated.
    pub fn smoothed_velocity(&self, frames: usize, dt: f64) -> Option<f64> {
        if self.history.len() <= frames || dt <= 0.0 {
            return None;
        }
        Some((self.position - self.past_position(frames)).abs() / (frames as f64 * dt))
    }

    /// Takes ownership of a lane slot on a new road. Vehicles enter a road
    /// at full speed.
    pub(crate) fn enter_road(&mut self, road: RoadId, entry: LaneEntry) {
        self.road = Some(road);
        self.direction = entry.direction;
        self.position = entry.position;
        self.segment = entry.segment;
        self.ahead = entry.ahead;
        self.velocity = self.params.max_velocity;
        self.history.clear();
        self.history.push_back(entry.position);
    }

    /// Advances the vehicle by one tick: kinematics, lane position update,
    /// and, on road exit, the routing query for the next hop.
    pub(crate) fn update(
        &mut self,
        dt: f64,
        clock: f64,
        network: &mut RoadNetwork,
        vehicles: &HashMap<VehicleId, Vehicle>,
        tuning: &SimTuning,
        rng: &mut StdRng,
    ) -> UpdateOutcome {
        let Some(road_id) = self.road else {
            return UpdateOutcome::Stranded;
        };

        let lookback = gap_lookback(dt);
        let ahead = self
            .ahead
            .filter(|ahead_id| *ahead_id != self.id)
            .and_then(|ahead_id| vehicles.get(&ahead_id))
            .filter(|other| other.road == Some(road_id) && other.direction == self.direction)
            .map(|other| AheadGap {
                position: other.position,
                smoothed_position: other.past_position(lookback),
            });

        let road_length = network.road(road_id).path_length();
        let new_position = self.step_kinematics(dt, clock, ahead, road_length, tuning, rng);

        match network
            .road_mut(road_id)
            .advance_position(self.id, new_position, self.segment)
        {
            Advance::Moving { position, segment } => {
                self.position = position;
                self.segment = segment;
                UpdateOutcome::Continue
            }
            Advance::Exited { node } => {
                self.travelled += road_length;
                self.road = None;
                self.ahead = None;
                if node == self.destination {
                    return UpdateOutcome::Arrived;
                }
                let Some(next) =
                    routing::best_route(network, node, self.destination, Some(road_id), clock, tuning)
                else {
                    debug!(
                        "vehicle {:?} stranded: {}",
                        self.id,
                        SimError::NoRoute {
                            from: network.intersection(node).name.clone(),
                            to: network.intersection(self.destination).name.clone(),
                        }
                    );
                    return UpdateOutcome::Stranded;
                };
                match network.road_mut(next).enter(self.id, node) {
                    Some(entry) => {
                        self.enter_road(next, entry);
                        UpdateOutcome::Continue
                    }
                    None => {
                        warn!(
                            "vehicle {:?} stranded: {}",
                            self.id,
                            SimError::UnknownEndpoint(network.intersection(node).name.clone())
                        );
                        UpdateOutcome::Stranded
                    }
                }
            }
            Advance::Unknown => {
                warn!(
                    "vehicle {:?} lost from road '{}'",
                    self.id,
                    network.road(road_id).name
                );
                self.road = None;
                UpdateOutcome::Stranded
            }
        }
    }

    /// Computes the position the vehicle wants to occupy after `dt`.
    ///
    /// Desired velocity is the maximum unless an ahead vehicle sits within
    /// the look-ahead range, in which case it scales with the smoothed gap
    /// relative to the ideal clearance. Acceleration is bang-bang at
    /// `max_acceleration`, strengthened while braking from speed.
    fn step_kinematics(
        &mut self,
        dt: f64,
        clock: f64,
        ahead: Option<AheadGap>,
        road_length: f64,
        tuning: &SimTuning,
        rng: &mut StdRng,
    ) -> f64 {
        let direction = f64::from(self.direction);
        let max_velocity = self.effective_max_velocity(clock);
        let mut desired = max_velocity;

        if let Some(ahead) = ahead {
            if direction * (ahead.position - self.position) <= 0.0 {
                // Ordering noise: the ahead vehicle is not actually ahead.
                if rng.random_bool(SNAP_PROBABILITY) {
                    return ahead.position;
                }
                return self.position;
            }
            let lookback = gap_lookback(dt);
            let gap = direction * (ahead.smoothed_position - self.past_position(lookback));
            if gap <= self.params.look_ahead {
                desired = max_velocity * (gap - self.params.ideal_clearance)
                    / self.params.ideal_clearance;
            }
        }
        let desired = desired.clamp(0.0, max_velocity);

        let dv = desired - self.velocity;
        let mut acceleration = if dv == 0.0 {
            0.0
        } else {
            dv.signum() * self.params.max_acceleration
        };
        if dv < 0.0 && self.velocity > 0.0 {
            acceleration *= DECEL_FACTOR;
        }
        self.velocity = (self.velocity + acceleration * dt).clamp(0.0, self.params.max_velocity);

        if rng.random_bool(tuning.slowdown_probability.clamp(0.0, 1.0)) {
            self.velocity /= rng.random_range(2.5..4.5);
        }
        let fraction = self.position / road_length;
        if fraction > HALT_MARGIN
            && fraction < 1.0 - HALT_MARGIN
            && rng.random_bool(tuning.halt_probability.clamp(0.0, 1.0))
        {
            self.halted_until = Some(clock + HALT_SECS);
        }

        self.history.push_back(self.position);
        if self.history.len() > HISTORY_FRAMES {
            self.history.pop_front();
        }

        self.position + direction * self.velocity * dt
    }

    fn effective_max_velocity(&self, clock: f64) -> f64 {
        match self.halted_until {
            Some(until) if clock < until => 0.0,
            _ => self.params.max_velocity,
        }
    }
}

/// How many history frames approximate the gap-smoothing window at `dt`.
fn gap_lookback(dt: f64) -> usize {
    if dt <= 0.0 {
        return 1;
    }
    ((GAP_SMOOTHING_SECS / dt).round() as usize).clamp(1, HISTORY_FRAMES - 1)
}
