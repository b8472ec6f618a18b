//! Road lane engine
//!
//! Each road is an undirected polyline edge carrying two disjoint lanes, one
//! per travel direction. A lane maps vehicle id → scalar position along the
//! path; ordering and follow relationships are derived from a per-tick
//! snapshot sort, never stored. Roads also own their directional costs: a
//! static geometric cost plus a congestion cost recomputed against the tick
//! clock on a fixed interval.

use log::warn;
use ordered_float::OrderedFloat;
use std::cmp::Reverse;
use std::collections::HashMap;

use super::error::SimError;
use super::tuning::{RoutingMode, SimTuning};
use super::types::{IntersectionId, Point, RoadId, VehicleId};
use super::vehicle::Vehicle;

/// Floor applied to gaps and velocities before inversion.
const EPSILON: f64 = 1e-9;

/// How many history frames back the congestion velocity estimate looks.
const COST_LOOKBACK_FRAMES: usize = 5;

/// What a vehicle receives when it enters a road.
#[derive(Debug, Clone, Copy)]
pub struct LaneEntry {
    /// The vehicle that entered this lane most recently, as the initial
    /// ahead reference until the next recompute phase.
    pub ahead: Option<VehicleId>,
    pub position: f64,
    pub direction: i8,
    pub segment: usize,
}

/// Outcome of one position update on a road.
#[derive(Debug, Clone, Copy)]
pub enum Advance {
    /// Still on the road, at the clamped position and segment.
    Moving { position: f64, segment: usize },
    /// Reached a bound; the vehicle has been removed from its lane.
    Exited { node: IntersectionId },
    /// The vehicle is not on either lane of this road.
    Unknown,
}

/// An undirected road with two directional lanes.
#[derive(Debug, Clone)]
pub struct Road {
    pub id: RoadId,
    /// Boundary label, `"<a>-<b>"`. Used only in diagnostics.
    pub name: String,
    pub node_a: IntersectionId,
    pub node_b: IntersectionId,
    polyline: Vec<Point>,
    path_length: f64,
    /// Per-segment cumulative length fractions `(start, end)` of the path.
    segment_fracs: Vec<(f64, f64)>,
    static_cost_fwd: f64,
    static_cost_bck: f64,
    dyn_cost_fwd: f64,
    dyn_cost_bck: f64,
    last_refresh: f64,
    lane_fwd: HashMap<VehicleId, f64>,
    lane_bck: HashMap<VehicleId, f64>,
    last_entered_fwd: Option<VehicleId>,
    last_entered_bck: Option<VehicleId>,
}

impl Road {
    pub(crate) fn new(
        id: RoadId,
        name: String,
        node_a: IntersectionId,
        node_b: IntersectionId,
        polyline: Vec<Point>,
    ) -> Self {
        debug_assert!(polyline.len() >= 2);
        let mut path_length = 0.0;
        for pair in polyline.windows(2) {
            path_length += pair[0].distance(&pair[1]);
        }
        let path_length = path_length.max(EPSILON);

        let mut segment_fracs = Vec::with_capacity(polyline.len() - 1);
        let mut covered = 0.0;
        for pair in polyline.windows(2) {
            let len = pair[0].distance(&pair[1]);
            segment_fracs.push((covered / path_length, (covered + len) / path_length));
            covered += len;
        }

        Self {
            id,
            name,
            node_a,
            node_b,
            polyline,
            path_length,
            segment_fracs,
            static_cost_fwd: path_length,
            static_cost_bck: path_length,
            dyn_cost_fwd: 0.0,
            dyn_cost_bck: 0.0,
            last_refresh: f64::NEG_INFINITY,
            lane_fwd: HashMap::new(),
            lane_bck: HashMap::new(),
            last_entered_fwd: None,
            last_entered_bck: None,
        }
    }

    pub fn path_length(&self) -> f64 {
        self.path_length
    }

    pub fn polyline(&self) -> &[Point] {
        &self.polyline
    }

    pub fn other_end(&self, node: IntersectionId) -> IntersectionId {
        if node == self.node_a {
            self.node_b
        } else {
            self.node_a
        }
    }

    /// Places a vehicle on the lane belonging to `from`: the forward lane at
    /// position 0 when entering at endpoint A, the backward lane at
    /// `path_length` when entering at endpoint B. `None` if `from` is not an
    /// endpoint of this road.
    pub fn enter(&mut self, vehicle: VehicleId, from: IntersectionId) -> Option<LaneEntry> {
        if from == self.node_a {
            debug_assert!(!self.lane_bck.contains_key(&vehicle));
            self.lane_fwd.insert(vehicle, 0.0);
            let ahead = self.last_entered_fwd.replace(vehicle);
            Some(LaneEntry {
                ahead,
                position: 0.0,
                direction: 1,
                segment: 0,
            })
        } else if from == self.node_b {
            debug_assert!(!self.lane_fwd.contains_key(&vehicle));
            self.lane_bck.insert(vehicle, self.path_length);
            let ahead = self.last_entered_bck.replace(vehicle);
            Some(LaneEntry {
                ahead,
                position: self.path_length,
                direction: -1,
                segment: self.segment_fracs.len() - 1,
            })
        } else {
            None
        }
    }

    /// Records a vehicle's new position, clamped to `[0, path_length]`, and
    /// steps its segment index across boundary fractions. On reaching the
    /// lane's end bound the vehicle is removed and the exit node reported.
    pub fn advance_position(
        &mut self,
        vehicle: VehicleId,
        new_position: f64,
        segment: usize,
    ) -> Advance {
        let last_segment = self.segment_fracs.len() - 1;
        let segment = segment.min(last_segment);

        if !new_position.is_finite() {
            let current = self
                .lane_fwd
                .get(&vehicle)
                .or_else(|| self.lane_bck.get(&vehicle));
            let Some(&current) = current else {
                return Advance::Unknown;
            };
            warn!(
                "{}",
                SimError::InvalidPosition {
                    road: self.name.clone(),
                    position: new_position,
                }
            );
            return Advance::Moving {
                position: current,
                segment,
            };
        }

        let position = new_position.clamp(0.0, self.path_length);
        let fraction = position / self.path_length;

        if self.lane_bck.contains_key(&vehicle) {
            self.lane_bck.insert(vehicle, position);
            let segment = if fraction <= self.segment_fracs[segment].0 {
                segment.saturating_sub(1)
            } else {
                segment
            };
            if position <= 0.0 {
                self.lane_bck.remove(&vehicle);
                if self.last_entered_bck == Some(vehicle) {
                    self.last_entered_bck = None;
                }
                return Advance::Exited { node: self.node_a };
            }
            Advance::Moving { position, segment }
        } else if self.lane_fwd.contains_key(&vehicle) {
            self.lane_fwd.insert(vehicle, position);
            let segment = if fraction >= self.segment_fracs[segment].1 {
                (segment + 1).min(last_segment)
            } else {
                segment
            };
            if position >= self.path_length {
                self.lane_fwd.remove(&vehicle);
                if self.last_entered_fwd == Some(vehicle) {
                    self.last_entered_fwd = None;
                }
                return Advance::Exited { node: self.node_b };
            }
            Advance::Moving { position, segment }
        } else {
            Advance::Unknown
        }
    }

    /// Snapshots both lanes in travel-direction order and derives each
    /// occupant's ahead reference: the next entry in the sorted lane, none
    /// for the lane leader.
    ///
    /// Must run for every road before any vehicle on it computes kinematics
    /// for the tick; the world enforces this with a global recompute phase.
    pub fn ahead_assignments(&self) -> Vec<(VehicleId, Option<VehicleId>)> {
        let mut out = Vec::with_capacity(self.lane_fwd.len() + self.lane_bck.len());

        let mut fwd: Vec<(VehicleId, f64)> =
            self.lane_fwd.iter().map(|(v, p)| (*v, *p)).collect();
        fwd.sort_by_key(|(_, pos)| OrderedFloat(*pos));
        for (idx, (vehicle, _)) in fwd.iter().enumerate() {
            out.push((*vehicle, fwd.get(idx + 1).map(|(next, _)| *next)));
        }

        let mut bck: Vec<(VehicleId, f64)> =
            self.lane_bck.iter().map(|(v, p)| (*v, *p)).collect();
        bck.sort_by_key(|(_, pos)| Reverse(OrderedFloat(*pos)));
        for (idx, (vehicle, _)) in bck.iter().enumerate() {
            out.push((*vehicle, bck.get(idx + 1).map(|(next, _)| *next)));
        }

        out
    }

    /// The occupants of the lane entered from `from`, unordered.
    pub fn lane_vehicles(&self, from: IntersectionId) -> Vec<(VehicleId, f64)> {
        self.lane_for(from).iter().map(|(v, p)| (*v, *p)).collect()
    }

    pub fn occupant_count(&self) -> usize {
        self.lane_fwd.len() + self.lane_bck.len()
    }

    fn lane_for(&self, from: IntersectionId) -> &HashMap<VehicleId, f64> {
        if from == self.node_a {
            &self.lane_fwd
        } else {
            &self.lane_bck
        }
    }

    /// Recomputes both directional congestion costs when the refresh
    /// interval has elapsed on the supplied clock.
    pub(crate) fn refresh_dynamic_cost(
        &mut self,
        clock: f64,
        vehicles: &HashMap<VehicleId, Vehicle>,
        tuning: &SimTuning,
        dt: f64,
    ) {
        if clock - self.last_refresh < tuning.cost_refresh_interval {
            return;
        }
        self.dyn_cost_fwd = self.dynamic_cost(self.node_a, vehicles, tuning, dt);
        self.dyn_cost_bck = self.dynamic_cost(self.node_b, vehicles, tuning, dt);
        self.last_refresh = clock;
    }

    /// The congestion penalty for traversing this road from `from`:
    /// a density term, an inverse-average-velocity term from the occupants'
    /// smoothed position history, and a clearance term proportional to
    /// density times the mean inverse gap between consecutive occupants.
    /// Terms with zero samples are omitted, not NaN.
    pub fn dynamic_cost(
        &self,
        from: IntersectionId,
        vehicles: &HashMap<VehicleId, Vehicle>,
        tuning: &SimTuning,
        dt: f64,
    ) -> f64 {
        let lane = self.lane_for(from);

        let mut velocity_sum = 0.0;
        let mut velocity_samples = 0u32;
        let mut inv_gap_sum = 0.0;
        let mut gap_samples = 0u32;

        for (vehicle_id, position) in lane {
            let Some(vehicle) = vehicles.get(vehicle_id) else {
                continue;
            };
            if let Some(velocity) = vehicle.smoothed_velocity(COST_LOOKBACK_FRAMES, dt) {
                velocity_sum += velocity;
                velocity_samples += 1;
            }
            if let Some(ahead_pos) = vehicle.ahead_id().and_then(|ahead| lane.get(&ahead)) {
                inv_gap_sum += 1.0 / (EPSILON + (position - ahead_pos).abs());
                gap_samples += 1;
            }
        }

        let density = lane.len() as f64 / self.path_length;
        let mut cost = tuning.density_coeff * density;
        if velocity_samples > 0 {
            let avg_velocity = velocity_sum / f64::from(velocity_samples);
            cost += tuning.velocity_coeff / (EPSILON + avg_velocity);
        }
        if gap_samples > 0 && inv_gap_sum.is_finite() {
            cost += tuning.density_coeff
                * density
                * tuning.clearance_coeff
                * (inv_gap_sum / f64::from(gap_samples));
        }
        cost
    }

    /// Full traversal cost from `from`: the static geometric cost plus, in
    /// adaptive mode, the most recently refreshed congestion cost.
    pub fn cost(&self, from: IntersectionId, mode: RoutingMode) -> f64 {
        let (static_cost, dyn_cost) = if from == self.node_a {
            (self.static_cost_fwd, self.dyn_cost_fwd)
        } else {
            (self.static_cost_bck, self.dyn_cost_bck)
        };
        match mode {
            RoutingMode::Static => static_cost,
            RoutingMode::Adaptive => static_cost + dyn_cost,
        }
    }

    /// Projects a scalar position within a segment onto world coordinates.
    pub fn project(&self, position: f64, segment: usize) -> Point {
        let segment = segment.min(self.segment_fracs.len() - 1);
        let (start, end) = self.segment_fracs[segment];
        let fraction = (position / self.path_length).clamp(0.0, 1.0);
        let t = if end - start < EPSILON {
            0.0
        } else {
            ((fraction - start) / (end - start)).clamp(0.0, 1.0)
        };
        self.polyline[segment].lerp(&self.polyline[segment + 1], t)
    }
}
