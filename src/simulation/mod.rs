//! Standalone traffic simulation core
//!
//! This module contains the routing/cost engine, the per-road lane
//! microsimulation and the vehicle lifecycle orchestration. It has no
//! rendering or I/O dependencies and can be driven headless, one discrete
//! tick at a time.

mod error;
mod road;
mod routing;
mod stats;
mod topology;
mod tuning;
mod types;
mod vehicle;
mod world;

pub use error::{SimError, SimResult};
pub use road::{Advance, LaneEntry, Road};
pub use routing::{best_route, route_cost, shortest_dist};
pub use stats::SimStats;
pub use topology::{Intersection, RoadNetwork};
pub use tuning::{RoutingMode, SimTuning};
pub use types::{
    IntersectionId, IntersectionSpec, MapDescription, Point, RoadId, RoadSpec, VehicleId,
};
pub use vehicle::{KinematicParams, UpdateOutcome, Vehicle};
pub use world::{SimWorld, VehicleSnapshot};
