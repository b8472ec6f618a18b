//! Runtime tuning for the simulation.
//!
//! Every cost and kinematics computation receives an explicit [`SimTuning`]
//! value; there are no process-wide mutable knobs. The composition root owns
//! one instance and may mutate it freely between ticks.

/// Which costs the routing engine considers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoutingMode {
    /// Geometric road length only.
    Static,
    /// Geometric length plus the live congestion penalty.
    #[default]
    Adaptive,
}

/// Mutable-between-ticks simulation parameters.
#[derive(Debug, Clone)]
pub struct SimTuning {
    /// Weight of the occupants-per-length term of the congestion cost.
    pub density_coeff: f64,
    /// Weight of the inverse-average-velocity term of the congestion cost.
    pub velocity_coeff: f64,
    /// Weight of the density × mean-inverse-gap term of the congestion cost.
    pub clearance_coeff: f64,
    /// Global multiplier applied to every tick's time delta. 1 = real time.
    pub time_scale: f64,
    /// Probability that a tick spawns a batch of vehicles.
    pub spawn_probability: f64,
    /// Largest batch a single tick may spawn.
    pub max_spawns_per_tick: usize,
    /// Hard cap on concurrently active vehicles.
    pub max_vehicles: usize,
    /// Static-only versus congestion-aware routing.
    pub routing_mode: RoutingMode,
    /// Seconds between refreshes of per-road dynamic costs; also the
    /// freshness window of per-intersection route caches.
    pub cost_refresh_interval: f64,
    /// Per-tick probability of a random velocity drop per vehicle.
    pub slowdown_probability: f64,
    /// Per-tick probability of a multi-second full stop per vehicle.
    pub halt_probability: f64,
}

impl Default for SimTuning {
    fn default() -> Self {
        Self {
            density_coeff: 200.0,
            velocity_coeff: 60.0,
            clearance_coeff: 0.0,
            time_scale: 1.0,
            spawn_probability: 0.3,
            max_spawns_per_tick: 5,
            max_vehicles: 500,
            routing_mode: RoutingMode::Adaptive,
            cost_refresh_interval: 0.5,
            slowdown_probability: 0.01,
            halt_probability: 0.0002,
        }
    }
}

impl SimTuning {
    /// Tuning with every stochastic perturbation disabled, for reproducible
    /// scenario tests.
    pub fn deterministic() -> Self {
        Self {
            spawn_probability: 0.0,
            slowdown_probability: 0.0,
            halt_probability: 0.0,
            ..Self::default()
        }
    }
}
