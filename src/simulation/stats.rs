//! Aggregate simulation statistics
//!
//! Running sums updated on each vehicle retirement. Travel-time breakdowns
//! per (origin, destination) pair are kept only for trips between major-tier
//! intersections, which are the pairs the routing comparison cares about.

use std::collections::HashMap;

use super::types::IntersectionId;

#[derive(Debug, Clone, Copy, Default)]
struct PairTimes {
    sum: f64,
    count: u64,
}

/// Cumulative statistics for one simulation world.
#[derive(Debug, Clone, Default)]
pub struct SimStats {
    pub spawned: u64,
    pub completed: u64,
    pub stranded: u64,
    travel_time_sum: f64,
    velocity_sum: f64,
    pair_times: HashMap<(IntersectionId, IntersectionId), PairTimes>,
}

impl SimStats {
    pub fn record_spawn(&mut self) {
        self.spawned += 1;
    }

    pub fn record_stranding(&mut self) {
        self.stranded += 1;
    }

    /// Records a completed trip. `major_pair` is true when both endpoints
    /// are major-tier intersections.
    pub fn record_arrival(
        &mut self,
        origin: IntersectionId,
        destination: IntersectionId,
        major_pair: bool,
        travel_time: f64,
        distance: f64,
    ) {
        self.completed += 1;
        self.travel_time_sum += travel_time;
        if travel_time > 0.0 {
            self.velocity_sum += distance / travel_time;
        }
        if major_pair {
            let pair = self.pair_times.entry((origin, destination)).or_default();
            pair.sum += travel_time;
            pair.count += 1;
        }
    }

    /// Mean travel time over all completed trips.
    pub fn average_travel_time(&self) -> Option<f64> {
        (self.completed > 0).then(|| self.travel_time_sum / self.completed as f64)
    }

    /// Mean of per-trip average velocities over all completed trips.
    pub fn average_velocity(&self) -> Option<f64> {
        (self.completed > 0).then(|| self.velocity_sum / self.completed as f64)
    }

    /// Completed trips per simulated second.
    pub fn throughput(&self, clock: f64) -> f64 {
        if clock > 0.0 {
            self.completed as f64 / clock
        } else {
            0.0
        }
    }

    /// Mean travel time for one major-tier pair, if any trip completed.
    pub fn pair_average(
        &self,
        origin: IntersectionId,
        destination: IntersectionId,
    ) -> Option<f64> {
        self.pair_times
            .get(&(origin, destination))
            .filter(|pair| pair.count > 0)
            .map(|pair| pair.sum / pair.count as f64)
    }

    /// All recorded major-tier pairs with their mean travel time and count.
    pub fn pair_averages(
        &self,
    ) -> impl Iterator<Item = ((IntersectionId, IntersectionId), f64, u64)> + '_ {
        self.pair_times
            .iter()
            .filter(|(_, pair)| pair.count > 0)
            .map(|(key, pair)| (*key, pair.sum / pair.count as f64, pair.count))
    }
}
