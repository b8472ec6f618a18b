//! Routing engine
//!
//! A recursive exhaustive search for the least-cost next hop between two
//! intersections. Candidate roads are the query node's incident roads minus
//! the road the caller just traversed and every road already on the current
//! recursion path — edges are never revisited within one query, but distinct
//! paths through the same node are still explored, so the worst case is
//! exponential. Results are memoized per intersection and destination,
//! bounded by the cost-refresh interval.
//!
//! Entries are deliberately not consulted at interior recursion nodes: a memo
//! computed under one exclusion set can be illegal under another, so only
//! whole-query answers are cached.

use super::topology::{CacheEntry, RoadNetwork};
use super::tuning::{RoutingMode, SimTuning};
use super::types::{IntersectionId, RoadId};

/// The least-cost first hop from `from` towards `to`, excluding the road the
/// vehicle arrived on. `None` means no route exists (the caller strands the
/// vehicle) or that the query is degenerate (`from == to`).
pub fn best_route(
    network: &mut RoadNetwork,
    from: IntersectionId,
    to: IntersectionId,
    exclude: Option<RoadId>,
    clock: f64,
    tuning: &SimTuning,
) -> Option<RoadId> {
    if from == to {
        return None;
    }

    if let Some(entry) = network.intersection(from).cached_route(to) {
        let fresh = clock - entry.timestamp < tuning.cost_refresh_interval;
        // A cached next hop equal to the excluded road would send the caller
        // straight back where it came from; recompute instead.
        if entry.cost.is_finite() && fresh && Some(entry.road) != exclude {
            return Some(entry.road);
        }
    }

    let mut visited: Vec<RoadId> = exclude.into_iter().collect();
    let (cost, road) = route_cost(network, from, to, &mut visited, tuning.routing_mode);
    match road {
        Some(road) if cost.is_finite() => {
            network.intersection_mut(from).store_route(
                to,
                CacheEntry {
                    cost,
                    road,
                    timestamp: clock,
                },
            );
            Some(road)
        }
        _ => None,
    }
}

/// Exhaustive least-cost search. Returns the total cost and the incident
/// road achieving it; `(+inf, None)` when no eligible road leads to `to`.
pub fn route_cost(
    network: &RoadNetwork,
    from: IntersectionId,
    to: IntersectionId,
    visited: &mut Vec<RoadId>,
    mode: RoutingMode,
) -> (f64, Option<RoadId>) {
    if from == to {
        return (0.0, None);
    }

    let mut lowest = f64::INFINITY;
    let mut best = None;
    for road_id in network.incident_roads(from) {
        if visited.contains(&road_id) {
            continue;
        }
        let road = network.road(road_id);
        let other_end = road.other_end(from);

        visited.push(road_id);
        let (tail, _) = route_cost(network, other_end, to, visited, mode);
        visited.pop();

        // NaN totals compare false here and so can never win the minimum.
        let total = road.cost(from, mode) + tail;
        if total < lowest {
            lowest = total;
            best = Some(road_id);
        }
    }
    (lowest, best)
}

/// The static-geometry distance between two intersections, ignoring
/// congestion and the exclusion rule. Telemetry uses this to compare
/// adaptive route quality against the plain shortest path.
pub fn shortest_dist(network: &RoadNetwork, from: IntersectionId, to: IntersectionId) -> f64 {
    route_cost(network, from, to, &mut Vec::new(), RoutingMode::Static).0
}
