//! Topology store: the intersection/road graph
//!
//! Owns every intersection and road and the petgraph adjacency between them.
//! Entities are created once at map-build time and are immutable afterwards;
//! the only mutable state living here is the per-intersection route-cost
//! cache, which an external editor must wipe via [`RoadNetwork::clear_route_caches`]
//! after any structural change.

use log::warn;
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use std::collections::HashMap;

use super::error::{SimError, SimResult};
use super::road::Road;
use super::types::{IntersectionId, MapDescription, Point, RoadId};

/// A memoized routing answer held by an intersection for one destination.
///
/// Usable only while `cost` is finite and the entry is younger than the
/// cost-refresh interval; non-finite results are never stored.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CacheEntry {
    pub cost: f64,
    pub road: RoadId,
    pub timestamp: f64,
}

/// A node of the road network.
#[derive(Debug, Clone)]
pub struct Intersection {
    pub id: IntersectionId,
    pub name: String,
    pub position: Point,
    /// Spawn tier: major intersections attract the bulk of trips.
    pub major: bool,
    node: NodeIndex,
    route_cache: HashMap<IntersectionId, CacheEntry>,
}

impl Intersection {
    pub(crate) fn cached_route(&self, destination: IntersectionId) -> Option<&CacheEntry> {
        self.route_cache.get(&destination)
    }

    pub(crate) fn store_route(&mut self, destination: IntersectionId, entry: CacheEntry) {
        self.route_cache.insert(destination, entry);
    }
}

/// The road network graph.
///
/// Intersections and roads are addressed by dense integer ids; the name→id
/// lookup exists only for the construction boundary and for diagnostics.
#[derive(Debug, Default)]
pub struct RoadNetwork {
    /// Adjacency; node weights are intersection ids, edge weights road ids.
    graph: UnGraph<IntersectionId, RoadId>,
    intersections: Vec<Intersection>,
    roads: Vec<Road>,
    names: HashMap<String, IntersectionId>,
    /// Canonically ordered endpoint pairs, to reject duplicate roads.
    road_pairs: HashMap<(IntersectionId, IntersectionId), RoadId>,
}

impl RoadNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a network from a map description. Roads with unknown or
    /// duplicate endpoints are logged and skipped; the build never fails.
    pub fn from_map(map: &MapDescription) -> Self {
        let mut network = Self::new();
        for spec in &map.intersections {
            network.add_intersection(&spec.name, spec.position, spec.weight);
        }
        for spec in &map.roads {
            if let Err(err) = network.add_road(&spec.a, &spec.b, &spec.waypoints) {
                warn!("skipping road '{}-{}': {}", spec.a, spec.b, err);
            }
        }
        network
    }

    /// Registers a node. A repeated name keeps the first registration.
    pub fn add_intersection(
        &mut self,
        name: &str,
        position: Point,
        weight: Option<f64>,
    ) -> IntersectionId {
        if let Some(existing) = self.names.get(name) {
            warn!("intersection '{}' already exists", name);
            return *existing;
        }

        let id = IntersectionId(self.intersections.len());
        let node = self.graph.add_node(id);
        self.intersections.push(Intersection {
            id,
            name: name.to_string(),
            position,
            major: weight.is_some_and(|w| w > 0.0),
            node,
            route_cache: HashMap::new(),
        });
        self.names.insert(name.to_string(), id);
        id
    }

    /// Registers a road between two named intersections, with an optional
    /// polyline of interior waypoints.
    pub fn add_road(&mut self, a: &str, b: &str, waypoints: &[Point]) -> SimResult<RoadId> {
        let ia = self
            .by_name(a)
            .ok_or_else(|| SimError::UnknownEndpoint(a.to_string()))?;
        let ib = self
            .by_name(b)
            .ok_or_else(|| SimError::UnknownEndpoint(b.to_string()))?;

        let pair = (ia.min(ib), ia.max(ib));
        if self.road_pairs.contains_key(&pair) {
            return Err(SimError::DuplicateRoad {
                a: a.to_string(),
                b: b.to_string(),
            });
        }

        let mut polyline = Vec::with_capacity(waypoints.len() + 2);
        polyline.push(self.intersections[ia.0].position);
        polyline.extend_from_slice(waypoints);
        polyline.push(self.intersections[ib.0].position);

        let id = RoadId(self.roads.len());
        self.roads
            .push(Road::new(id, format!("{}-{}", a, b), ia, ib, polyline));
        self.graph.add_edge(
            self.intersections[ia.0].node,
            self.intersections[ib.0].node,
            id,
        );
        self.road_pairs.insert(pair, id);
        Ok(id)
    }

    /// Wipes every intersection's route-cost cache. Must be called by an
    /// external editor after any structural change to the map.
    pub fn clear_route_caches(&mut self) {
        for intersection in &mut self.intersections {
            intersection.route_cache.clear();
        }
    }

    pub fn by_name(&self, name: &str) -> Option<IntersectionId> {
        self.names.get(name).copied()
    }

    pub fn intersection(&self, id: IntersectionId) -> &Intersection {
        &self.intersections[id.0]
    }

    pub(crate) fn intersection_mut(&mut self, id: IntersectionId) -> &mut Intersection {
        &mut self.intersections[id.0]
    }

    pub fn road(&self, id: RoadId) -> &Road {
        &self.roads[id.0]
    }

    pub fn road_mut(&mut self, id: RoadId) -> &mut Road {
        &mut self.roads[id.0]
    }

    /// The road connecting two intersections, if one exists.
    pub fn road_between(&self, a: IntersectionId, b: IntersectionId) -> Option<RoadId> {
        self.road_pairs.get(&(a.min(b), a.max(b))).copied()
    }

    /// The roads incident to an intersection, in adjacency order.
    pub fn incident_roads(&self, id: IntersectionId) -> Vec<RoadId> {
        self.graph
            .edges(self.intersections[id.0].node)
            .map(|edge| *edge.weight())
            .collect()
    }

    pub fn intersections(&self) -> impl Iterator<Item = &Intersection> {
        self.intersections.iter()
    }

    pub fn roads(&self) -> impl Iterator<Item = &Road> {
        self.roads.iter()
    }

    pub(crate) fn roads_mut(&mut self) -> impl Iterator<Item = &mut Road> {
        self.roads.iter_mut()
    }

    pub fn intersection_count(&self) -> usize {
        self.intersections.len()
    }

    pub fn road_count(&self) -> usize {
        self.roads.len()
    }

    /// Static geometry for rendering collaborators: road id and polyline.
    /// Two calls with no intervening topology edit return identical data.
    pub fn road_geometries(&self) -> impl Iterator<Item = (RoadId, &[Point])> {
        self.roads.iter().map(|road| (road.id, road.polyline()))
    }
}
