//! Lifecycle and lane-engine tests
//!
//! Seeded worlds driven tick by tick, asserting the invariants the lane
//! engine and lifecycle manager must hold at every step.

use std::collections::{HashMap, HashSet};

use smart_traffic::simulation::{
    Advance, IntersectionSpec, MapDescription, Point, RoadSpec, SimTuning, SimWorld, VehicleId,
};

/// One straight 200-unit road between two major intersections.
fn two_node_map() -> MapDescription {
    MapDescription {
        intersections: vec![
            IntersectionSpec::major("a", 0.0, 0.0),
            IntersectionSpec::major("b", 200.0, 0.0),
        ],
        roads: vec![RoadSpec::new("a", "b")],
    }
}

#[test]
fn single_vehicle_completes_in_expected_time() {
    let mut world = SimWorld::from_map_seeded(&two_node_map(), 42);
    world.tuning = SimTuning::deterministic();

    let a = world.network.by_name("a").unwrap();
    let b = world.network.by_name("b").unwrap();
    let entered = world.spawn_vehicles(1, Some(a), Some(b));
    assert_eq!(entered.len(), 1);

    let vehicle = world.vehicle(entered[0]).unwrap();
    assert_eq!(vehicle.direction, 1);
    let expected_secs = 200.0 / vehicle.max_velocity();

    let dt = 0.05;
    let ticks = (expected_secs / dt).ceil() as usize + 10;
    for _ in 0..ticks {
        world.tick(dt);
    }

    assert_eq!(world.stats.completed, 1);
    assert_eq!(world.stats.stranded, 0);
    assert_eq!(world.active_count(), 0);

    let recorded = world.stats.average_travel_time().unwrap();
    assert!(
        (recorded - expected_secs).abs() <= expected_secs * 0.05 + 2.0 * dt,
        "travel time {recorded} vs expected {expected_secs}"
    );
}

#[test]
fn forward_entry_exits_at_far_endpoint() {
    let mut world = SimWorld::from_map_seeded(&two_node_map(), 1);
    let a = world.network.by_name("a").unwrap();
    let b = world.network.by_name("b").unwrap();
    let road_id = world.network.road_between(a, b).unwrap();
    let road = world.network.road_mut(road_id);

    let vehicle = VehicleId(7);
    let entry = road.enter(vehicle, a).unwrap();
    assert_eq!(entry.position, 0.0);
    assert_eq!(entry.direction, 1);
    assert!(entry.ahead.is_none());

    match road.advance_position(vehicle, 500.0, entry.segment) {
        Advance::Exited { node } => assert_eq!(node, b),
        other => panic!("expected exit at far endpoint, got {other:?}"),
    }
}

#[test]
fn backward_entry_exits_at_near_endpoint() {
    let mut world = SimWorld::from_map_seeded(&two_node_map(), 1);
    let a = world.network.by_name("a").unwrap();
    let b = world.network.by_name("b").unwrap();
    let road_id = world.network.road_between(a, b).unwrap();
    let road = world.network.road_mut(road_id);

    let vehicle = VehicleId(8);
    let entry = road.enter(vehicle, b).unwrap();
    assert_eq!(entry.position, road.path_length());
    assert_eq!(entry.direction, -1);

    match road.advance_position(vehicle, -1.0, entry.segment) {
        Advance::Exited { node } => assert_eq!(node, a),
        other => panic!("expected exit at near endpoint, got {other:?}"),
    }
}

#[test]
fn out_of_domain_positions_are_clamped_not_fatal() {
    let mut world = SimWorld::from_map_seeded(&two_node_map(), 1);
    let a = world.network.by_name("a").unwrap();
    let b = world.network.by_name("b").unwrap();
    let road_id = world.network.road_between(a, b).unwrap();
    let road = world.network.road_mut(road_id);

    let vehicle = VehicleId(9);
    let entry = road.enter(vehicle, a).unwrap();

    // Below-domain positions clamp to the entry bound without exiting.
    match road.advance_position(vehicle, -25.0, entry.segment) {
        Advance::Moving { position, .. } => assert_eq!(position, 0.0),
        other => panic!("expected clamped move, got {other:?}"),
    }

    // Non-finite input leaves the previous position untouched.
    match road.advance_position(vehicle, f64::NAN, entry.segment) {
        Advance::Moving { position, .. } => assert_eq!(position, 0.0),
        other => panic!("expected unchanged move, got {other:?}"),
    }
}

#[test]
fn polyline_road_is_traversed_segment_by_segment() {
    // An L-shaped road: (0,0) -> (100,0) -> (100,100), total length 200.
    let map = MapDescription {
        intersections: vec![
            IntersectionSpec::major("a", 0.0, 0.0),
            IntersectionSpec::major("b", 100.0, 100.0),
        ],
        roads: vec![RoadSpec::with_waypoints(
            "a",
            "b",
            vec![Point::new(100.0, 0.0)],
        )],
    };
    let mut world = SimWorld::from_map_seeded(&map, 21);
    world.tuning = SimTuning::deterministic();

    let a = world.network.by_name("a").unwrap();
    let b = world.network.by_name("b").unwrap();
    let road_id = world.network.road_between(a, b).unwrap();
    assert!((world.network.road(road_id).path_length() - 200.0).abs() < 1e-9);

    let entered = world.spawn_vehicles(1, Some(a), Some(b));
    assert_eq!(entered.len(), 1);

    let dt = 0.05;
    for _ in 0..2000 {
        // Every snapshot stays on one of the two legs of the polyline.
        for snapshot in world.vehicle_snapshots() {
            let on_first_leg = snapshot.y.abs() < 1e-6 && (0.0..=100.0).contains(&snapshot.x);
            let on_second_leg =
                (snapshot.x - 100.0).abs() < 1e-6 && (0.0..=100.0).contains(&snapshot.y);
            assert!(
                on_first_leg || on_second_leg,
                "snapshot ({}, {}) off the polyline",
                snapshot.x,
                snapshot.y
            );
        }
        world.tick(dt);
        if world.stats.completed == 1 {
            break;
        }
    }
    assert_eq!(world.stats.completed, 1);
}

#[test]
fn lane_invariants_hold_every_tick() {
    let mut world = SimWorld::demo_with_seed(1234);

    for _ in 0..400 {
        world.tick(0.1);

        let mut memberships: HashMap<VehicleId, usize> = HashMap::new();
        for road in world.network.roads() {
            let fwd = road.lane_vehicles(road.node_a);
            let bck = road.lane_vehicles(road.node_b);

            // Lane id sets are disjoint.
            let fwd_ids: HashSet<VehicleId> = fwd.iter().map(|(id, _)| *id).collect();
            let bck_ids: HashSet<VehicleId> = bck.iter().map(|(id, _)| *id).collect();
            assert!(fwd_ids.is_disjoint(&bck_ids), "lanes share a vehicle");

            assert_eq!(road.occupant_count(), fwd.len() + bck.len());

            // Positions stay within the path domain.
            for (_, position) in fwd.iter().chain(bck.iter()) {
                assert!(
                    (0.0..=road.path_length()).contains(position),
                    "position {position} outside [0, {}]",
                    road.path_length()
                );
            }

            for id in fwd_ids.iter().chain(bck_ids.iter()) {
                *memberships.entry(*id).or_insert(0) += 1;
            }

            // Ahead chains never loop back within a lane.
            let assignments: HashMap<VehicleId, Option<VehicleId>> =
                road.ahead_assignments().into_iter().collect();
            for start in assignments.keys() {
                let mut visited = HashSet::new();
                let mut current = *start;
                while let Some(Some(next)) = assignments.get(&current) {
                    assert!(
                        visited.insert(current),
                        "ahead chain loops at {current:?} on road '{}'",
                        road.name
                    );
                    current = *next;
                }
            }
        }

        // A vehicle occupies at most one lane of one road, and every lane
        // occupant is an active vehicle.
        for (id, count) in &memberships {
            assert_eq!(*count, 1, "vehicle {id:?} on {count} lanes");
            assert!(world.vehicles.contains_key(id));
        }
    }
}

#[test]
fn tier_bias_favors_major_intersections() {
    let mut world = SimWorld::demo_with_seed(2024);
    world.tuning = SimTuning::deterministic();

    let entered = world.spawn_vehicles(300, None, None);
    assert!(entered.len() > 250, "too few spawns: {}", entered.len());

    let major_origins = entered
        .iter()
        .filter(|id| {
            let origin = world.vehicle(**id).unwrap().origin;
            world.network.intersection(origin).major
        })
        .count();

    let fraction = major_origins as f64 / entered.len() as f64;
    assert!(
        (0.5..0.8).contains(&fraction),
        "major-origin fraction {fraction} outside expected band"
    );
}

#[test]
fn retirement_accounting_balances() {
    let mut world = SimWorld::demo_with_seed(77);

    for _ in 0..600 {
        world.tick(0.1);
    }

    assert!(world.stats.spawned > 0);
    assert_eq!(
        world.stats.spawned,
        world.stats.completed + world.stats.stranded + world.active_count() as u64
    );
    // The demo map is fully connected, so trips complete.
    assert!(world.stats.completed > 0);
    assert!(world.stats.average_travel_time().is_some());

    for ((origin, destination), average, count) in world.stats.pair_averages() {
        assert!(world.network.intersection(origin).major);
        assert!(world.network.intersection(destination).major);
        assert!(count > 0);
        assert_eq!(world.stats.pair_average(origin, destination), Some(average));
    }
}

#[test]
fn snapshots_cover_active_vehicles_within_map_bounds() {
    let mut world = SimWorld::demo_with_seed(5);

    for _ in 0..200 {
        world.tick(0.1);
    }

    let snapshots = world.vehicle_snapshots();
    assert_eq!(snapshots.len(), world.active_count());

    for snapshot in snapshots {
        assert!((43.0..=609.0).contains(&snapshot.x), "x {}", snapshot.x);
        assert!((161.0..=440.0).contains(&snapshot.y), "y {}", snapshot.y);
        assert!(snapshot.direction == 1 || snapshot.direction == -1);
    }
}
