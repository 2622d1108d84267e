//! Shortest-path routing validation

use rand::rngs::StdRng;
use rand::SeedableRng;
use route_sim::simulation::{
    generate_map, MapProfile, Position, SimConfig, SimId, SimWorld, VehicleId, NO_CONNECTION,
};

const EPSILON: f64 = 1e-6;

fn random_world(seed: u64) -> SimWorld {
    let mut world = SimWorld::new();
    let mut rng = StdRng::seed_from_u64(seed);
    let profile = MapProfile {
        rows: 3,
        cols: 4,
        ..MapProfile::default()
    };
    generate_map(&mut world, &profile, &mut rng).expect("map generation should succeed");
    world
}

#[test]
fn test_diagonal_is_zero_and_triangle_inequality_holds() {
    let world = random_world(11);
    let matrix = world.routing.live();
    let n = matrix.node_count();
    assert!(n > 0);

    for i in 0..n {
        assert_eq!(matrix.time_at(i, i), 0.0);
    }
    for i in 0..n {
        for j in 0..n {
            for k in 0..n {
                let direct = matrix.time_at(i, j);
                let through = matrix.time_at(i, k) + matrix.time_at(k, j);
                assert!(
                    direct <= through + EPSILON,
                    "time[{}][{}]={} exceeds {} through {}",
                    i,
                    j,
                    direct,
                    through,
                    k
                );
            }
        }
    }
}

#[test]
fn test_next_edge_lies_on_a_shortest_path() {
    let world = random_world(5);
    let matrix = world.routing.live();
    let nodes = matrix.nodes().to_vec();

    for &a in &nodes {
        for &b in &nodes {
            if a == b || !matrix.is_reachable(a, b).unwrap() {
                continue;
            }
            let edge_id = world
                .routing
                .find_next_edge(a, b)
                .unwrap()
                .expect("reachable pair must have a next edge");
            let edge = world.road_network.edge(edge_id).unwrap();
            assert_eq!(edge.begin, a);

            let p = edge.end;
            let remaining = matrix.time(p, b).unwrap();
            let expected = matrix.time(a, b).unwrap() - matrix.time(a, p).unwrap();
            assert!(
                (remaining - expected).abs() < EPSILON,
                "time[p][b]={} but time[a][b]-time[a][p]={}",
                remaining,
                expected
            );
        }
    }
}

#[test]
fn test_one_way_edge_is_unreachable_backwards() {
    let mut world = SimWorld::new();
    let a = world.add_site("a", Position::new(0.0, 0.0)).unwrap();
    let b = world.add_site("b", Position::new(100.0, 0.0)).unwrap();
    let edge = world.add_edge(a, b, 10.0, 0).unwrap();

    assert_eq!(world.routing.find_next_edge(a, b).unwrap(), Some(edge));
    assert_eq!(world.routing.find_next_edge(b, a).unwrap(), None);
    assert_eq!(world.routing.find_next_edge(a, a).unwrap(), None);
    assert_eq!(world.routing.transit_time(b, a).unwrap(), NO_CONNECTION);
    assert!((world.routing.expected_time(a, b).unwrap() - 10.0).abs() < EPSILON);
}

#[test]
fn test_cheapest_parallel_edge_is_used() {
    let mut world = SimWorld::new();
    let a = world.add_site("a", Position::new(0.0, 0.0)).unwrap();
    let b = world.add_site("b", Position::new(100.0, 0.0)).unwrap();
    world.add_edge(a, b, 10.0, 0).unwrap();
    let fast = world.add_edge(a, b, 20.0, 0).unwrap();

    assert_eq!(world.routing.find_next_edge(a, b).unwrap(), Some(fast));
    assert!((world.routing.expected_time(a, b).unwrap() - 5.0).abs() < EPSILON);
}

#[test]
fn test_multi_hop_route_walks_predecessors() {
    let mut world = SimWorld::new();
    let a = world.add_site("a", Position::new(0.0, 0.0)).unwrap();
    let x = world.add_cross_node("x", Position::new(100.0, 0.0)).unwrap();
    let y = world.add_cross_node("y", Position::new(200.0, 0.0)).unwrap();
    let b = world.add_site("b", Position::new(300.0, 0.0)).unwrap();
    let first = world.add_edge(a, x, 10.0, 0).unwrap();
    let second = world.add_edge(x, y, 10.0, 0).unwrap();
    world.add_edge(y, b, 10.0, 0).unwrap();

    assert_eq!(world.routing.find_next_edge(a, b).unwrap(), Some(first));
    assert_eq!(world.routing.find_next_edge(x, b).unwrap(), Some(second));
    assert!((world.routing.transit_time(a, b).unwrap() - 30.0).abs() < EPSILON);
}

#[test]
fn test_congestion_diverts_live_route_but_not_baseline() {
    let mut world = SimWorld::new();
    let a = world.add_site("a", Position::new(0.0, 0.0)).unwrap();
    let b = world.add_cross_node("b", Position::new(50.0, 10.0)).unwrap();
    let c = world.add_site("c", Position::new(100.0, 0.0)).unwrap();
    let direct = world.add_edge(a, c, 10.0, 0).unwrap();
    let detour = world.add_edge(a, b, 10.0, 0).unwrap();
    world.add_edge(b, c, 10.0, 0).unwrap();

    assert_eq!(world.routing.find_next_edge(a, c).unwrap(), Some(direct));

    // Ten vehicles spread over 100 m leave a 10 m gap each
    for i in 0..10 {
        world
            .road_network
            .place_vehicle(direct, VehicleId(SimId(i)), i as f64 * 10.0)
            .unwrap();
    }
    let config = SimConfig::default();
    world.road_network.refresh_transit_times(&config);
    world.routing.rebuild(&world.road_network);

    assert!((world.road_network.edge(direct).unwrap().transit_time - 20.0).abs() < EPSILON);
    assert_eq!(world.routing.find_next_edge(a, c).unwrap(), Some(detour));
    assert!((world.routing.expected_time(a, c).unwrap() - 10.0).abs() < EPSILON);
}

#[test]
fn test_stale_node_handle_is_an_error() {
    let mut world = SimWorld::new();
    let a = world.add_site("a", Position::new(0.0, 0.0)).unwrap();
    let b = world.add_site("b", Position::new(100.0, 0.0)).unwrap();
    let (ab, _) = world.add_two_way_edge(a, b, 10.0, 0).unwrap();

    world.remove_node(b).unwrap();

    assert!(world.routing.find_next_edge(a, b).is_err());
    assert!(world.routing.expected_time(b, a).is_err());

    // The freed slots get reused by the next node and edges
    let c = world.add_site("c", Position::new(100.0, 0.0)).unwrap();
    let (ac, _) = world.add_two_way_edge(a, c, 10.0, 0).unwrap();
    assert_ne!(b, c);
    assert_ne!(ab, ac);

    assert!(world.road_network.node(b).is_none());
    assert_eq!(world.road_network.node(c).unwrap().name, "c");
    assert!(world.routing.find_next_edge(a, b).is_err());
    assert!(world.routing.expected_time(a, b).is_err());
    assert_eq!(world.routing.find_next_edge(a, c).unwrap(), Some(ac));

    assert!(world.road_network.edge(ab).is_none());
    assert!(world.road_network.edge(ac).is_some());
    assert!(world.add_edge(a, b, 10.0, 0).is_err());
    assert!(world.set_demand(a, b, 1.0).is_err());
    assert!(world.remove_edge(ab).is_err());
    assert!(world.remove_node(b).is_err());
    assert_eq!(world.road_network.node_count(), 2);
    assert_eq!(world.road_network.edge_count(), 2);
}
