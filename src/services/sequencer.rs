//! Greedy nearest-neighbor route planning over active stops
//!
//! The plan starts at the given origin (or at the first active stop in input
//! order when there is no origin) and repeatedly moves to the closest
//! unvisited stop. Ties go to the stop that appears first in the input.
//!
//! This is a heuristic: O(n²) per plan and not guaranteed to find the
//! shortest tour. It is cheap enough to rerun on every position update,
//! which an exact solver is not.

use crate::domain::route::{Route, RouteStop, Waypoints};
use crate::domain::types::{Coordinate, Stop};
use crate::services::geo::distance_meters;
use tracing::debug;

/// Plan a visiting order over all active stops
///
/// Active means coordinate present and status neither delivered nor
/// cancelled. An empty active set yields an empty route. Stops are not
/// modified; visited bookkeeping is local to this call.
pub fn plan_route(origin: Option<Coordinate>, stops: &[Stop], planned_at_ms: u64) -> Route {
    let active: Vec<(&Stop, Coordinate)> =
        stops.iter().filter_map(|s| s.active_coordinate().map(|c| (s, c))).collect();

    let Some(&(_, seed)) = active.first() else {
        return Route::empty(origin, planned_at_ms);
    };

    let mut current = origin.unwrap_or(seed);
    let mut visited = vec![false; active.len()];
    let mut ordered = Vec::with_capacity(active.len());

    for _ in 0..active.len() {
        let mut best: Option<(usize, u32)> = None;
        for (idx, &(_, coord)) in active.iter().enumerate() {
            if visited[idx] {
                continue;
            }
            let d = distance_meters(current, coord);
            match best {
                Some((_, best_d)) if d >= best_d => {}
                _ => best = Some((idx, d)),
            }
        }

        // Loop runs exactly once per unvisited stop
        let Some((idx, leg_m)) = best else {
            break;
        };
        visited[idx] = true;
        let (stop, coord) = active[idx];
        ordered.push(RouteStop { id: stop.id.clone(), coordinate: coord, leg_m });
        current = coord;
    }

    let route = Route { origin, stops: ordered, planned_at_ms };
    debug!(
        stops = %route.len(),
        total_m = %route.total_m(),
        seeded = %origin.is_none(),
        "route_planned"
    );
    route
}

/// Convert a route into the origin/destination/waypoints hand-off structure
///
/// - origin: the planning origin, or the first route stop when there was none
/// - destination: the last route stop
/// - waypoints: the stops strictly between origin and destination, and
///   always empty for routes of two stops or fewer
///
/// Returns `None` for an empty route.
pub fn to_waypoints(route: &Route) -> Option<Waypoints> {
    let last = route.stops.last()?;
    let len = route.stops.len();

    let intermediate: &[RouteStop] = match route.origin {
        _ if len <= 2 => &[],
        // Device position is the origin, every stop but the last is a waypoint
        Some(_) => &route.stops[..len - 1],
        // First stop doubles as the origin
        None => &route.stops[1..len - 1],
    };

    Some(Waypoints {
        origin: route.start()?,
        destination: last.coordinate,
        waypoints: intermediate.iter().map(|s| s.coordinate).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{StopId, StopStatus};
    use std::collections::HashSet;

    fn coord(lat: f64, lon: f64) -> Coordinate {
        Coordinate::new(lat, lon).unwrap()
    }

    fn stop_at(id: &str, lat: f64, lon: f64) -> Stop {
        Stop::new(id, id, "addr").with_coordinate(coord(lat, lon))
    }

    fn order(route: &Route) -> Vec<&str> {
        route.stop_ids().map(StopId::as_str).collect()
    }

    #[test]
    fn test_collinear_stops_visited_outward() {
        let stops = vec![stop_at("P", 0.0, 0.0009), stop_at("Q", 0.0, 0.0003), stop_at("R", 0.0, 0.0006)];

        let route = plan_route(Some(coord(0.0, 0.0)), &stops, 0);

        assert_eq!(order(&route), vec!["Q", "R", "P"]);
        assert_eq!(route.stops[0].leg_m, 33);
        assert_eq!(route.origin, Some(coord(0.0, 0.0)));
    }

    #[test]
    fn test_empty_active_set() {
        let stops = vec![
            Stop::new("none", "n", "none"),
            stop_at("done", 1.0, 1.0).with_status(StopStatus::Delivered),
        ];

        let route = plan_route(Some(coord(0.0, 0.0)), &stops, 7);

        assert!(route.is_empty());
        assert_eq!(route.planned_at_ms, 7);
        assert!(to_waypoints(&route).is_none());
    }

    #[test]
    fn test_route_contains_each_active_stop_once() {
        let stops = vec![
            stop_at("a", 0.01, 0.02),
            stop_at("b", -0.03, 0.01),
            stop_at("c", 0.02, -0.02),
            stop_at("d", 0.0, 0.0).with_status(StopStatus::Cancelled),
            Stop::new("e", "e", "none"),
            stop_at("f", 0.05, 0.05),
            stop_at("g", 0.0, 0.0),
        ];

        let route = plan_route(Some(coord(0.001, 0.001)), &stops, 0);

        let active = stops.iter().filter(|s| s.is_active()).count();
        assert_eq!(route.len(), active);
        let unique: HashSet<_> = route.stop_ids().collect();
        assert_eq!(unique.len(), route.len());
        assert!(!route.contains(&StopId::new("d")));
        assert!(!route.contains(&StopId::new("e")));
    }

    #[test]
    fn test_fallback_seed_is_first_active_stop() {
        let stops = vec![
            stop_at("done", 0.0, 0.0).with_status(StopStatus::Delivered),
            stop_at("far", 0.0, 0.01),
            stop_at("mid", 0.0, 0.005),
            stop_at("near", 0.0, 0.0),
        ];

        let route = plan_route(None, &stops, 0);

        assert_eq!(order(&route), vec!["far", "mid", "near"]);
        assert_eq!(route.stops[0].leg_m, 0);
        assert_eq!(route.origin, None);
    }

    #[test]
    fn test_ties_go_to_first_in_input() {
        let stops = vec![stop_at("west", 0.0, -0.001), stop_at("east", 0.0, 0.001)];

        let route = plan_route(Some(coord(0.0, 0.0)), &stops, 0);

        assert_eq!(order(&route), vec!["west", "east"]);
    }

    #[test]
    fn test_greedy_is_not_optimal() {
        // Greedy runs right to the two close stops, then backtracks across the origin
        let stops = vec![stop_at("A", 0.0, 0.001), stop_at("B", 0.0, -0.0015), stop_at("C", 0.0, 0.002)];

        let route = plan_route(Some(coord(0.0, 0.0)), &stops, 0);

        assert_eq!(order(&route), vec!["A", "C", "B"]);
        // 111 + 111 + 389 m; visiting B first would be 167 + 278 + 111 = 556 m
        assert_eq!(route.total_m(), 611);
    }

    #[test]
    fn test_stops_not_mutated() {
        let stops = vec![stop_at("a", 0.0, 0.001), stop_at("b", 0.0, 0.002)];
        let before = stops.clone();

        let first = plan_route(Some(coord(0.0, 0.0)), &stops, 0);
        let second = plan_route(Some(coord(0.0, 0.0)), &stops, 0);

        assert_eq!(stops, before);
        assert_eq!(first, second);
    }

    #[test]
    fn test_waypoints_with_device_origin() {
        let stops = vec![stop_at("P", 0.0, 0.0009), stop_at("Q", 0.0, 0.0003), stop_at("R", 0.0, 0.0006)];
        let route = plan_route(Some(coord(0.0, 0.0)), &stops, 0);

        let wp = to_waypoints(&route).unwrap();

        assert_eq!(wp.origin, coord(0.0, 0.0));
        assert_eq!(wp.destination, coord(0.0, 0.0009));
        assert_eq!(wp.waypoints, vec![coord(0.0, 0.0003), coord(0.0, 0.0006)]);
    }

    #[test]
    fn test_waypoints_seeded_from_first_stop() {
        let stops = vec![stop_at("a", 0.0, 0.0), stop_at("b", 0.0, 0.001), stop_at("c", 0.0, 0.002)];
        let route = plan_route(None, &stops, 0);

        let wp = to_waypoints(&route).unwrap();

        assert_eq!(wp.origin, coord(0.0, 0.0));
        assert_eq!(wp.destination, coord(0.0, 0.002));
        assert_eq!(wp.waypoints, vec![coord(0.0, 0.001)]);
    }

    #[test]
    fn test_waypoints_short_seeded_routes_are_empty() {
        let two = plan_route(None, &[stop_at("a", 0.0, 0.0), stop_at("b", 0.0, 0.001)], 0);
        let wp = to_waypoints(&two).unwrap();
        assert_eq!(wp.origin, coord(0.0, 0.0));
        assert_eq!(wp.destination, coord(0.0, 0.001));
        assert!(wp.waypoints.is_empty());

        let one = plan_route(None, &[stop_at("a", 1.0, 1.0)], 0);
        let wp = to_waypoints(&one).unwrap();
        assert_eq!(wp.origin, wp.destination);
        assert!(wp.waypoints.is_empty());
    }

    #[test]
    fn test_waypoints_single_stop_with_origin() {
        let route = plan_route(Some(coord(0.0, 0.0)), &[stop_at("a", 0.0, 0.001)], 0);

        let wp = to_waypoints(&route).unwrap();

        assert_eq!(wp.origin, coord(0.0, 0.0));
        assert_eq!(wp.destination, coord(0.0, 0.001));
        assert!(wp.waypoints.is_empty());
    }

    #[test]
    fn test_waypoints_two_stops_with_origin_are_empty() {
        let stops = vec![stop_at("a", 0.0, 0.001), stop_at("b", 0.0, 0.002)];
        let route = plan_route(Some(coord(0.0, 0.0)), &stops, 0);
        assert_eq!(route.len(), 2);

        let wp = to_waypoints(&route).unwrap();

        assert_eq!(wp.origin, coord(0.0, 0.0));
        assert_eq!(wp.destination, coord(0.0, 0.002));
        assert!(wp.waypoints.is_empty());
    }
}
