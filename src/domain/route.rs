//! Route data model for visiting plans over active stops

use crate::domain::types::{Coordinate, StopId};
use serde::Serialize;

/// A stop placed in a route, with the leg distance that reached it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteStop {
    pub id: StopId,
    pub coordinate: Coordinate,
    /// Distance from the previous route point (origin or previous stop)
    pub leg_m: u32,
}

/// Ordered visiting plan
///
/// Always rebuilt from scratch; never patched in place.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Route {
    /// Position the plan was computed from (`None` when seeded from the first stop)
    pub origin: Option<Coordinate>,
    pub stops: Vec<RouteStop>,
    /// Epoch ms at planning time
    pub planned_at_ms: u64,
}

impl Route {
    pub fn empty(origin: Option<Coordinate>, planned_at_ms: u64) -> Self {
        Self { origin, stops: Vec::new(), planned_at_ms }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.stops.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }

    /// Stop IDs in visiting order
    pub fn stop_ids(&self) -> impl Iterator<Item = &StopId> {
        self.stops.iter().map(|s| &s.id)
    }

    pub fn contains(&self, id: &StopId) -> bool {
        self.stops.iter().any(|s| &s.id == id)
    }

    /// Sum of all legs in meters
    pub fn total_m(&self) -> u64 {
        self.stops.iter().map(|s| u64::from(s.leg_m)).sum()
    }

    /// Point the plan starts from: the origin, or the first stop when unseeded
    pub fn start(&self) -> Option<Coordinate> {
        self.origin.or_else(|| self.stops.first().map(|s| s.coordinate))
    }
}

/// Navigation hand-off structure for an external directions tool
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Waypoints {
    pub origin: Coordinate,
    pub destination: Coordinate,
    pub waypoints: Vec<Coordinate>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord(lat: f64, lon: f64) -> Coordinate {
        Coordinate::new(lat, lon).unwrap()
    }

    #[test]
    fn test_route_totals_and_start() {
        let route = Route {
            origin: None,
            stops: vec![
                RouteStop { id: StopId::new("a"), coordinate: coord(1.0, 1.0), leg_m: 0 },
                RouteStop { id: StopId::new("b"), coordinate: coord(1.0, 2.0), leg_m: 120 },
            ],
            planned_at_ms: 0,
        };

        assert_eq!(route.len(), 2);
        assert_eq!(route.total_m(), 120);
        assert_eq!(route.start(), Some(coord(1.0, 1.0)));
        assert!(route.contains(&StopId::new("b")));
        assert!(!route.contains(&StopId::new("c")));
    }

    #[test]
    fn test_empty_route() {
        let route = Route::empty(Some(coord(0.0, 0.0)), 42);
        assert!(route.is_empty());
        assert_eq!(route.total_m(), 0);
        assert_eq!(route.start(), Some(coord(0.0, 0.0)));
        assert_eq!(route.stop_ids().count(), 0);
    }
}
