//! Closest-first ordering of stops relative to the current position

use crate::domain::types::{Coordinate, Stop};
use crate::services::geo::distance_meters;
use serde::Serialize;

/// A stop annotated with its distance from the ranking origin
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedStop<'a> {
    pub stop: &'a Stop,
    /// `None` when there is no origin or the stop has no coordinate
    pub distance_m: Option<u32>,
}

/// Annotate every stop with its distance from `origin` and sort ascending.
///
/// No stop is dropped. Entries without a distance sort after all entries
/// with one. The sort is stable, so equal distances and all `None` entries
/// keep their input order.
pub fn rank(origin: Option<Coordinate>, stops: &[Stop]) -> Vec<RankedStop<'_>> {
    let mut ranked: Vec<RankedStop<'_>> = stops
        .iter()
        .map(|stop| RankedStop {
            stop,
            distance_m: origin.zip(stop.coordinate).map(|(o, c)| distance_meters(o, c)),
        })
        .collect();

    ranked.sort_by_key(|r| (r.distance_m.is_none(), r.distance_m));
    ranked
}

/// Closest active stop (coordinate present, not delivered/cancelled)
///
/// First stop in input order wins on equal distance.
pub fn nearest_active(origin: Option<Coordinate>, stops: &[Stop]) -> Option<RankedStop<'_>> {
    let origin = origin?;
    let mut best: Option<RankedStop<'_>> = None;

    for stop in stops {
        let Some(coord) = stop.active_coordinate() else {
            continue;
        };
        let d = distance_meters(origin, coord);
        match best {
            Some(RankedStop { distance_m: Some(best_d), .. }) if d >= best_d => {}
            _ => best = Some(RankedStop { stop, distance_m: Some(d) }),
        }
    }

    best
}
