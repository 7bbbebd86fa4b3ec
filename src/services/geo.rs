//! Great-circle distance between coordinates
//!
//! Haversine formula on a spherical Earth. Accurate to well under a meter at
//! the ranges used for proximity alerts, which is all the callers need.

use crate::domain::types::Coordinate;

/// Mean Earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Distance in whole meters between two coordinates (rounded to nearest)
#[inline]
pub fn distance_meters(a: Coordinate, b: Coordinate) -> u32 {
    haversine_m(a, b).round() as u32
}

/// Unrounded haversine distance in meters
pub fn haversine_m(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.latitude().to_radians();
    let lat2 = b.latitude().to_radians();
    let d_lat = (b.latitude() - a.latitude()).to_radians();
    let d_lon = (b.longitude() - a.longitude()).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    // Rounding error can push h marginally outside [0, 1] for antipodal points
    let h = h.clamp(0.0, 1.0);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_M * c
}
