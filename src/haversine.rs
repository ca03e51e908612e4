//! Great-circle distance estimates for the preliminary tier.
//!
//! Uses straight-line distance on a spherical earth. Less accurate than a
//! road-network provider (ignores roads) but needs no network call.

use crate::model::Coordinates;

/// Earth radius in miles.
const EARTH_RADIUS_MILES: f64 = 3958.8;

/// Meters per statute mile, fixed across the pipeline boundary.
pub const METERS_PER_MILE: f64 = 1609.34;

/// Haversine distance between two points in miles, unrounded.
pub fn haversine_miles(from: Coordinates, to: Coordinates) -> f64 {
    let lat1_rad = from.lat.to_radians();
    let lat2_rad = to.lat.to_radians();
    let delta_lat = (to.lat - from.lat).to_radians();
    let delta_lon = (to.lon - from.lon).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_MILES * c
}

/// Great-circle estimate in miles rounded to two decimals, or `None` when
/// either side has no coordinates.
pub fn estimate_miles(from: Option<Coordinates>, to: Option<Coordinates>) -> Option<f64> {
    let (from, to) = (from?, to?);
    Some(round_to_hundredths(haversine_miles(from, to)))
}

pub fn miles_to_meters(miles: f64) -> f64 {
    (miles * METERS_PER_MILE).round()
}

/// Whole miles for display, from a distance in meters.
pub fn meters_to_display_miles(meters: f64) -> i64 {
    (meters / METERS_PER_MILE).round() as i64
}

fn round_to_hundredths(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
