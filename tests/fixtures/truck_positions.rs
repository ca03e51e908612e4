//! Truck positions around a Las Vegas destination.
//!
//! Real coordinates (OpenStreetMap) for near-range yards, plus synthetic
//! points due north of the destination at a chosen great-circle distance.

use dispatch_distance::{Coordinates, Origin, OriginId};

/// Destination used across scenarios: downtown Las Vegas.
pub const DESTINATION: Coordinates = Coordinates::new(36.17, -115.14);

pub const DESTINATION_ADDRESS: &str = "Las Vegas, NV";

/// Miles per degree of latitude on the estimator's sphere.
const MILES_PER_DEGREE: f64 = 69.0933;

/// A yard with a name and position.
#[derive(Debug, Clone)]
pub struct Yard {
    pub name: &'static str,
    pub coords: Coordinates,
}

impl Yard {
    pub const fn new(name: &'static str, lat: f64, lon: f64) -> Self {
        Self {
            name,
            coords: Coordinates::new(lat, lon),
        }
    }
}

pub const NEAR_YARDS: &[Yard] = &[
    Yard::new("MGM Grand lot", 36.1023654, -115.1688720),
    Yard::new("Longhorn Casino lot", 36.1070664, -115.0591256),
    Yard::new("Wynn service yard", 36.1263781, -115.1658180),
];

/// A point due north of [`DESTINATION`] roughly `miles` away.
pub fn north_of_destination(miles: f64) -> Coordinates {
    Coordinates::new(DESTINATION.lat + miles / MILES_PER_DEGREE, DESTINATION.lon)
}

pub fn origin(id: i64, coordinates: Option<Coordinates>) -> Origin {
    Origin {
        id: OriginId(id),
        coordinates,
        address: format!("Truck {}", id),
    }
}

pub fn origin_at_miles(id: i64, miles: f64) -> Origin {
    origin(id, Some(north_of_destination(miles)))
}
