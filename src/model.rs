//! Data model shared by every tier of the distance pipeline.
//!
//! All distances are meters. Mile values exist only for tier routing and
//! display (see [`crate::haversine`]).

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a truck/driver origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OriginId(pub i64);

impl fmt::Display for OriginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// A truck's last known position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Origin {
    pub id: OriginId,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
    #[serde(default)]
    pub address: String,
}

/// The dispatcher-entered destination and, when the backend could geocode
/// it, its coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Destination {
    pub address: String,
    pub coordinates: Option<Coordinates>,
}

/// Where a distance came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DistanceSource {
    Cache,
    Preliminary,
    Provider,
    NoCoordsAvailable,
}

/// A resolved distance in meters.
///
/// `distance` is `None` exactly when `source` is
/// [`DistanceSource::NoCoordsAvailable`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistanceResult {
    pub distance: Option<f64>,
    pub source: DistanceSource,
}

impl DistanceResult {
    pub fn measured(meters: f64, source: DistanceSource) -> Self {
        Self {
            distance: Some(meters),
            source,
        }
    }

    pub fn no_coords() -> Self {
        Self {
            distance: None,
            source: DistanceSource::NoCoordsAvailable,
        }
    }

    pub fn is_consistent(&self) -> bool {
        match self.source {
            DistanceSource::NoCoordsAvailable => self.distance.is_none(),
            _ => self.distance.is_some_and(|meters| meters.is_finite() && meters >= 0.0),
        }
    }
}

/// Response of the cache-check collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheCheckResponse {
    #[serde(default)]
    pub cached: HashMap<OriginId, DistanceResult>,
    #[serde(default)]
    pub uncached: Vec<Origin>,
    #[serde(default)]
    pub destination_coordinates: Option<Coordinates>,
}

/// Ways a cache-check response can break the partition contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionViolation {
    Overlap(OriginId),
    DuplicateUncached(OriginId),
    InconsistentCached(OriginId),
}

impl fmt::Display for PartitionViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionViolation::Overlap(id) => {
                write!(f, "origin {} is both cached and uncached", id)
            }
            PartitionViolation::DuplicateUncached(id) => {
                write!(f, "origin {} listed twice as uncached", id)
            }
            PartitionViolation::InconsistentCached(id) => {
                write!(f, "cached distance for origin {} has no value", id)
            }
        }
    }
}

impl CacheCheckResponse {
    /// Checks that `cached` and `uncached` partition the origin set.
    pub fn validate(&self) -> Result<(), PartitionViolation> {
        if let Some((id, _)) = self.cached.iter().find(|(_, result)| !result.is_consistent()) {
            return Err(PartitionViolation::InconsistentCached(*id));
        }

        let mut seen = HashSet::with_capacity(self.uncached.len());
        for origin in &self.uncached {
            if self.cached.contains_key(&origin.id) {
                return Err(PartitionViolation::Overlap(origin.id));
            }
            if !seen.insert(origin.id) {
                return Err(PartitionViolation::DuplicateUncached(origin.id));
            }
        }

        Ok(())
    }

    pub fn total_origins(&self) -> usize {
        self.cached.len() + self.uncached.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin(id: i64) -> Origin {
        Origin {
            id: OriginId(id),
            coordinates: Some(Coordinates::new(36.1, -115.1)),
            address: format!("Yard {}", id),
        }
    }

    #[test]
    fn test_no_coords_result_is_consistent() {
        assert!(DistanceResult::no_coords().is_consistent());
        assert!(DistanceResult::measured(1200.0, DistanceSource::Cache).is_consistent());

        let broken = DistanceResult {
            distance: None,
            source: DistanceSource::Provider,
        };
        assert!(!broken.is_consistent());
    }

    #[test]
    fn test_cache_response_wire_shape() {
        let body = r#"{
            "cached": {"7": {"distance": 16093.4, "source": "cache"}},
            "uncached": [
                {"id": 8, "coordinates": {"lat": 36.1, "lon": -115.1}, "address": "Yard 8"},
                {"id": 9, "coordinates": null, "address": "Yard 9"}
            ],
            "destination_coordinates": {"lat": 36.2, "lon": -115.2}
        }"#;

        let response: CacheCheckResponse = serde_json::from_str(body).expect("decode");
        assert_eq!(
            response.cached.get(&OriginId(7)),
            Some(&DistanceResult::measured(16093.4, DistanceSource::Cache))
        );
        assert_eq!(response.uncached.len(), 2);
        assert!(response.uncached[1].coordinates.is_none());
        assert_eq!(response.total_origins(), 3);
        assert!(response.validate().is_ok());
    }

    #[test]
    fn test_no_coords_source_wire_name() {
        let json = serde_json::to_string(&DistanceResult::no_coords()).expect("encode");
        assert_eq!(json, r#"{"distance":null,"source":"no-coords-available"}"#);
    }

    #[test]
    fn test_validate_rejects_overlap() {
        let mut response = CacheCheckResponse {
            uncached: vec![origin(1), origin(2)],
            ..Default::default()
        };
        response
            .cached
            .insert(OriginId(2), DistanceResult::measured(10.0, DistanceSource::Cache));

        assert_eq!(response.validate(), Err(PartitionViolation::Overlap(OriginId(2))));
    }

    #[test]
    fn test_validate_rejects_duplicate_uncached() {
        let response = CacheCheckResponse {
            uncached: vec![origin(1), origin(1)],
            ..Default::default()
        };

        assert_eq!(
            response.validate(),
            Err(PartitionViolation::DuplicateUncached(OriginId(1)))
        );
    }
}
