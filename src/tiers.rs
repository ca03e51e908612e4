//! Tier routing for origins the cache could not answer.
//!
//! Long-range origins take the great-circle estimate as final. Near-range
//! origins go to the routing provider, where road detours change dispatch
//! decisions. Origins without coordinates are resolved as unlocatable and
//! never cost provider quota.

use rayon::prelude::*;

use crate::haversine::{estimate_miles, miles_to_meters};
use crate::model::{Coordinates, DistanceResult, DistanceSource, Origin, OriginId};

/// Estimates above this many miles are accepted without a provider lookup.
pub const PRELIMINARY_THRESHOLD_MILES: f64 = 200.0;

/// Routing decision for an origin with a known estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstimateRoute {
    Preliminary,
    NeedsProvider,
}

/// Per-origin outcome of classification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Classification {
    NoCoords,
    Preliminary { miles: f64 },
    NeedsProvider,
}

/// The uncached set split by tier, each part in input order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TierPlan {
    /// Results final after this tier: preliminary estimates and unlocatable origins.
    pub resolved: Vec<(OriginId, DistanceResult)>,
    /// Origins to send to the routing provider.
    pub provider: Vec<Origin>,
    pub preliminary_count: usize,
    pub no_coords_count: usize,
}

/// Boundary is inclusive: exactly 200.00 miles still goes to the provider.
pub fn classify_estimate(miles: f64) -> EstimateRoute {
    if miles > PRELIMINARY_THRESHOLD_MILES {
        EstimateRoute::Preliminary
    } else {
        EstimateRoute::NeedsProvider
    }
}

pub fn classify_origin(origin: &Origin, destination: Option<Coordinates>) -> Classification {
    if origin.coordinates.is_none() {
        return Classification::NoCoords;
    }

    // Without destination coordinates there is no estimate; the provider
    // geocodes the destination string itself.
    match estimate_miles(origin.coordinates, destination) {
        Some(miles) => match classify_estimate(miles) {
            EstimateRoute::Preliminary => Classification::Preliminary { miles },
            EstimateRoute::NeedsProvider => Classification::NeedsProvider,
        },
        None => Classification::NeedsProvider,
    }
}

/// Classifies every uncached origin against the destination.
pub fn route_uncached(uncached: &[Origin], destination: Option<Coordinates>) -> TierPlan {
    let classifications: Vec<Classification> = uncached
        .par_iter()
        .map(|origin| classify_origin(origin, destination))
        .collect();

    let mut plan = TierPlan::default();
    for (origin, classification) in uncached.iter().zip(classifications) {
        match classification {
            Classification::NoCoords => {
                plan.no_coords_count += 1;
                plan.resolved.push((origin.id, DistanceResult::no_coords()));
            }
            Classification::Preliminary { miles } => {
                plan.preliminary_count += 1;
                plan.resolved.push((
                    origin.id,
                    DistanceResult::measured(miles_to_meters(miles), DistanceSource::Preliminary),
                ));
            }
            Classification::NeedsProvider => plan.provider.push(origin.clone()),
        }
    }

    plan
}
