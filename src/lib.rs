//! dispatch-distance core
//!
//! Resolves truck-to-destination distances in tiers (cache, great-circle
//! estimate, routing provider), delivering each tier's results as soon as
//! it is known while keeping provider calls to the near-range origins that
//! need them.

pub mod backend;
pub mod error;
pub mod haversine;
pub mod janitor;
pub mod logging;
pub mod model;
pub mod osrm;
pub mod progress;
pub mod resolver;
pub mod stats;
pub mod tiers;
pub mod traits;

pub use error::DistanceError;
pub use model::{CacheCheckResponse, Coordinates, Destination, DistanceResult, DistanceSource, Origin, OriginId};
pub use progress::{DistanceMap, DistanceUpdate, DistanceUpdateBatch, ProgressSink, Tier};
pub use resolver::{DistanceResolver, ResolverConfig, RunHandle, RunOutcome, RunPhase};
pub use stats::RunStats;
