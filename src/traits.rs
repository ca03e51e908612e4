//! Collaborator contracts consumed by the distance pipeline.
//!
//! These are intentionally minimal. The backend HTTP client implements all
//! of them; tests and embedding apps can implement them for their own
//! transports.

use std::collections::{HashMap, HashSet};
use std::future::Future;

use crate::error::DistanceError;
use crate::model::{CacheCheckResponse, Destination, DistanceResult, Origin, OriginId};
use crate::stats::StatsReport;

/// Permission token that allows running distance calculations.
pub const DISTANCE_PERMISSION: &str = "process_distances";

/// Permission token that grants everything.
pub const WILDCARD_PERMISSION: &str = "*";

/// Resolves the caller's permission set.
pub trait PermissionSource: Send + Sync {
    fn permissions(&self) -> impl Future<Output = Result<HashSet<String>, DistanceError>> + Send;
}

/// Returns true if the permission set allows distance processing.
pub fn may_process_distances(permissions: &HashSet<String>) -> bool {
    permissions.contains(DISTANCE_PERMISSION) || permissions.contains(WILDCARD_PERMISSION)
}

/// Partitions the origin universe for a destination into known and
/// unknown distances.
///
/// The collaborator resolves the candidate origins itself; callers only
/// supply the destination.
pub trait DistanceCache: Send + Sync {
    fn check(
        &self,
        destination: &str,
    ) -> impl Future<Output = Result<CacheCheckResponse, DistanceError>> + Send;
}

/// Road-network distances from an external routing provider.
///
/// Returns one entry per origin the provider could route, keyed by id.
pub trait RoutingProvider: Send + Sync {
    fn distances(
        &self,
        destination: &Destination,
        origins: &[Origin],
    ) -> impl Future<Output = Result<HashMap<OriginId, DistanceResult>, DistanceError>> + Send;
}

/// Observability endpoint for per-run tier counts.
pub trait StatsSink: Send + Sync {
    fn log_stats(
        &self,
        report: &StatsReport,
    ) -> impl Future<Output = Result<(), DistanceError>> + Send;
}

/// Releases hold-locks whose lease expired.
pub trait LockJanitor: Send + Sync {
    fn cleanup_expired(&self) -> impl Future<Output = Result<(), DistanceError>> + Send;
}
