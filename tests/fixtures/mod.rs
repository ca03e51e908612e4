//! Test fixtures for dispatch-distance.
//!
//! Provides:
//! - Truck positions around a Las Vegas destination
//! - Scripted collaborators that record every call

#![allow(dead_code)]

pub mod truck_positions;

pub use truck_positions::*;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dispatch_distance::stats::StatsReport;
use dispatch_distance::traits::{DistanceCache, PermissionSource, RoutingProvider, StatsSink};
use dispatch_distance::{
    CacheCheckResponse, Destination, DistanceError, DistanceResult, DistanceSource, Origin, OriginId,
};

/// A collaborator call, in the order it was made.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Permissions,
    CacheCheck(String),
    ProviderBatch(Vec<OriginId>),
    Stats(StatsReport),
}

#[derive(Debug, Default)]
pub struct CallLog {
    calls: Mutex<Vec<Call>>,
}

impl CallLog {
    pub fn record(&self, call: Call) {
        self.calls.lock().expect("call log").push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("call log").clone()
    }

    pub fn network_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, Call::CacheCheck(_) | Call::ProviderBatch(_)))
            .count()
    }

    pub fn provider_requests(&self) -> Vec<Vec<OriginId>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::ProviderBatch(ids) => Some(ids),
                _ => None,
            })
            .collect()
    }

    pub fn stats_reports(&self) -> Vec<StatsReport> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Stats(report) => Some(report),
                _ => None,
            })
            .collect()
    }
}

/// Scripted backend answering permissions, cache checks and stats.
pub struct MockBackend {
    pub log: Arc<CallLog>,
    pub permissions: Result<HashSet<String>, DistanceError>,
    pub cache: Result<CacheCheckResponse, DistanceError>,
    pub cache_delay: Option<Duration>,
    pub stats: Result<(), DistanceError>,
}

impl MockBackend {
    pub fn new(log: Arc<CallLog>, cache: CacheCheckResponse) -> Self {
        Self {
            log,
            permissions: Ok(permission_set(&["view_trucks", "process_distances"])),
            cache: Ok(cache),
            cache_delay: None,
            stats: Ok(()),
        }
    }
}

impl PermissionSource for MockBackend {
    async fn permissions(&self) -> Result<HashSet<String>, DistanceError> {
        self.log.record(Call::Permissions);
        self.permissions.clone()
    }
}

impl DistanceCache for MockBackend {
    async fn check(&self, destination: &str) -> Result<CacheCheckResponse, DistanceError> {
        self.log.record(Call::CacheCheck(destination.to_string()));
        if let Some(delay) = self.cache_delay {
            tokio::time::sleep(delay).await;
        }
        self.cache.clone()
    }
}

impl StatsSink for MockBackend {
    async fn log_stats(&self, report: &StatsReport) -> Result<(), DistanceError> {
        self.log.record(Call::Stats(report.clone()));
        self.stats.clone()
    }
}

/// Scripted provider. On success it answers every requested origin with
/// `id * 1000` meters.
pub struct MockProvider {
    pub log: Arc<CallLog>,
    pub failure: Option<DistanceError>,
    pub delay: Option<Duration>,
}

impl MockProvider {
    pub fn new(log: Arc<CallLog>) -> Self {
        Self {
            log,
            failure: None,
            delay: None,
        }
    }

    pub fn failing(log: Arc<CallLog>, err: DistanceError) -> Self {
        Self {
            failure: Some(err),
            ..Self::new(log)
        }
    }
}

impl RoutingProvider for MockProvider {
    async fn distances(
        &self,
        _destination: &Destination,
        origins: &[Origin],
    ) -> Result<HashMap<OriginId, DistanceResult>, DistanceError> {
        self.log
            .record(Call::ProviderBatch(origins.iter().map(|origin| origin.id).collect()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        Ok(origins
            .iter()
            .map(|origin| {
                let meters = origin.id.0 as f64 * 1000.0;
                (origin.id, DistanceResult::measured(meters, DistanceSource::Provider))
            })
            .collect())
    }
}

pub fn permission_set(tokens: &[&str]) -> HashSet<String> {
    tokens.iter().map(|token| token.to_string()).collect()
}

pub fn cached(id: i64, meters: f64) -> (OriginId, DistanceResult) {
    (OriginId(id), DistanceResult::measured(meters, DistanceSource::Cache))
}

/// Cache response with the given hits and misses, destination geocoded.
pub fn cache_response(
    hits: Vec<(OriginId, DistanceResult)>,
    uncached: Vec<Origin>,
) -> CacheCheckResponse {
    CacheCheckResponse {
        cached: hits.into_iter().collect(),
        uncached,
        destination_coordinates: Some(DESTINATION),
    }
}
