//! Per-run tier counts and their best-effort delivery.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::traits::StatsSink;

/// Tier counts for one completed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub total_drivers: usize,
    pub cache_hits: usize,
    pub preliminary_calculations: usize,
    pub provider_requests: usize,
}

/// Payload sent to the observability endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsReport {
    pub destination: String,
    #[serde(flatten)]
    pub stats: RunStats,
}

/// Sends `report` and swallows every failure, including running past
/// `budget`. A run is never failed by its stats.
pub async fn emit_stats<S: StatsSink>(sink: &S, report: &StatsReport, budget: Duration) {
    match tokio::time::timeout(budget, sink.log_stats(report)).await {
        Ok(Ok(())) => debug!(destination = %report.destination, "distance stats logged"),
        Ok(Err(err)) => warn!(error = %err, "distance stats not logged"),
        Err(_) => warn!(budget_ms = budget.as_millis() as u64, "distance stats timed out"),
    }
}
