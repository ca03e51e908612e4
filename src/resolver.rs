//! Distance resolution run: cache, then estimate, then provider.
//!
//! A run moves through
//! `Idle → AuthorizationCheck → CacheCheck → EstimateClassification →
//! ProviderBatch (optional) → StatsLog → Done`, delivering one batch per
//! tier as soon as that tier is known. Every path ends in exactly one
//! [`RunOutcome`].
//!
//! Runs started through [`DistanceResolver::start`] are fenced: starting a
//! new run supersedes the previous one, which stops at its next suspension
//! point and delivers nothing further.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::error::DistanceError;
use crate::model::{CacheCheckResponse, Destination, DistanceResult, DistanceSource, Origin, OriginId};
use crate::progress::{DistanceUpdateBatch, ProgressSink, ProgressiveReporter, Tier};
use crate::stats::{RunStats, StatsReport, emit_stats};
use crate::tiers::route_uncached;
use crate::traits::{DistanceCache, PermissionSource, RoutingProvider, StatsSink, may_process_distances};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Budget for the whole run, stats excluded.
    pub run_budget_secs: u64,
    pub stats_timeout_secs: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            run_budget_secs: 60,
            stats_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    AuthorizationCheck,
    CacheCheck,
    EstimateClassification,
    ProviderBatch,
    StatsLog,
    Done,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Idle => "idle",
            RunPhase::AuthorizationCheck => "authorization check",
            RunPhase::CacheCheck => "cache check",
            RunPhase::EstimateClassification => "estimate classification",
            RunPhase::ProviderBatch => "provider batch",
            RunPhase::StatsLog => "stats log",
            RunPhase::Done => "done",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    EmptyDestination,
}

/// Terminal state of a run. Produced exactly once per run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(RunStats),
    Aborted(AbortReason),
    Failed(DistanceError),
    /// A newer run started, or the caller cancelled this one.
    Superseded,
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed(_))
    }

    pub fn error(&self) -> Option<&DistanceError> {
        match self {
            RunOutcome::Failed(err) => Some(err),
            _ => None,
        }
    }
}

enum Stop {
    Failed(DistanceError),
    Superseded,
}

impl From<DistanceError> for Stop {
    fn from(err: DistanceError) -> Self {
        Stop::Failed(err)
    }
}

/// Tracks the current run so a new one can supersede it.
#[derive(Debug, Default)]
struct RunFence {
    generation: AtomicU64,
    current: Mutex<Option<(u64, CancellationToken)>>,
}

impl RunFence {
    fn begin(&self) -> (u64, CancellationToken) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let token = CancellationToken::new();
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((previous, stale)) = current.replace((generation, token.clone())) {
            debug!(previous, generation, "superseding in-flight distance run");
            stale.cancel();
        }
        (generation, token)
    }

    fn finish(&self, generation: u64) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if current.as_ref().is_some_and(|(active, _)| *active == generation) {
            *current = None;
        }
    }
}

/// Resolves distances from every candidate origin to a destination.
///
/// `B` answers permissions, cache checks and stats; `R` is the routing
/// provider. The backend client can serve as both.
pub struct DistanceResolver<B, R> {
    backend: Arc<B>,
    provider: Arc<R>,
    config: ResolverConfig,
    fence: Arc<RunFence>,
}

impl<B, R> Clone for DistanceResolver<B, R> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            provider: Arc::clone(&self.provider),
            config: self.config.clone(),
            fence: Arc::clone(&self.fence),
        }
    }
}

impl<B, R> DistanceResolver<B, R>
where
    B: PermissionSource + DistanceCache + StatsSink,
    R: RoutingProvider,
{
    pub fn new(backend: Arc<B>, provider: Arc<R>, config: ResolverConfig) -> Self {
        Self {
            backend,
            provider,
            config,
            fence: Arc::new(RunFence::default()),
        }
    }

    /// Runs inline on the caller's task, delivering batches to `sink`.
    pub async fn resolve<S: ProgressSink>(&self, destination: &str, sink: &mut S) -> RunOutcome {
        self.resolve_with_token(destination, sink, &CancellationToken::new())
            .await
    }

    /// Like [`resolve`](Self::resolve), stopping early once `cancel` fires.
    pub async fn resolve_with_token<S: ProgressSink>(
        &self,
        destination: &str,
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> RunOutcome {
        self.run(destination, sink, cancel, 0).await
    }

    /// Spawns a fenced run and returns its handle.
    ///
    /// Any run previously started from this resolver (or a clone of it) is
    /// superseded, unless `destination` is blank: that run aborts without
    /// touching the fence. Must be called from within a Tokio runtime.
    pub fn start(&self, destination: impl Into<String>) -> RunHandle
    where
        B: 'static,
        R: 'static,
    {
        let destination = destination.into();
        if destination.trim().is_empty() {
            info!("empty destination; in-flight run left untouched");
            return RunHandle::aborted(AbortReason::EmptyDestination);
        }

        let (generation, cancel) = self.fence.begin();
        let (mut tx, rx) = mpsc::unbounded_channel();
        let resolver = self.clone();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let outcome = resolver.run(&destination, &mut tx, &token, generation).await;
            resolver.fence.finish(generation);
            outcome
        });

        RunHandle {
            generation,
            updates: rx,
            task,
            cancel,
        }
    }

    async fn run<S: ProgressSink>(
        &self,
        destination: &str,
        sink: &mut S,
        cancel: &CancellationToken,
        generation: u64,
    ) -> RunOutcome {
        let destination = destination.trim();
        if destination.is_empty() {
            info!(generation, "empty destination; distance run aborted");
            return RunOutcome::Aborted(AbortReason::EmptyDestination);
        }

        let span = info_span!("distance_run", generation, destination);
        self.run_instrumented(destination, sink, cancel)
            .instrument(span)
            .await
    }

    async fn run_instrumented<S: ProgressSink>(
        &self,
        destination: &str,
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> RunOutcome {
        let mut reporter = ProgressiveReporter::new(sink);
        let mut phase = RunPhase::Idle;
        let budget = Duration::from_secs(self.config.run_budget_secs);

        let result = tokio::time::timeout(
            budget,
            self.run_phases(destination, &mut reporter, cancel, &mut phase),
        )
        .await;

        let stats = match result {
            Ok(Ok(stats)) => stats,
            Ok(Err(Stop::Superseded)) => {
                info!(%phase, "distance run superseded");
                return RunOutcome::Superseded;
            }
            Ok(Err(Stop::Failed(err))) => {
                warn!(%phase, error = %err, "distance run failed");
                return RunOutcome::Failed(err);
            }
            Err(_) => {
                warn!(%phase, budget_secs = budget.as_secs(), "distance run exceeded its budget");
                return RunOutcome::Failed(DistanceError::TimedOut(phase));
            }
        };

        debug!(phase = %RunPhase::StatsLog, "entering phase");
        let report = StatsReport {
            destination: destination.to_string(),
            stats,
        };
        emit_stats(
            &*self.backend,
            &report,
            Duration::from_secs(self.config.stats_timeout_secs),
        )
        .await;

        info!(
            total = stats.total_drivers,
            cache_hits = stats.cache_hits,
            preliminary = stats.preliminary_calculations,
            provider = stats.provider_requests,
            batches = reporter.batches_delivered(),
            "distance run done"
        );
        RunOutcome::Completed(stats)
    }

    async fn run_phases<S: ProgressSink>(
        &self,
        destination: &str,
        reporter: &mut ProgressiveReporter<'_, S>,
        cancel: &CancellationToken,
        phase: &mut RunPhase,
    ) -> Result<RunStats, Stop> {
        enter(phase, RunPhase::AuthorizationCheck);
        let permissions = fenced(cancel, self.backend.permissions()).await??;
        if !may_process_distances(&permissions) {
            return Err(Stop::Failed(DistanceError::Unauthorized));
        }

        enter(phase, RunPhase::CacheCheck);
        let response = fenced(cancel, self.backend.check(destination)).await??;
        if let Err(violation) = response.validate() {
            return Err(Stop::Failed(DistanceError::generic(format!(
                "invalid cache check response: {}",
                violation
            ))));
        }
        let CacheCheckResponse {
            cached,
            uncached,
            destination_coordinates,
        } = response;

        let mut stats = RunStats {
            total_drivers: cached.len() + uncached.len(),
            cache_hits: cached.len(),
            ..RunStats::default()
        };

        let mut cache_hits: Vec<(OriginId, DistanceResult)> = cached.into_iter().collect();
        cache_hits.sort_by_key(|(id, _)| *id);
        reporter.deliver(Tier::Cache, cache_hits);

        enter(phase, RunPhase::EstimateClassification);
        let plan = route_uncached(&uncached, destination_coordinates);
        stats.preliminary_calculations = plan.preliminary_count;
        stats.provider_requests = plan.provider.len();
        info!(
            cache_hits = stats.cache_hits,
            preliminary = plan.preliminary_count,
            no_coords = plan.no_coords_count,
            provider = plan.provider.len(),
            "origins classified"
        );

        if cancel.is_cancelled() {
            return Err(Stop::Superseded);
        }
        reporter.deliver(Tier::Preliminary, plan.resolved);

        if plan.provider.is_empty() {
            debug!("no origins need a provider lookup");
            return Ok(stats);
        }

        enter(phase, RunPhase::ProviderBatch);
        let destination = Destination {
            address: destination.to_string(),
            coordinates: destination_coordinates,
        };
        let results = fenced(cancel, self.provider.distances(&destination, &plan.provider)).await??;
        reporter.deliver(Tier::Provider, accept_provider_results(&plan.provider, results));

        Ok(stats)
    }
}

fn enter(phase: &mut RunPhase, next: RunPhase) {
    debug!(from = %phase, to = %next, "entering phase");
    *phase = next;
}

/// Awaits `fut` unless `cancel` fires first.
async fn fenced<T, F>(cancel: &CancellationToken, fut: F) -> Result<T, Stop>
where
    F: Future<Output = T>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Stop::Superseded),
        out = fut => Ok(out),
    }
}

/// Keeps provider entries for requested origins only, in request order,
/// stamped as provider results.
fn accept_provider_results(
    requested: &[Origin],
    mut results: HashMap<OriginId, DistanceResult>,
) -> Vec<(OriginId, DistanceResult)> {
    let mut accepted = Vec::with_capacity(requested.len());
    for origin in requested {
        match results.remove(&origin.id).and_then(|result| result.distance) {
            Some(meters) if meters.is_finite() && meters >= 0.0 => {
                accepted.push((origin.id, DistanceResult::measured(meters, DistanceSource::Provider)));
            }
            _ => warn!(origin = %origin.id, "provider returned no distance"),
        }
    }
    if !results.is_empty() {
        debug!(extra = results.len(), "ignoring provider results for unrequested origins");
    }
    accepted
}

/// Handle to a run started with [`DistanceResolver::start`].
///
/// Batches arrive as a finite sequence that ends when the run ends; the
/// outcome is available once.
pub struct RunHandle {
    generation: u64,
    updates: UnboundedReceiver<DistanceUpdateBatch>,
    task: JoinHandle<RunOutcome>,
    cancel: CancellationToken,
}

impl RunHandle {
    /// A handle that delivers no batches and ends in `Aborted(reason)`.
    fn aborted(reason: AbortReason) -> Self {
        let (_, updates) = mpsc::unbounded_channel();
        Self {
            generation: 0,
            updates,
            task: tokio::spawn(async move { RunOutcome::Aborted(reason) }),
            cancel: CancellationToken::new(),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Next tier batch, or `None` once the run has finished delivering.
    pub async fn next_batch(&mut self) -> Option<DistanceUpdateBatch> {
        self.updates.recv().await
    }

    /// Stops the run at its next suspension point.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Waits for the run's terminal outcome.
    pub async fn outcome(self) -> RunOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(err) => RunOutcome::Failed(DistanceError::generic(format!(
                "distance run did not finish: {}",
                err
            ))),
        }
    }

    /// Drains every batch, then returns them with the outcome.
    pub async fn collect(mut self) -> (Vec<DistanceUpdateBatch>, RunOutcome) {
        let mut batches = Vec::new();
        while let Some(batch) = self.next_batch().await {
            batches.push(batch);
        }
        let outcome = self.outcome().await;
        (batches, outcome)
    }
}
