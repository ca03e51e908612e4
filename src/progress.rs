//! Progressive delivery of per-tier distance batches.
//!
//! # Contract
//!
//! ```text
//! Resolver              ProgressiveReporter                Caller
//!    │ deliver(Cache, ..)       │                             │
//!    ├─────────────────────────►│ batch {cache ids}           │
//!    │                          ├────────────────────────────►│ merge by id
//!    │ deliver(Preliminary, ..) │                             │
//!    ├─────────────────────────►│ batch {estimate-tier ids}   │
//!    │                          ├────────────────────────────►│ merge by id
//!    │ deliver(Provider, ..)    │                             │
//!    ├─────────────────────────►│ batch {provider ids}        │
//!    │                          ├────────────────────────────►│ merge by id
//! ```
//!
//! At most one batch per tier, always in tier order, and never an id that
//! an earlier tier already delivered. Empty batches are not delivered.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::haversine::meters_to_display_miles;
use crate::model::{DistanceResult, OriginId};

/// Resolution tier, ordered by cost and accuracy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Cache,
    Preliminary,
    Provider,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DistanceUpdate {
    pub id: OriginId,
    pub result: DistanceResult,
}

/// Results resolved by a single tier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistanceUpdateBatch {
    pub tier: Tier,
    pub updates: Vec<DistanceUpdate>,
}

impl DistanceUpdateBatch {
    pub fn ids(&self) -> Vec<OriginId> {
        self.updates.iter().map(|update| update.id).collect()
    }

    pub fn len(&self) -> usize {
        self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }
}

/// Receives batches as tiers complete. Must not block.
pub trait ProgressSink: Send {
    fn deliver(&mut self, batch: DistanceUpdateBatch);
}

impl ProgressSink for Vec<DistanceUpdateBatch> {
    fn deliver(&mut self, batch: DistanceUpdateBatch) {
        self.push(batch);
    }
}

impl ProgressSink for UnboundedSender<DistanceUpdateBatch> {
    fn deliver(&mut self, batch: DistanceUpdateBatch) {
        if self.send(batch).is_err() {
            debug!("progress receiver dropped; batch discarded");
        }
    }
}

/// Adapts a closure into a [`ProgressSink`].
pub struct FnSink<F>(pub F);

impl<F> ProgressSink for FnSink<F>
where
    F: FnMut(DistanceUpdateBatch) + Send,
{
    fn deliver(&mut self, batch: DistanceUpdateBatch) {
        (self.0)(batch)
    }
}

/// Enforces tier ordering and id uniqueness in front of a sink.
pub struct ProgressiveReporter<'a, S: ProgressSink> {
    sink: &'a mut S,
    delivered: HashSet<OriginId>,
    last_tier: Option<Tier>,
    batches: usize,
}

impl<'a, S: ProgressSink> ProgressiveReporter<'a, S> {
    pub fn new(sink: &'a mut S) -> Self {
        Self {
            sink,
            delivered: HashSet::new(),
            last_tier: None,
            batches: 0,
        }
    }

    /// Delivers `results` as the batch for `tier`.
    ///
    /// Returns how many updates reached the sink. A tier that is not later
    /// than the last delivered one is refused.
    pub fn deliver<I>(&mut self, tier: Tier, results: I) -> usize
    where
        I: IntoIterator<Item = (OriginId, DistanceResult)>,
    {
        if self.last_tier.is_some_and(|last| tier <= last) {
            warn!(?tier, last = ?self.last_tier, "out-of-order tier batch refused");
            return 0;
        }

        let mut seen_here = HashSet::new();
        let updates: Vec<DistanceUpdate> = results
            .into_iter()
            .filter(|(id, _)| !self.delivered.contains(id) && seen_here.insert(*id))
            .map(|(id, result)| DistanceUpdate { id, result })
            .collect();

        if updates.is_empty() {
            return 0;
        }

        self.last_tier = Some(tier);
        self.delivered.extend(updates.iter().map(|update| update.id));
        self.batches += 1;

        let count = updates.len();
        debug!(?tier, count, "delivering distance batch");
        self.sink.deliver(DistanceUpdateBatch { tier, updates });
        count
    }

    pub fn is_delivered(&self, id: &OriginId) -> bool {
        self.delivered.contains(id)
    }

    pub fn batches_delivered(&self) -> usize {
        self.batches
    }
}

/// Caller-owned accumulation of delivered distances.
///
/// Merges are additive by id; unrelated ids are never cleared.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DistanceMap {
    entries: HashMap<OriginId, DistanceResult>,
}

impl DistanceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&mut self, batch: &DistanceUpdateBatch) {
        for update in &batch.updates {
            self.entries.insert(update.id, update.result);
        }
    }

    pub fn get(&self, id: &OriginId) -> Option<&DistanceResult> {
        self.entries.get(id)
    }

    /// Whole miles for display, `None` when unknown or unlocatable.
    pub fn display_miles(&self, id: &OriginId) -> Option<i64> {
        self.entries
            .get(id)
            .and_then(|result| result.distance)
            .map(meters_to_display_miles)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DistanceSource;

    fn cached(id: i64, meters: f64) -> (OriginId, DistanceResult) {
        (OriginId(id), DistanceResult::measured(meters, DistanceSource::Cache))
    }

    fn provided(id: i64, meters: f64) -> (OriginId, DistanceResult) {
        (OriginId(id), DistanceResult::measured(meters, DistanceSource::Provider))
    }

    #[test]
    fn test_batches_carry_only_their_tier() {
        let mut sink: Vec<DistanceUpdateBatch> = Vec::new();
        let mut reporter = ProgressiveReporter::new(&mut sink);

        reporter.deliver(Tier::Cache, vec![cached(1, 1000.0)]);
        reporter.deliver(Tier::Provider, vec![provided(2, 2000.0)]);
        assert_eq!(reporter.batches_delivered(), 2);

        assert_eq!(sink.len(), 2);
        assert_eq!(sink[0].tier, Tier::Cache);
        assert_eq!(sink[0].ids(), vec![OriginId(1)]);
        assert_eq!(sink[1].tier, Tier::Provider);
        assert_eq!(sink[1].ids(), vec![OriginId(2)]);
    }

    #[test]
    fn test_later_tier_never_re_emits_earlier_ids() {
        let mut sink: Vec<DistanceUpdateBatch> = Vec::new();
        let mut reporter = ProgressiveReporter::new(&mut sink);

        reporter.deliver(Tier::Cache, vec![cached(1, 1000.0)]);
        let sent = reporter.deliver(Tier::Provider, vec![provided(1, 900.0), provided(2, 2000.0)]);

        assert_eq!(sent, 1);
        assert_eq!(sink[1].ids(), vec![OriginId(2)]);
    }

    #[test]
    fn test_out_of_order_tier_is_refused() {
        let mut sink: Vec<DistanceUpdateBatch> = Vec::new();
        let mut reporter = ProgressiveReporter::new(&mut sink);

        reporter.deliver(Tier::Provider, vec![provided(1, 1000.0)]);
        assert_eq!(reporter.deliver(Tier::Cache, vec![cached(2, 500.0)]), 0);
        assert_eq!(reporter.deliver(Tier::Provider, vec![provided(3, 500.0)]), 0);
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_empty_batch_is_skipped() {
        let mut sink: Vec<DistanceUpdateBatch> = Vec::new();
        let mut reporter = ProgressiveReporter::new(&mut sink);

        assert_eq!(reporter.deliver(Tier::Cache, Vec::new()), 0);
        reporter.deliver(Tier::Preliminary, vec![(OriginId(4), DistanceResult::no_coords())]);

        assert_eq!(sink.len(), 1);
        assert_eq!(sink[0].tier, Tier::Preliminary);
    }

    #[test]
    fn test_distance_map_merges_additively() {
        let mut map = DistanceMap::new();
        map.merge(&DistanceUpdateBatch {
            tier: Tier::Cache,
            updates: vec![DistanceUpdate {
                id: OriginId(1),
                result: DistanceResult::measured(16093.4, DistanceSource::Cache),
            }],
        });
        map.merge(&DistanceUpdateBatch {
            tier: Tier::Preliminary,
            updates: vec![DistanceUpdate {
                id: OriginId(2),
                result: DistanceResult::no_coords(),
            }],
        });

        assert_eq!(map.len(), 2);
        assert_eq!(map.display_miles(&OriginId(1)), Some(10));
        assert_eq!(map.display_miles(&OriginId(2)), None);
        assert_eq!(map.display_miles(&OriginId(3)), None);
    }

    #[test]
    fn test_fn_sink_forwards_batches() {
        let mut count = 0;
        {
            let mut sink = FnSink(|batch: DistanceUpdateBatch| count += batch.len());
            let mut reporter = ProgressiveReporter::new(&mut sink);
            reporter.deliver(Tier::Cache, vec![cached(1, 1.0), cached(2, 2.0)]);
        }
        assert_eq!(count, 2);
    }
}
