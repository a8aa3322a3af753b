//! Per-day posting activity histograms.
//!
//! The fullest-featured payload: day buckets for rendering histograms plus a
//! per-timestamp ledger so first/last markers stay exact under deletion of
//! the current earliest or latest record.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::domain::bootstrap::RecordRow;
use crate::domain::types::{NodeId, StatScope};

use super::hierarchy::HierarchyIndex;
use super::store::{Aggregate, StatStore};

/// An inclusive day-range filter; `None` bounds are open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: Option<Date>,
    pub to: Option<Date>,
}

impl DateRange {
    /// No bounds: every bucket qualifies.
    pub const UNBOUNDED: DateRange = DateRange {
        from: None,
        to: None,
    };

    pub fn bounded(from: Date, to: Date) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
        }
    }

    pub fn contains(&self, date: Date) -> bool {
        self.from.is_none_or(|from| date >= from) && self.to.is_none_or(|to| date <= to)
    }
}

/// Posting activity of one node (or scope), incrementally maintained.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivityAggregate {
    /// Day → record count. A day whose count drops to zero is removed, so
    /// active-day statistics never see empty buckets.
    buckets: BTreeMap<Date, u64>,
    /// Timestamp → record count, the exactness ledger behind first/last.
    ledger: BTreeMap<OffsetDateTime, u64>,
    total: u64,
}

impl ActivityAggregate {
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Earliest recorded timestamp; `None` once the aggregate is empty.
    pub fn first(&self) -> Option<OffsetDateTime> {
        self.ledger.first_key_value().map(|(ts, _)| *ts)
    }

    /// Latest recorded timestamp; `None` once the aggregate is empty.
    pub fn last(&self) -> Option<OffsetDateTime> {
        self.ledger.last_key_value().map(|(ts, _)| *ts)
    }

    pub fn buckets(&self) -> &BTreeMap<Date, u64> {
        &self.buckets
    }

    fn summarize(&self, range: DateRange) -> ActivitySummary {
        let mut summary = ActivitySummary::default();
        for (&date, &count) in &self.buckets {
            if range.contains(date) {
                summary.total += count;
                summary.peak_day = summary.peak_day.max(count);
                summary.buckets.push(DayBucket { date, count });
            }
        }
        summary.active_days = summary.buckets.len() as u64;
        summary.first = self.first();
        summary.last = self.last();
        summary.days_available = day_span(summary.first, summary.last);
        summary
    }
}

impl Aggregate for ActivityAggregate {
    type Delta = OffsetDateTime;

    fn apply(&mut self, timestamp: &OffsetDateTime) {
        *self.buckets.entry(timestamp.date()).or_insert(0) += 1;
        *self.ledger.entry(*timestamp).or_insert(0) += 1;
        self.total += 1;
    }

    fn retract(&mut self, timestamp: &OffsetDateTime) {
        // The ledger gates stale deletes: a timestamp that was never
        // applied must leave buckets and total untouched, even when its
        // calendar day holds live records.
        let Some(seen) = self.ledger.get_mut(timestamp) else {
            return;
        };
        *seen -= 1;
        if *seen == 0 {
            self.ledger.remove(timestamp);
        }

        if let Some(count) = self.buckets.get_mut(&timestamp.date()) {
            *count -= 1;
            if *count == 0 {
                self.buckets.remove(&timestamp.date());
            }
        }
        self.total -= 1;
    }

    fn absorb(&mut self, other: &Self) {
        for (&date, &count) in &other.buckets {
            *self.buckets.entry(date).or_insert(0) += count;
        }
        for (&timestamp, &count) in &other.ledger {
            *self.ledger.entry(timestamp).or_insert(0) += count;
        }
        self.total += other.total;
    }

    fn is_empty(&self) -> bool {
        self.total == 0
    }
}

/// One rendered histogram bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayBucket {
    pub date: Date,
    pub count: u64,
}

/// Range-filtered activity of one node, scope, or the whole forest.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ActivitySummary {
    /// Non-empty buckets within the requested range, ascending by day.
    pub buckets: Vec<DayBucket>,
    /// Records within the requested range.
    pub total: u64,
    /// Days with at least one record within the range.
    pub active_days: u64,
    /// Largest single-day count within the range.
    pub peak_day: u64,
    /// Earliest record overall (not range-filtered); unset when empty.
    #[serde(with = "time::serde::rfc3339::option")]
    pub first: Option<OffsetDateTime>,
    /// Latest record overall (not range-filtered); unset when empty.
    #[serde(with = "time::serde::rfc3339::option")]
    pub last: Option<OffsetDateTime>,
    /// Inclusive day span between first and last record.
    pub days_available: u64,
}

fn day_span(first: Option<OffsetDateTime>, last: Option<OffsetDateTime>) -> u64 {
    match (first, last) {
        (Some(first), Some(last)) => {
            (last.date().to_julian_day() - first.date().to_julian_day() + 1) as u64
        }
        _ => 0,
    }
}

/// Per-node activity cache.
pub struct ActivityCache {
    store: StatStore<ActivityAggregate>,
}

impl Default for ActivityCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityCache {
    pub fn new() -> Self {
        Self {
            store: StatStore::new(),
        }
    }

    pub fn initialize(&self, records: &[RecordRow], hierarchy: &HierarchyIndex) {
        self.store.initialize(
            records.iter().map(|row| (row.node, row.timestamp)),
            hierarchy,
        );
    }

    pub fn record_created(
        &self,
        node: NodeId,
        timestamp: OffsetDateTime,
        hierarchy: &HierarchyIndex,
    ) {
        self.store.record_added(node, &timestamp, hierarchy);
    }

    pub fn record_deleted(
        &self,
        node: NodeId,
        timestamp: OffsetDateTime,
        hierarchy: &HierarchyIndex,
    ) {
        self.store.record_removed(node, &timestamp, hierarchy);
    }

    pub fn record_moved(
        &self,
        old_node: NodeId,
        new_node: NodeId,
        timestamp: OffsetDateTime,
        hierarchy: &HierarchyIndex,
    ) {
        self.store
            .record_moved(old_node, new_node, &timestamp, hierarchy);
    }

    pub fn rebuild_paths(&self, nodes: &[NodeId], hierarchy: &HierarchyIndex) {
        self.store.rebuild_recursive(nodes, hierarchy);
    }

    /// Summarize one node. Unknown nodes read as empty, never as an error.
    pub fn query(&self, node: NodeId, scope: StatScope, range: DateRange) -> ActivitySummary {
        match self.store.read(node) {
            Some(entry) => match scope {
                StatScope::Direct => entry.direct.summarize(range),
                StatScope::Recursive => entry.recursive.summarize(range),
            },
            None => ActivitySummary::default(),
        }
    }

    /// Summarize across every tracked node, hierarchy shape notwithstanding.
    ///
    /// Separate aggregation path from any single node's recursive value: a
    /// forest with multiple roots has no node whose subtree covers
    /// everything. Scans every entry per call.
    pub fn query_global(&self, scope: StatScope, range: DateRange) -> ActivitySummary {
        let mut merged = ActivityAggregate::default();
        self.store.for_each(|_, entry| match scope {
            StatScope::Direct => merged.absorb(&entry.direct),
            StatScope::Recursive => merged.absorb(&entry.recursive),
        });
        merged.summarize(range)
    }

    pub fn tracked_nodes(&self) -> usize {
        self.store.tracked_nodes()
    }

    /// Direct-vs-recursive consistency probe used by invariant checks.
    pub fn entry_totals(&self, node: NodeId) -> Option<(u64, u64)> {
        self.store
            .read(node)
            .map(|entry| (entry.direct.total(), entry.recursive.total()))
    }
}
