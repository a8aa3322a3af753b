//! Scalar post-count cache.
//!
//! The same store pattern as activity over the simplest possible payload: a
//! single counter per node.

use crate::domain::bootstrap::RecordRow;
use crate::domain::types::{NodeId, StatScope};

use super::hierarchy::HierarchyIndex;
use super::store::{Aggregate, StatStore};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct CountAggregate {
    total: u64,
}

impl Aggregate for CountAggregate {
    type Delta = u64;

    fn apply(&mut self, delta: &u64) {
        self.total += delta;
    }

    fn retract(&mut self, delta: &u64) {
        self.total = self.total.saturating_sub(*delta);
    }

    fn absorb(&mut self, other: &Self) {
        self.total += other.total;
    }

    fn is_empty(&self) -> bool {
        self.total == 0
    }
}

/// Per-node post counters.
pub struct PostCountCache {
    store: StatStore<CountAggregate>,
}

impl Default for PostCountCache {
    fn default() -> Self {
        Self::new()
    }
}

impl PostCountCache {
    pub fn new() -> Self {
        Self {
            store: StatStore::new(),
        }
    }

    pub fn initialize(&self, records: &[RecordRow], hierarchy: &HierarchyIndex) {
        self.store
            .initialize(records.iter().map(|row| (row.node, 1)), hierarchy);
    }

    pub fn record_created(&self, node: NodeId, hierarchy: &HierarchyIndex) {
        self.store.record_added(node, &1, hierarchy);
    }

    pub fn record_deleted(&self, node: NodeId, hierarchy: &HierarchyIndex) {
        self.store.record_removed(node, &1, hierarchy);
    }

    pub fn record_moved(&self, old_node: NodeId, new_node: NodeId, hierarchy: &HierarchyIndex) {
        self.store.record_moved(old_node, new_node, &1, hierarchy);
    }

    pub fn rebuild_paths(&self, nodes: &[NodeId], hierarchy: &HierarchyIndex) {
        self.store.rebuild_recursive(nodes, hierarchy);
    }

    /// Post count of one node; unknown nodes read as zero.
    pub fn query(&self, node: NodeId, scope: StatScope) -> u64 {
        self.store
            .read(node)
            .map(|entry| match scope {
                StatScope::Direct => entry.direct.total,
                StatScope::Recursive => entry.recursive.total,
            })
            .unwrap_or(0)
    }

    /// Sum across every tracked node; scans all entries per call.
    pub fn query_global(&self, scope: StatScope) -> u64 {
        let mut total = 0;
        self.store.for_each(|_, entry| {
            total += match scope {
                StatScope::Direct => entry.direct.total,
                StatScope::Recursive => entry.recursive.total,
            };
        });
        total
    }

    pub fn tracked_nodes(&self) -> usize {
        self.store.tracked_nodes()
    }
}
