//! Generic per-node statistics storage.
//!
//! One [`StatStore`] instance backs each statistics kind. Every touched node
//! owns a [`StatEntry`] holding a *direct* aggregate and a *recursive*
//! aggregate; the store keeps the two consistent under the core invariant
//!
//! ```text
//! recursive[n] = direct[n] ⊕ Σ direct[d]  for d ∈ strict_descendants(n)
//! ```
//!
//! Content deltas cost O(depth): because every ancestor's recursive value is
//! a linear aggregate over a subtree containing the touched node, the same
//! delta applies unchanged along the whole inclusive ancestor chain.
//!
//! Locking: the node→entry map is a concurrent map wrapped in one coarse
//! `RwLock` whose write side is taken only to swap in a freshly built map
//! during (re)initialization. Each entry carries its own `RwLock`; walks
//! lock one entry at a time and never hold two entry locks simultaneously.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use dashmap::DashMap;

use crate::domain::types::NodeId;

use super::hierarchy::HierarchyIndex;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "stats::store";

/// A statistic payload that can absorb and retract per-record deltas.
pub trait Aggregate: Clone + Default + Send + Sync + 'static {
    /// The contribution of a single record.
    type Delta: Clone + Send + Sync;

    /// Fold one record into the aggregate.
    fn apply(&mut self, delta: &Self::Delta);

    /// Remove one record's contribution. Retracting a contribution that was
    /// never applied must leave the aggregate unchanged rather than
    /// underflow; stale deletes are tolerated, not amplified.
    fn retract(&mut self, delta: &Self::Delta);

    /// Fold a whole sibling aggregate in (the ⊕ combine operator).
    fn absorb(&mut self, other: &Self);

    /// True when the aggregate carries no contributions.
    fn is_empty(&self) -> bool;
}

/// Per-node cached aggregates for one statistics kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatEntry<A> {
    /// Contribution of content attached directly to the node.
    pub direct: A,
    /// Contribution of the node plus every strict descendant.
    pub recursive: A,
}

type EntryMap<A> = DashMap<NodeId, Arc<RwLock<StatEntry<A>>>>;

/// Concurrent node→entry storage for one statistics kind.
pub struct StatStore<A: Aggregate> {
    entries: RwLock<EntryMap<A>>,
}

impl<A: Aggregate> Default for StatStore<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Aggregate> StatStore<A> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(DashMap::new()),
        }
    }

    /// Rebuild the whole store from raw rows.
    ///
    /// Two-phase by construction: all direct aggregates are grouped first,
    /// and only then is any node's recursive aggregate computed, since the
    /// recursive value needs every descendant's finished direct value. The
    /// result is assembled into a fresh map and swapped in at the end, so a
    /// failure or concurrent read never observes a half-built store.
    pub fn initialize<I>(&self, rows: I, hierarchy: &HierarchyIndex)
    where
        I: IntoIterator<Item = (NodeId, A::Delta)>,
    {
        let mut direct: HashMap<NodeId, A> = HashMap::new();
        for (node, delta) in rows {
            direct.entry(node).or_default().apply(&delta);
        }

        let fresh: EntryMap<A> = DashMap::new();
        for tree_node in hierarchy.nodes() {
            let own = direct.get(&tree_node.id).cloned().unwrap_or_default();
            let mut recursive = own.clone();
            for descendant in hierarchy.descendants(tree_node.id) {
                if let Some(contribution) = direct.get(&descendant) {
                    recursive.absorb(contribution);
                }
            }
            fresh.insert(
                tree_node.id,
                Arc::new(RwLock::new(StatEntry {
                    direct: own,
                    recursive,
                })),
            );
        }

        // Content can reference nodes the hierarchy has never reported;
        // those entries aggregate only themselves.
        for (node, own) in direct {
            if !fresh.contains_key(&node) {
                fresh.insert(
                    node,
                    Arc::new(RwLock::new(StatEntry {
                        direct: own.clone(),
                        recursive: own,
                    })),
                );
            }
        }

        *rw_write(&self.entries, SOURCE, "initialize") = fresh;
    }

    /// Apply one record's delta at `node` and along its ancestor chain.
    pub fn record_added(&self, node: NodeId, delta: &A::Delta, hierarchy: &HierarchyIndex) {
        self.walk(node, delta, hierarchy, Direction::Apply);
    }

    /// Retract one record's delta at `node` and along its ancestor chain.
    pub fn record_removed(&self, node: NodeId, delta: &A::Delta, hierarchy: &HierarchyIndex) {
        self.walk(node, delta, hierarchy, Direction::Retract);
    }

    /// Move one record between nodes: a retraction at `old_node` followed by
    /// an application at `new_node`. The two walks touch disjoint or
    /// partially overlapping ancestor sets and commute.
    pub fn record_moved(
        &self,
        old_node: NodeId,
        new_node: NodeId,
        delta: &A::Delta,
        hierarchy: &HierarchyIndex,
    ) {
        self.walk(old_node, delta, hierarchy, Direction::Retract);
        self.walk(new_node, delta, hierarchy, Direction::Apply);
    }

    fn walk(&self, node: NodeId, delta: &A::Delta, hierarchy: &HierarchyIndex, dir: Direction) {
        // Held for the whole walk so a reinitialize cannot swap the map
        // between the direct update and the ancestor chain.
        let map = rw_read(&self.entries, SOURCE, "walk");

        {
            let entry = entry_handle(&map, node);
            let mut guard = rw_write(&entry, SOURCE, "walk.direct");
            match dir {
                Direction::Apply => guard.direct.apply(delta),
                Direction::Retract => guard.direct.retract(delta),
            }
        }

        for ancestor in hierarchy.ancestors_inclusive(node) {
            let entry = entry_handle(&map, ancestor);
            let mut guard = rw_write(&entry, SOURCE, "walk.recursive");
            match dir {
                Direction::Apply => guard.recursive.apply(delta),
                Direction::Retract => guard.recursive.retract(delta),
            }
        }
    }

    /// Recompute the recursive aggregate of each listed node from its
    /// current descendant set.
    ///
    /// Used after structural changes, where the incremental-delta shortcut
    /// does not apply because the ancestor sets themselves changed. The sum
    /// is assembled without holding the target's lock; each descendant's
    /// direct value is read one entry lock at a time.
    pub fn rebuild_recursive(&self, nodes: &[NodeId], hierarchy: &HierarchyIndex) {
        // Write side: content walks hold the read side for their whole
        // event, so every applied delta is visible to the recomputed sums.
        let map = rw_write(&self.entries, SOURCE, "rebuild_recursive");

        for &node in nodes {
            let mut sum = match map.get(&node).map(|entry| entry.value().clone()) {
                Some(entry) => rw_read(&entry, SOURCE, "rebuild.own").direct.clone(),
                None => A::default(),
            };
            for descendant in hierarchy.descendants(node) {
                if let Some(entry) = map.get(&descendant).map(|entry| entry.value().clone()) {
                    sum.absorb(&rw_read(&entry, SOURCE, "rebuild.descendant").direct);
                }
            }

            if sum.is_empty() && !map.contains_key(&node) {
                continue;
            }
            let entry = entry_handle(&map, node);
            rw_write(&entry, SOURCE, "rebuild.store").recursive = sum;
        }
    }

    /// Snapshot one node's entry; absent nodes read as `None`.
    pub fn read(&self, node: NodeId) -> Option<StatEntry<A>> {
        let map = rw_read(&self.entries, SOURCE, "read");
        let entry = map.get(&node).map(|entry| entry.value().clone())?;
        let guard = rw_read(&entry, SOURCE, "read.entry");
        Some(guard.clone())
    }

    /// Visit every entry, one entry lock at a time.
    ///
    /// This is the global aggregation path: O(#entries) per call, by design
    /// not incrementally cached.
    pub fn for_each(&self, mut visit: impl FnMut(NodeId, &StatEntry<A>)) {
        let map = rw_read(&self.entries, SOURCE, "for_each");
        for item in map.iter() {
            let node = *item.key();
            let entry = item.value().clone();
            drop(item);
            let guard = rw_read(&entry, SOURCE, "for_each.entry");
            visit(node, &guard);
        }
    }

    /// Number of nodes with a cached entry.
    pub fn tracked_nodes(&self) -> usize {
        rw_read(&self.entries, SOURCE, "tracked_nodes").len()
    }
}

#[derive(Clone, Copy)]
enum Direction {
    Apply,
    Retract,
}

fn entry_handle<A: Aggregate>(map: &EntryMap<A>, node: NodeId) -> Arc<RwLock<StatEntry<A>>> {
    Arc::clone(map.entry(node).or_default().value())
}
