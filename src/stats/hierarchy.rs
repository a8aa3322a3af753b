//! Arena-backed snapshots of the category tree.
//!
//! Nodes live in a flat slot vector with integer parent/child indices, so an
//! ancestor walk is plain array indexing and a descendant enumeration is a
//! stack-based traversal over child index lists. A snapshot is never mutated
//! in place: structural changes produce a new [`HierarchyIndex`] which the
//! coordinator swaps behind an `Arc`, so concurrent readers never observe a
//! half-updated tree.

use std::collections::HashMap;

use crate::domain::bootstrap::NodeRow;
use crate::domain::error::DomainError;
use crate::domain::types::NodeId;

/// One category node within a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeNode {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    pub depth: u32,
}

#[derive(Debug, Clone)]
struct Slot {
    node: TreeNode,
    parent_slot: Option<usize>,
    child_slots: Vec<usize>,
}

/// An immutable index over the category forest.
#[derive(Debug, Clone, Default)]
pub struct HierarchyIndex {
    slots: Vec<Slot>,
    ids: HashMap<NodeId, usize>,
}

impl HierarchyIndex {
    /// An index with no nodes; every lookup is absent, every listing empty.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build an index from bootstrap rows, validating the forest invariants.
    ///
    /// Rejected inputs: duplicate node ids, a parent id with no row of its
    /// own, and any row where `depth != depth(parent) + 1`. The depth check
    /// doubles as cycle rejection: a parent must always sit strictly above
    /// its children.
    pub fn from_rows(rows: &[NodeRow]) -> Result<Self, DomainError> {
        let mut ids = HashMap::with_capacity(rows.len());
        let mut slots = Vec::with_capacity(rows.len());

        for row in rows {
            if ids.insert(row.node, slots.len()).is_some() {
                return Err(DomainError::validation(format!(
                    "duplicate hierarchy node id {}",
                    row.node
                )));
            }
            slots.push(Slot {
                node: TreeNode {
                    id: row.node,
                    parent: row.parent,
                    depth: row.depth,
                },
                parent_slot: None,
                child_slots: Vec::new(),
            });
        }

        for index in 0..slots.len() {
            let TreeNode { id, parent, depth } = slots[index].node;
            let Some(parent_id) = parent else {
                continue;
            };

            let parent_slot = *ids.get(&parent_id).ok_or_else(|| {
                DomainError::validation(format!("node {id} references unknown parent {parent_id}"))
            })?;
            let parent_depth = slots[parent_slot].node.depth;
            if depth != parent_depth + 1 {
                return Err(DomainError::invariant(format!(
                    "node {id} at depth {depth} under parent {parent_id} at depth {parent_depth}"
                )));
            }

            slots[index].parent_slot = Some(parent_slot);
            slots[parent_slot].child_slots.push(index);
        }

        Ok(Self { slots, ids })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.ids.contains_key(&id)
    }

    /// Look up one node; unknown id returns `None`.
    pub fn get(&self, id: NodeId) -> Option<&TreeNode> {
        self.ids.get(&id).map(|&slot| &self.slots[slot].node)
    }

    /// Every node in the snapshot, in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &TreeNode> {
        self.slots.iter().map(|slot| &slot.node)
    }

    /// The chain from `id` up to its root, `id` first.
    ///
    /// A node the snapshot has never seen still yields itself, so content
    /// landing on an unindexed node is at least tracked locally.
    pub fn ancestors_inclusive(&self, id: NodeId) -> Vec<NodeId> {
        let Some(&start) = self.ids.get(&id) else {
            return vec![id];
        };

        let mut chain = Vec::with_capacity(self.slots[start].node.depth as usize + 1);
        let mut current = Some(start);
        while let Some(slot) = current {
            chain.push(self.slots[slot].node.id);
            current = self.slots[slot].parent_slot;
        }
        chain
    }

    /// Every strict descendant of `id`, depth-first. Unknown id is empty.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let Some(&start) = self.ids.get(&id) else {
            return Vec::new();
        };

        let mut found = Vec::new();
        let mut pending: Vec<usize> = self.slots[start].child_slots.clone();
        while let Some(slot) = pending.pop() {
            found.push(self.slots[slot].node.id);
            pending.extend_from_slice(&self.slots[slot].child_slots);
        }
        found
    }

    /// Copy-on-write insert/replace of a single row.
    ///
    /// Used for non-structural upserts (a newly created category, or metadata
    /// refreshes that keep parent and depth); the replacement snapshot is
    /// validated in full.
    pub fn with_node(&self, row: NodeRow) -> Result<Self, DomainError> {
        let mut rows = self.rows();
        match rows.iter_mut().find(|existing| existing.node == row.node) {
            Some(existing) => *existing = row,
            None => rows.push(row),
        }
        Self::from_rows(&rows)
    }

    /// Copy-on-write re-attach of `id` under `new_parent`.
    ///
    /// Depths of the moved subtree are shifted to match the attachment
    /// point. Fails when `id` or `new_parent` is unknown, or when
    /// `new_parent` lies inside the subtree being moved.
    pub fn with_parent(&self, id: NodeId, new_parent: Option<NodeId>) -> Result<Self, DomainError> {
        if !self.contains(id) {
            return Err(DomainError::not_found("hierarchy node"));
        }
        let new_depth = match new_parent {
            Some(parent_id) => {
                let parent = self
                    .get(parent_id)
                    .ok_or(DomainError::not_found("hierarchy parent"))?;
                if parent_id == id || self.descendants(id).contains(&parent_id) {
                    return Err(DomainError::invariant(format!(
                        "re-attaching node {id} under {parent_id} would create a cycle"
                    )));
                }
                parent.depth + 1
            }
            None => 0,
        };

        let old_depth = self.get(id).map(|node| node.depth).unwrap_or(0);
        let shift = i64::from(new_depth) - i64::from(old_depth);
        let subtree = self.descendants(id);

        let mut rows = self.rows();
        for row in &mut rows {
            if row.node == id {
                row.parent = new_parent;
                row.depth = new_depth;
            } else if subtree.contains(&row.node) {
                row.depth = (i64::from(row.depth) + shift) as u32;
            }
        }
        Self::from_rows(&rows)
    }

    /// The snapshot as bootstrap rows, in slot order.
    pub fn rows(&self) -> Vec<NodeRow> {
        self.slots
            .iter()
            .map(|slot| NodeRow {
                node: slot.node.id,
                parent: slot.node.parent,
                depth: slot.node.depth,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(node: u64, parent: Option<u64>, depth: u32) -> NodeRow {
        NodeRow {
            node: NodeId(node),
            parent: parent.map(NodeId),
            depth,
        }
    }

    /// Root(1) -> Child1(2) -> Grandchild(4), Root(1) -> Child2(3).
    fn reference_rows() -> Vec<NodeRow> {
        vec![
            row(1, None, 0),
            row(2, Some(1), 1),
            row(3, Some(1), 1),
            row(4, Some(2), 2),
        ]
    }

    #[test]
    fn lookup_and_listing() {
        let index = HierarchyIndex::from_rows(&reference_rows()).expect("valid forest");

        assert_eq!(index.len(), 4);
        let grandchild = index.get(NodeId(4)).expect("grandchild present");
        assert_eq!(grandchild.parent, Some(NodeId(2)));
        assert_eq!(grandchild.depth, 2);
        assert!(index.get(NodeId(99)).is_none());
        assert_eq!(index.nodes().count(), 4);
    }

    #[test]
    fn ancestors_walk_node_first_to_root() {
        let index = HierarchyIndex::from_rows(&reference_rows()).expect("valid forest");

        assert_eq!(
            index.ancestors_inclusive(NodeId(4)),
            vec![NodeId(4), NodeId(2), NodeId(1)]
        );
        assert_eq!(index.ancestors_inclusive(NodeId(1)), vec![NodeId(1)]);
        // Unindexed nodes still yield themselves.
        assert_eq!(index.ancestors_inclusive(NodeId(77)), vec![NodeId(77)]);
    }

    #[test]
    fn descendants_are_transitive() {
        let index = HierarchyIndex::from_rows(&reference_rows()).expect("valid forest");

        let mut all = index.descendants(NodeId(1));
        all.sort_unstable();
        assert_eq!(all, vec![NodeId(2), NodeId(3), NodeId(4)]);
        assert_eq!(index.descendants(NodeId(2)), vec![NodeId(4)]);
        assert!(index.descendants(NodeId(4)).is_empty());
        assert!(index.descendants(NodeId(99)).is_empty());
    }

    #[test]
    fn rejects_duplicate_ids() {
        let rows = vec![row(1, None, 0), row(1, None, 0)];
        assert!(matches!(
            HierarchyIndex::from_rows(&rows),
            Err(DomainError::Validation { .. })
        ));
    }

    #[test]
    fn rejects_unknown_parent() {
        let rows = vec![row(2, Some(1), 1)];
        assert!(matches!(
            HierarchyIndex::from_rows(&rows),
            Err(DomainError::Validation { .. })
        ));
    }

    #[test]
    fn rejects_depth_mismatch() {
        let rows = vec![row(1, None, 0), row(2, Some(1), 5)];
        assert!(matches!(
            HierarchyIndex::from_rows(&rows),
            Err(DomainError::Invariant { .. })
        ));
    }

    #[test]
    fn with_node_inserts_and_replaces() {
        let index = HierarchyIndex::from_rows(&reference_rows()).expect("valid forest");

        let grown = index.with_node(row(5, Some(3), 2)).expect("insert node");
        assert_eq!(grown.len(), 5);
        assert_eq!(grown.descendants(NodeId(3)), vec![NodeId(5)]);
        // The original snapshot is untouched.
        assert!(!index.contains(NodeId(5)));
    }

    #[test]
    fn with_parent_moves_subtree_and_rebases_depths() {
        let index = HierarchyIndex::from_rows(&reference_rows()).expect("valid forest");

        let moved = index
            .with_parent(NodeId(2), Some(NodeId(3)))
            .expect("re-attach child1 under child2");

        assert_eq!(moved.get(NodeId(2)).map(|n| n.parent), Some(Some(NodeId(3))));
        assert_eq!(moved.get(NodeId(2)).map(|n| n.depth), Some(2));
        assert_eq!(moved.get(NodeId(4)).map(|n| n.depth), Some(3));
        assert_eq!(
            moved.ancestors_inclusive(NodeId(4)),
            vec![NodeId(4), NodeId(2), NodeId(3), NodeId(1)]
        );
    }

    #[test]
    fn with_parent_can_promote_to_root() {
        let index = HierarchyIndex::from_rows(&reference_rows()).expect("valid forest");

        let promoted = index.with_parent(NodeId(2), None).expect("promote to root");
        assert_eq!(promoted.get(NodeId(2)).map(|n| n.depth), Some(0));
        assert_eq!(promoted.get(NodeId(4)).map(|n| n.depth), Some(1));
        assert_eq!(promoted.ancestors_inclusive(NodeId(4)), vec![NodeId(4), NodeId(2)]);
    }

    #[test]
    fn with_parent_rejects_cycles() {
        let index = HierarchyIndex::from_rows(&reference_rows()).expect("valid forest");

        assert!(matches!(
            index.with_parent(NodeId(2), Some(NodeId(4))),
            Err(DomainError::Invariant { .. })
        ));
        assert!(matches!(
            index.with_parent(NodeId(2), Some(NodeId(2))),
            Err(DomainError::Invariant { .. })
        ));
    }

    #[test]
    fn with_parent_rejects_unknown_nodes() {
        let index = HierarchyIndex::from_rows(&reference_rows()).expect("valid forest");

        assert!(matches!(
            index.with_parent(NodeId(99), Some(NodeId(1))),
            Err(DomainError::NotFound { .. })
        ));
        assert!(matches!(
            index.with_parent(NodeId(2), Some(NodeId(99))),
            Err(DomainError::NotFound { .. })
        ));
    }
}
