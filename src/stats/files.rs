//! Attachment count and storage totals per node.

use std::fmt;

use serde::Serialize;

use crate::domain::bootstrap::AttachmentRow;
use crate::domain::types::{NodeId, StatScope};
use crate::util::bytes::format_bytes;

use super::hierarchy::HierarchyIndex;
use super::store::{Aggregate, StatStore};

/// Attachment totals: how many files and how many bytes they occupy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FileTotals {
    pub count: u64,
    pub bytes: u64,
}

impl fmt::Display for FileTotals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} files ({})", self.count, format_bytes(self.bytes))
    }
}

impl Aggregate for FileTotals {
    type Delta = u64;

    fn apply(&mut self, size_bytes: &u64) {
        self.count += 1;
        self.bytes += size_bytes;
    }

    fn retract(&mut self, size_bytes: &u64) {
        if self.count == 0 {
            return;
        }
        self.count -= 1;
        self.bytes = self.bytes.saturating_sub(*size_bytes);
    }

    fn absorb(&mut self, other: &Self) {
        self.count += other.count;
        self.bytes += other.bytes;
    }

    fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Per-node attachment statistics.
pub struct FileStatsCache {
    store: StatStore<FileTotals>,
}

impl Default for FileStatsCache {
    fn default() -> Self {
        Self::new()
    }
}

impl FileStatsCache {
    pub fn new() -> Self {
        Self {
            store: StatStore::new(),
        }
    }

    pub fn initialize(&self, attachments: &[AttachmentRow], hierarchy: &HierarchyIndex) {
        self.store.initialize(
            attachments.iter().map(|row| (row.node, row.size_bytes)),
            hierarchy,
        );
    }

    pub fn file_added(&self, node: NodeId, size_bytes: u64, hierarchy: &HierarchyIndex) {
        self.store.record_added(node, &size_bytes, hierarchy);
    }

    pub fn file_removed(&self, node: NodeId, size_bytes: u64, hierarchy: &HierarchyIndex) {
        self.store.record_removed(node, &size_bytes, hierarchy);
    }

    pub fn rebuild_paths(&self, nodes: &[NodeId], hierarchy: &HierarchyIndex) {
        self.store.rebuild_recursive(nodes, hierarchy);
    }

    /// Totals for one node; unknown nodes read as zero.
    pub fn query(&self, node: NodeId, scope: StatScope) -> FileTotals {
        self.store
            .read(node)
            .map(|entry| match scope {
                StatScope::Direct => entry.direct,
                StatScope::Recursive => entry.recursive,
            })
            .unwrap_or_default()
    }

    /// Totals across every tracked node; scans all entries per call.
    pub fn query_global(&self, scope: StatScope) -> FileTotals {
        let mut merged = FileTotals::default();
        self.store.for_each(|_, entry| match scope {
            StatScope::Direct => merged.absorb(&entry.direct),
            StatScope::Recursive => merged.absorb(&entry.recursive),
        });
        merged
    }

    pub fn tracked_nodes(&self) -> usize {
        self.store.tracked_nodes()
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::bootstrap::NodeRow;

    use super::*;

    fn hierarchy() -> HierarchyIndex {
        let rows = vec![
            NodeRow {
                node: NodeId(1),
                parent: None,
                depth: 0,
            },
            NodeRow {
                node: NodeId(2),
                parent: Some(NodeId(1)),
                depth: 1,
            },
        ];
        HierarchyIndex::from_rows(&rows).expect("valid forest")
    }

    #[test]
    fn upload_and_delete_roundtrip() {
        let hierarchy = hierarchy();
        let cache = FileStatsCache::new();
        cache.initialize(&[], &hierarchy);

        cache.file_added(NodeId(2), 2048, &hierarchy);
        cache.file_added(NodeId(2), 1024, &hierarchy);

        let subtree = cache.query(NodeId(1), StatScope::Recursive);
        assert_eq!(subtree.count, 2);
        assert_eq!(subtree.bytes, 3072);

        cache.file_removed(NodeId(2), 2048, &hierarchy);
        let subtree = cache.query(NodeId(1), StatScope::Recursive);
        assert_eq!(subtree.count, 1);
        assert_eq!(subtree.bytes, 1024);
    }

    #[test]
    fn initialize_sums_attachment_sizes() {
        let hierarchy = hierarchy();
        let cache = FileStatsCache::new();
        cache.initialize(
            &[
                AttachmentRow {
                    node: NodeId(1),
                    size_bytes: 100,
                },
                AttachmentRow {
                    node: NodeId(2),
                    size_bytes: 300,
                },
            ],
            &hierarchy,
        );

        assert_eq!(
            cache.query(NodeId(1), StatScope::Direct),
            FileTotals {
                count: 1,
                bytes: 100
            }
        );
        assert_eq!(
            cache.query(NodeId(1), StatScope::Recursive),
            FileTotals {
                count: 2,
                bytes: 400
            }
        );
        assert_eq!(cache.query_global(StatScope::Direct).bytes, 400);
    }

    #[test]
    fn totals_render_human_readable() {
        let totals = FileTotals {
            count: 3,
            bytes: 1536,
        };
        assert_eq!(totals.to_string(), "3 files (1.5 KiB)");
    }
}
