//! Typed domain events consumed by the statistics caches.
//!
//! The union is a closed sum type: every variant carries exactly the fields
//! its handlers need, so an invalid payload/kind pairing cannot be
//! constructed.

use time::OffsetDateTime;

use super::types::NodeId;

/// A content or structural mutation reported by the owning collaborator.
///
/// Content variants leave the tree shape intact and propagate as O(depth)
/// deltas; [`ContentEvent::NodeReparented`] changes the tree shape itself and
/// triggers scoped recomputation.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentEvent {
    /// A post was created under `node` at `timestamp`.
    RecordCreated {
        node: NodeId,
        timestamp: OffsetDateTime,
    },
    /// A post was deleted from `node`; `timestamp` is the post's original
    /// creation time, so the delta retracts the right day bucket.
    RecordDeleted {
        node: NodeId,
        timestamp: OffsetDateTime,
    },
    /// A post moved from `old_node` to `node`, keeping its timestamp.
    RecordMoved {
        node: NodeId,
        old_node: NodeId,
        timestamp: OffsetDateTime,
    },
    /// Category `node` was re-attached from `old_parent` to `new_parent`;
    /// `None` means the category is (or becomes) a forest root.
    NodeReparented {
        node: NodeId,
        old_parent: Option<NodeId>,
        new_parent: Option<NodeId>,
    },
    /// An attachment of `size_bytes` was stored under `node`.
    FileAdded { node: NodeId, size_bytes: u64 },
    /// An attachment of `size_bytes` was removed from `node`.
    FileRemoved { node: NodeId, size_bytes: u64 },
}

impl ContentEvent {
    /// True for events that mutate the tree shape rather than its content.
    pub fn is_structural(&self) -> bool {
        matches!(self, ContentEvent::NodeReparented { .. })
    }

    /// Stable label for logging and metrics.
    pub fn kind_label(&self) -> &'static str {
        match self {
            ContentEvent::RecordCreated { .. } => "record_created",
            ContentEvent::RecordDeleted { .. } => "record_deleted",
            ContentEvent::RecordMoved { .. } => "record_moved",
            ContentEvent::NodeReparented { .. } => "node_reparented",
            ContentEvent::FileAdded { .. } => "file_added",
            ContentEvent::FileRemoved { .. } => "file_removed",
        }
    }
}
