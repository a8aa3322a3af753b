//! Shared domain identifiers and enumerations.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a category node in the hierarchy.
///
/// The value `0` is reserved: callers may pass [`NodeId::GLOBAL`] through the
/// per-node query path to request the forest-wide aggregation instead of a
/// single node's statistics.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl NodeId {
    /// Reserved sentinel routing a per-node query to the global view.
    pub const GLOBAL: NodeId = NodeId(0);

    pub fn is_global(self) -> bool {
        self == Self::GLOBAL
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier of a content record (a post).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub Uuid);

impl RecordId {
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The independently enableable statistics kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatKind {
    Activity,
    PostCounts,
    FileStats,
}

impl StatKind {
    /// All kinds, in the order the coordinator routes them.
    pub const ALL: [StatKind; 3] = [StatKind::Activity, StatKind::PostCounts, StatKind::FileStats];

    pub fn as_str(self) -> &'static str {
        match self {
            StatKind::Activity => "activity",
            StatKind::PostCounts => "post_counts",
            StatKind::FileStats => "file_stats",
        }
    }
}

/// Whether a query reads the node's own aggregate or the subtree aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatScope {
    /// Content attached directly to the node.
    Direct,
    /// The node plus every strict descendant.
    Recursive,
}
