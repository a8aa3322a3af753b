//! Bootstrap snapshot rows and the storage collaborator seam.
//!
//! Durable storage is out of scope for this crate; it participates only by
//! supplying full listings at startup (and again when a structural change
//! forces a rebuild). The listings are plain rows so any backend can
//! implement [`StatsSource`].

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

use super::types::{NodeId, RecordId};

/// One category node as persisted: identifier, parent, and tree depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRow {
    pub node: NodeId,
    pub parent: Option<NodeId>,
    pub depth: u32,
}

/// One content record: which node owns it and when it was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordRow {
    pub record: RecordId,
    pub node: NodeId,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// One stored attachment: owning node and size on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRow {
    pub node: NodeId,
    pub size_bytes: u64,
}

/// Failure reading a bootstrap listing from the backing store.
///
/// Treated as fatal by the coordinator: the caches never serve state built
/// from a partial snapshot.
#[derive(Debug, Error)]
#[error("stats source read failed: {message}")]
pub struct SourceError {
    message: String,
}

impl SourceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Read access to the source of truth, used for (re)initialization only.
///
/// All methods are synchronous: initialization runs on the calling thread,
/// matching the rest of the engine's in-memory, lock-based model.
pub trait StatsSource: Send + Sync {
    /// Full listing of category nodes.
    fn hierarchy(&self) -> Result<Vec<NodeRow>, SourceError>;

    /// Full listing of content records.
    fn records(&self) -> Result<Vec<RecordRow>, SourceError>;

    /// Full listing of stored attachments.
    fn attachments(&self) -> Result<Vec<AttachmentRow>, SourceError>;
}
