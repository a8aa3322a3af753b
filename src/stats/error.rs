use thiserror::Error;

use crate::domain::bootstrap::SourceError;
use crate::domain::error::DomainError;

/// Failure to (re)build the statistics caches.
///
/// Any variant surfacing from `initialize` is a fatal startup condition:
/// the engine refuses to serve partially built state.
#[derive(Debug, Error)]
pub enum StatsError {
    #[error("bootstrap read failed: {0}")]
    Source(#[from] SourceError),
    #[error("hierarchy rejected: {0}")]
    Hierarchy(#[from] DomainError),
}
