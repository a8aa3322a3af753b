//! Brusio statistics core.
//!
//! Layout mirrors the event flow:
//!
//! - [`hierarchy`]: immutable, arena-backed snapshots of the category tree
//! - [`store`]: the generic per-node direct/recursive cache
//! - [`activity`], [`counts`], [`files`]: the three payload instantiations
//! - [`dispatcher`]: synchronous in-process event fan-out
//! - [`coordinator`]: enable flags, event routing, and the query surface

mod activity;
mod coordinator;
mod counts;
mod dispatcher;
mod error;
mod files;
mod hierarchy;
mod lock;
mod store;

pub use activity::{ActivityCache, ActivitySummary, DateRange, DayBucket};
pub use coordinator::{StatsConfig, StatsCoordinator};
pub use counts::PostCountCache;
pub use dispatcher::{EventDispatcher, EventHandler};
pub use error::StatsError;
pub use files::{FileStatsCache, FileTotals};
pub use hierarchy::{HierarchyIndex, TreeNode};
pub use store::{Aggregate, StatEntry, StatStore};
