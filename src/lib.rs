//! Brusio Statistics Engine
//!
//! An embeddable, in-memory statistics engine for hierarchical community
//! content. Each category node carries a *direct* aggregate (content attached
//! to the node itself) and a *recursive* aggregate (the node plus every
//! strict descendant), kept consistent under concurrent content mutations
//! and category re-parenting without rereading the backing store.
//!
//! Three statistics kinds share one generic store:
//!
//! - **Activity**: per-day posting histograms with exact first/last markers
//! - **Post counts**: scalar totals per category
//! - **File stats**: attachment count and byte totals per category
//!
//! The engine is bootstrapped once from a [`domain::bootstrap::StatsSource`]
//! and afterwards fed typed [`domain::events::ContentEvent`]s through the
//! [`stats::StatsCoordinator`], either directly or via the synchronous
//! [`stats::EventDispatcher`].
//!
//! ## Configuration
//!
//! Behavior is controlled via `brusio.toml` (or `BRUSIO`-prefixed
//! environment variables and host CLI overrides):
//!
//! ```toml
//! [stats]
//! enable_activity = true
//! enable_post_counts = true
//! enable_file_stats = true
//!
//! [logging]
//! level = "info"
//! json = false
//! ```

pub mod config;
pub mod domain;
pub mod infra;
pub mod stats;
pub mod util;
