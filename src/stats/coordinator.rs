//! Composition of the per-kind caches behind one entry point.
//!
//! The coordinator owns the hierarchy snapshot and the per-kind enable
//! flags, routes events to every enabled cache, and is the only component
//! allowed to swap the hierarchy. Content events are O(depth) deltas;
//! structural events rebuild exactly the ancestor paths whose descendant
//! sets changed, falling back to full reinitialization from the source when
//! a re-attach cannot be applied incrementally.

use std::sync::{Arc, RwLock};
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use tracing::{debug, error, info, warn};

use crate::config::StatsSettings;
use crate::domain::bootstrap::{NodeRow, StatsSource};
use crate::domain::events::ContentEvent;
use crate::domain::types::{NodeId, StatKind, StatScope};

use super::activity::{ActivityCache, ActivitySummary, DateRange};
use super::counts::PostCountCache;
use super::dispatcher::{EventDispatcher, EventHandler};
use super::error::StatsError;
use super::files::{FileStatsCache, FileTotals};
use super::hierarchy::HierarchyIndex;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "stats::coordinator";

/// Which statistics kinds are maintained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsConfig {
    pub enable_activity: bool,
    pub enable_post_counts: bool,
    pub enable_file_stats: bool,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            enable_activity: true,
            enable_post_counts: true,
            enable_file_stats: true,
        }
    }
}

impl From<&StatsSettings> for StatsConfig {
    fn from(settings: &StatsSettings) -> Self {
        Self {
            enable_activity: settings.enable_activity,
            enable_post_counts: settings.enable_post_counts,
            enable_file_stats: settings.enable_file_stats,
        }
    }
}

impl StatsConfig {
    pub fn is_enabled(&self, kind: StatKind) -> bool {
        match kind {
            StatKind::Activity => self.enable_activity,
            StatKind::PostCounts => self.enable_post_counts,
            StatKind::FileStats => self.enable_file_stats,
        }
    }

    pub fn any_enabled(&self) -> bool {
        StatKind::ALL.iter().any(|&kind| self.is_enabled(kind))
    }
}

/// The statistics engine's single entry point.
pub struct StatsCoordinator {
    config: StatsConfig,
    source: Arc<dyn StatsSource>,
    hierarchy: RwLock<Arc<HierarchyIndex>>,
    activity: ActivityCache,
    post_counts: PostCountCache,
    file_stats: FileStatsCache,
}

impl StatsCoordinator {
    pub fn new(config: StatsConfig, source: Arc<dyn StatsSource>) -> Self {
        Self {
            config,
            source,
            hierarchy: RwLock::new(Arc::new(HierarchyIndex::empty())),
            activity: ActivityCache::new(),
            post_counts: PostCountCache::new(),
            file_stats: FileStatsCache::new(),
        }
    }

    pub fn enabled(&self, kind: StatKind) -> bool {
        self.config.is_enabled(kind)
    }

    /// The current hierarchy snapshot.
    pub fn hierarchy(&self) -> Arc<HierarchyIndex> {
        Arc::clone(&rw_read(&self.hierarchy, SOURCE, "hierarchy"))
    }

    /// Build every enabled cache from the source of truth.
    ///
    /// Synchronous and O(total records); runs at startup and again whenever
    /// a structural change invalidates incremental bookkeeping. Each store
    /// is assembled fresh and swapped in whole, so an error from the source
    /// leaves the previously served state untouched.
    pub fn initialize(&self) -> Result<(), StatsError> {
        let started = Instant::now();

        // Exclusive for the whole rebuild: a racing structural event must
        // not derive a snapshot between the store builds and the swap.
        let mut hierarchy = rw_write(&self.hierarchy, SOURCE, "initialize");

        let rows = self.source.hierarchy()?;
        let index = Arc::new(HierarchyIndex::from_rows(&rows)?);

        let records = if self.enabled(StatKind::Activity) || self.enabled(StatKind::PostCounts) {
            self.source.records()?
        } else {
            Vec::new()
        };
        let attachments = if self.enabled(StatKind::FileStats) {
            self.source.attachments()?
        } else {
            Vec::new()
        };

        if self.enabled(StatKind::Activity) {
            self.activity.initialize(&records, &index);
        }
        if self.enabled(StatKind::PostCounts) {
            self.post_counts.initialize(&records, &index);
        }
        if self.enabled(StatKind::FileStats) {
            self.file_stats.initialize(&attachments, &index);
        }

        *hierarchy = Arc::clone(&index);
        drop(hierarchy);

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        histogram!("brusio_stats_initialize_ms").record(elapsed_ms);
        gauge!("brusio_stats_tracked_nodes").set(index.len() as f64);
        info!(
            nodes = index.len(),
            records = records.len(),
            attachments = attachments.len(),
            elapsed_ms,
            "Statistics caches initialized"
        );
        Ok(())
    }

    /// Route one event to every enabled cache.
    ///
    /// Synchronous: when this returns, every enabled cache reflects the
    /// event and a read on any thread observes it.
    pub fn apply(&self, event: &ContentEvent) {
        if let ContentEvent::NodeReparented {
            node,
            old_parent,
            new_parent,
        } = event
        {
            self.handle_structural(*node, *old_parent, *new_parent);
            return;
        }

        for kind in StatKind::ALL {
            self.apply_for(kind, event);
        }
    }

    /// Apply one event to one kind's cache; disabled kinds are silent no-ops.
    fn apply_for(&self, kind: StatKind, event: &ContentEvent) {
        if !self.enabled(kind) {
            debug!(
                kind = kind.as_str(),
                event_kind = event.kind_label(),
                "Stats event skipped: kind disabled"
            );
            return;
        }

        let hierarchy = self.hierarchy();
        let applied = match (kind, event) {
            (StatKind::Activity, ContentEvent::RecordCreated { node, timestamp }) => {
                self.activity.record_created(*node, *timestamp, &hierarchy);
                true
            }
            (StatKind::Activity, ContentEvent::RecordDeleted { node, timestamp }) => {
                self.activity.record_deleted(*node, *timestamp, &hierarchy);
                true
            }
            (
                StatKind::Activity,
                ContentEvent::RecordMoved {
                    node,
                    old_node,
                    timestamp,
                },
            ) => {
                self.activity
                    .record_moved(*old_node, *node, *timestamp, &hierarchy);
                true
            }
            (StatKind::PostCounts, ContentEvent::RecordCreated { node, .. }) => {
                self.post_counts.record_created(*node, &hierarchy);
                true
            }
            (StatKind::PostCounts, ContentEvent::RecordDeleted { node, .. }) => {
                self.post_counts.record_deleted(*node, &hierarchy);
                true
            }
            (StatKind::PostCounts, ContentEvent::RecordMoved { node, old_node, .. }) => {
                self.post_counts.record_moved(*old_node, *node, &hierarchy);
                true
            }
            (StatKind::FileStats, ContentEvent::FileAdded { node, size_bytes }) => {
                self.file_stats.file_added(*node, *size_bytes, &hierarchy);
                true
            }
            (StatKind::FileStats, ContentEvent::FileRemoved { node, size_bytes }) => {
                self.file_stats.file_removed(*node, *size_bytes, &hierarchy);
                true
            }
            _ => false,
        };

        if applied {
            counter!("brusio_stats_events_total", "kind" => kind.as_str()).increment(1);
        }
    }

    /// Re-attach `node` and rebuild exactly the two affected ancestor paths.
    ///
    /// Content under the moved subtree did not change, and neither did any
    /// recursive value inside it, so only the old parent's and the new
    /// parent's inclusive ancestor chains are recomputed from their current
    /// descendant sets. A re-attach the snapshot rejects (unknown node,
    /// cycle) falls back to full reinitialization rather than serving an
    /// inconsistent tree.
    fn handle_structural(
        &self,
        node: NodeId,
        event_old_parent: Option<NodeId>,
        new_parent: Option<NodeId>,
    ) {
        let started = Instant::now();
        // Held across read, re-attach, swap, and rebuild: two structural
        // events must never derive from the same base snapshot.
        let mut hierarchy = rw_write(&self.hierarchy, SOURCE, "reparent");
        let current = Arc::clone(&hierarchy);
        // Trust the snapshot's recorded parent over the event payload when
        // both exist; the snapshot is what the caches were maintained
        // against.
        let old_parent = current
            .get(node)
            .map(|tree_node| tree_node.parent)
            .unwrap_or(event_old_parent);

        let rejected = match current.with_parent(node, new_parent) {
            Ok(next) => {
                let next = Arc::new(next);

                let mut affected: Vec<NodeId> = Vec::new();
                for parent in [old_parent, new_parent].into_iter().flatten() {
                    for ancestor in next.ancestors_inclusive(parent) {
                        if !affected.contains(&ancestor) {
                            affected.push(ancestor);
                        }
                    }
                }

                *hierarchy = Arc::clone(&next);

                if self.enabled(StatKind::Activity) {
                    self.activity.rebuild_paths(&affected, &next);
                }
                if self.enabled(StatKind::PostCounts) {
                    self.post_counts.rebuild_paths(&affected, &next);
                }
                if self.enabled(StatKind::FileStats) {
                    self.file_stats.rebuild_paths(&affected, &next);
                }

                let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
                histogram!("brusio_stats_rebuild_ms").record(elapsed_ms);
                counter!("brusio_stats_rebuilds_total", "mode" => "scoped").increment(1);
                info!(
                    node = %node,
                    affected_paths = affected.len(),
                    elapsed_ms,
                    "Category re-parented; ancestor paths rebuilt"
                );
                None
            }
            Err(err) => Some(err),
        };
        drop(hierarchy);

        if let Some(err) = rejected {
            warn!(
                node = %node,
                error = %err,
                "Re-parent rejected by hierarchy; reinitializing from source"
            );
            counter!("brusio_stats_rebuilds_total", "mode" => "full").increment(1);
            if let Err(err) = self.initialize() {
                error!(
                    error = %err,
                    "Statistics reinitialization failed; serving last consistent state"
                );
            }
        }
    }

    /// Record a non-structural category upsert (new category, metadata
    /// refresh). New categories carry no content yet, so no aggregate work
    /// is needed beyond the snapshot swap.
    pub fn node_upserted(&self, row: NodeRow) -> Result<(), StatsError> {
        let mut hierarchy = rw_write(&self.hierarchy, SOURCE, "node_upserted");
        let next = Arc::new(hierarchy.with_node(row)?);
        *hierarchy = Arc::clone(&next);
        drop(hierarchy);
        gauge!("brusio_stats_tracked_nodes").set(next.len() as f64);
        debug!(node = %row.node, "Hierarchy snapshot updated");
        Ok(())
    }

    /// Category deletion: descendant enumeration assumptions are broadly
    /// invalidated, so every enabled cache is rebuilt wholesale from the
    /// source. Abandoned entries of the deleted subtree vanish with the
    /// swap.
    pub fn node_deleted(&self, node: NodeId) -> Result<(), StatsError> {
        info!(node = %node, "Category deleted; reinitializing statistics caches");
        counter!("brusio_stats_rebuilds_total", "mode" => "full").increment(1);
        self.initialize()
    }

    /// Activity summary for `node`, or the forest-wide view for
    /// [`NodeId::GLOBAL`]. Disabled or unknown → empty summary.
    pub fn activity(&self, node: NodeId, scope: StatScope, range: DateRange) -> ActivitySummary {
        if !self.enabled(StatKind::Activity) {
            return ActivitySummary::default();
        }
        if node.is_global() {
            self.activity.query_global(scope, range)
        } else {
            self.activity.query(node, scope, range)
        }
    }

    /// Post count for `node`, or forest-wide for [`NodeId::GLOBAL`].
    pub fn post_count(&self, node: NodeId, scope: StatScope) -> u64 {
        if !self.enabled(StatKind::PostCounts) {
            return 0;
        }
        if node.is_global() {
            self.post_counts.query_global(scope)
        } else {
            self.post_counts.query(node, scope)
        }
    }

    /// Attachment totals for `node`, or forest-wide for [`NodeId::GLOBAL`].
    pub fn file_totals(&self, node: NodeId, scope: StatScope) -> FileTotals {
        if !self.enabled(StatKind::FileStats) {
            return FileTotals::default();
        }
        if node.is_global() {
            self.file_stats.query_global(scope)
        } else {
            self.file_stats.query(node, scope)
        }
    }

    /// Register one subscriber per enabled cache kind, plus the structural
    /// subscriber, in deterministic order.
    pub fn attach(self: &Arc<Self>, dispatcher: &EventDispatcher) {
        for kind in StatKind::ALL {
            if self.enabled(kind) {
                dispatcher.subscribe(Arc::new(CacheSubscriber {
                    kind,
                    coordinator: Arc::clone(self),
                }));
            }
        }
        dispatcher.subscribe(Arc::new(StructuralSubscriber {
            coordinator: Arc::clone(self),
        }));
    }
}

/// Routes content events into one cache kind.
struct CacheSubscriber {
    kind: StatKind,
    coordinator: Arc<StatsCoordinator>,
}

impl EventHandler for CacheSubscriber {
    fn label(&self) -> &'static str {
        self.kind.as_str()
    }

    fn on_event(&self, event: &ContentEvent) {
        if !event.is_structural() {
            self.coordinator.apply_for(self.kind, event);
        }
    }
}

/// Routes structural events to the coordinator itself.
struct StructuralSubscriber {
    coordinator: Arc<StatsCoordinator>,
}

impl EventHandler for StructuralSubscriber {
    fn label(&self) -> &'static str {
        "structural"
    }

    fn on_event(&self, event: &ContentEvent) {
        if let ContentEvent::NodeReparented {
            node,
            old_parent,
            new_parent,
        } = event
        {
            self.coordinator
                .handle_structural(*node, *old_parent, *new_parent);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use time::macros::{date, datetime};

    use crate::domain::bootstrap::{AttachmentRow, RecordRow, SourceError};
    use crate::domain::types::RecordId;

    use super::*;

    #[derive(Default)]
    struct MemorySource {
        nodes: Mutex<Vec<NodeRow>>,
        records: Mutex<Vec<RecordRow>>,
        attachments: Mutex<Vec<AttachmentRow>>,
        fail_hierarchy: Mutex<bool>,
    }

    impl StatsSource for MemorySource {
        fn hierarchy(&self) -> Result<Vec<NodeRow>, SourceError> {
            if *self.fail_hierarchy.lock().expect("fixture lock") {
                return Err(SourceError::new("simulated outage"));
            }
            Ok(self.nodes.lock().expect("fixture lock").clone())
        }

        fn records(&self) -> Result<Vec<RecordRow>, SourceError> {
            Ok(self.records.lock().expect("fixture lock").clone())
        }

        fn attachments(&self) -> Result<Vec<AttachmentRow>, SourceError> {
            Ok(self.attachments.lock().expect("fixture lock").clone())
        }
    }

    fn node_row(node: u64, parent: Option<u64>, depth: u32) -> NodeRow {
        NodeRow {
            node: NodeId(node),
            parent: parent.map(NodeId),
            depth,
        }
    }

    fn reference_source() -> Arc<MemorySource> {
        let source = MemorySource::default();
        *source.nodes.lock().expect("fixture lock") = vec![
            node_row(1, None, 0),
            node_row(2, Some(1), 1),
            node_row(3, Some(1), 1),
            node_row(4, Some(2), 2),
        ];
        let ts = datetime!(2024-06-01 12:00 UTC);
        *source.records.lock().expect("fixture lock") = [1, 1, 2, 2, 3, 4]
            .into_iter()
            .map(|node| RecordRow {
                record: RecordId::random(),
                node: NodeId(node),
                timestamp: ts,
            })
            .collect();
        *source.attachments.lock().expect("fixture lock") = vec![
            AttachmentRow {
                node: NodeId(2),
                size_bytes: 1024,
            },
            AttachmentRow {
                node: NodeId(4),
                size_bytes: 2048,
            },
        ];
        Arc::new(source)
    }

    #[test]
    fn settings_map_onto_config() {
        let settings = StatsSettings {
            enable_activity: true,
            enable_post_counts: false,
            enable_file_stats: true,
        };
        let config = StatsConfig::from(&settings);
        assert!(config.is_enabled(StatKind::Activity));
        assert!(!config.is_enabled(StatKind::PostCounts));
        assert!(config.is_enabled(StatKind::FileStats));
        assert!(config.any_enabled());
    }

    #[test]
    fn initialize_builds_every_enabled_cache() {
        let coordinator =
            StatsCoordinator::new(StatsConfig::default(), reference_source());
        coordinator.initialize().expect("bootstrap");

        assert_eq!(coordinator.post_count(NodeId(1), StatScope::Direct), 2);
        assert_eq!(coordinator.post_count(NodeId(1), StatScope::Recursive), 6);
        assert_eq!(coordinator.post_count(NodeId(2), StatScope::Recursive), 3);
        assert_eq!(
            coordinator.file_totals(NodeId(1), StatScope::Recursive).bytes,
            3072
        );
    }

    #[test]
    fn initialize_propagates_source_failure() {
        let source = reference_source();
        *source.fail_hierarchy.lock().expect("fixture lock") = true;
        let coordinator = StatsCoordinator::new(StatsConfig::default(), source);

        assert!(matches!(
            coordinator.initialize(),
            Err(StatsError::Source(_))
        ));
    }

    #[test]
    fn disabled_kind_is_a_silent_no_op() {
        let config = StatsConfig {
            enable_post_counts: false,
            ..StatsConfig::default()
        };
        let coordinator = StatsCoordinator::new(config, reference_source());
        coordinator.initialize().expect("bootstrap");

        coordinator.apply(&ContentEvent::RecordCreated {
            node: NodeId(2),
            timestamp: datetime!(2024-06-02 09:00 UTC),
        });

        assert_eq!(coordinator.post_count(NodeId(2), StatScope::Direct), 0);
        // The enabled activity cache still saw the event.
        let summary = coordinator.activity(
            NodeId(2),
            StatScope::Direct,
            DateRange::bounded(date!(2024 - 06 - 02), date!(2024 - 06 - 02)),
        );
        assert_eq!(summary.total, 1);
    }

    #[test]
    fn global_sentinel_routes_to_forest_wide_view() {
        let coordinator =
            StatsCoordinator::new(StatsConfig::default(), reference_source());
        coordinator.initialize().expect("bootstrap");

        assert_eq!(coordinator.post_count(NodeId::GLOBAL, StatScope::Direct), 6);
        let summary =
            coordinator.activity(NodeId::GLOBAL, StatScope::Direct, DateRange::UNBOUNDED);
        assert_eq!(summary.total, 6);
        assert_eq!(
            coordinator.file_totals(NodeId::GLOBAL, StatScope::Direct).count,
            2
        );
    }

    #[test]
    fn reparent_rebuilds_both_parent_paths() {
        let coordinator =
            StatsCoordinator::new(StatsConfig::default(), reference_source());
        coordinator.initialize().expect("bootstrap");

        coordinator.apply(&ContentEvent::NodeReparented {
            node: NodeId(4),
            old_parent: Some(NodeId(2)),
            new_parent: Some(NodeId(3)),
        });

        assert_eq!(coordinator.post_count(NodeId(2), StatScope::Recursive), 2);
        assert_eq!(coordinator.post_count(NodeId(3), StatScope::Recursive), 2);
        assert_eq!(coordinator.post_count(NodeId(1), StatScope::Recursive), 6);
        assert_eq!(
            coordinator.hierarchy().get(NodeId(4)).map(|n| n.parent),
            Some(Some(NodeId(3)))
        );
    }

    #[test]
    fn invalid_reparent_falls_back_to_reinitialization() {
        let coordinator =
            StatsCoordinator::new(StatsConfig::default(), reference_source());
        coordinator.initialize().expect("bootstrap");

        // Drift the cache away from the source, then request an impossible
        // re-attach; the fallback rebuild restores source truth.
        coordinator.apply(&ContentEvent::RecordCreated {
            node: NodeId(3),
            timestamp: datetime!(2024-06-03 10:00 UTC),
        });
        assert_eq!(coordinator.post_count(NodeId(3), StatScope::Direct), 2);

        coordinator.apply(&ContentEvent::NodeReparented {
            node: NodeId(2),
            old_parent: Some(NodeId(1)),
            new_parent: Some(NodeId(4)),
        });

        assert_eq!(coordinator.post_count(NodeId(3), StatScope::Direct), 1);
        assert_eq!(coordinator.post_count(NodeId(1), StatScope::Recursive), 6);
    }

    #[test]
    fn node_lifecycle_updates_the_snapshot() {
        let source = reference_source();
        let coordinator = StatsCoordinator::new(StatsConfig::default(), source.clone());
        coordinator.initialize().expect("bootstrap");

        coordinator
            .node_upserted(node_row(5, Some(3), 2))
            .expect("insert category");
        assert!(coordinator.hierarchy().contains(NodeId(5)));

        // Deleting a category rebuilds from whatever the source now holds.
        source
            .nodes
            .lock()
            .expect("fixture lock")
            .retain(|row| row.node != NodeId(4));
        source
            .records
            .lock()
            .expect("fixture lock")
            .retain(|row| row.node != NodeId(4));
        coordinator.node_deleted(NodeId(4)).expect("rebuild");

        assert!(!coordinator.hierarchy().contains(NodeId(4)));
        assert_eq!(coordinator.post_count(NodeId(1), StatScope::Recursive), 5);
        assert_eq!(coordinator.post_count(NodeId(2), StatScope::Recursive), 2);
    }

    #[test]
    fn attached_dispatcher_feeds_every_enabled_cache() {
        let coordinator = Arc::new(StatsCoordinator::new(
            StatsConfig::default(),
            reference_source(),
        ));
        coordinator.initialize().expect("bootstrap");

        let dispatcher = EventDispatcher::new();
        coordinator.attach(&dispatcher);
        // Three kind subscribers plus the structural one.
        assert_eq!(dispatcher.handler_count(), 4);

        dispatcher.publish(&ContentEvent::RecordCreated {
            node: NodeId(4),
            timestamp: datetime!(2024-06-04 08:00 UTC),
        });
        dispatcher.publish(&ContentEvent::FileAdded {
            node: NodeId(4),
            size_bytes: 512,
        });

        assert_eq!(coordinator.post_count(NodeId(1), StatScope::Recursive), 7);
        assert_eq!(
            coordinator.file_totals(NodeId(1), StatScope::Recursive).bytes,
            3584
        );

        dispatcher.publish(&ContentEvent::NodeReparented {
            node: NodeId(4),
            old_parent: Some(NodeId(2)),
            new_parent: Some(NodeId(1)),
        });
        assert_eq!(coordinator.post_count(NodeId(2), StatScope::Recursive), 2);
        assert_eq!(coordinator.post_count(NodeId(1), StatScope::Recursive), 7);
    }

    #[test]
    fn disabled_engine_answers_empty() {
        let config = StatsConfig {
            enable_activity: false,
            enable_post_counts: false,
            enable_file_stats: false,
        };
        assert!(!config.any_enabled());
        let coordinator = StatsCoordinator::new(config, reference_source());
        coordinator.initialize().expect("bootstrap");

        assert_eq!(
            coordinator.activity(NodeId(1), StatScope::Recursive, DateRange::UNBOUNDED),
            ActivitySummary::default()
        );
        assert_eq!(coordinator.post_count(NodeId(1), StatScope::Recursive), 0);
        assert_eq!(
            coordinator.file_totals(NodeId(1), StatScope::Recursive),
            FileTotals::default()
        );
    }
}
