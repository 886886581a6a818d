//! The query engine facade: deadlines, the rollup cache, and the public
//! query surface consumed by renderers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use gonogo_config::EngineConfig;
use gonogo_core::enums::DependencyKind;
use gonogo_store::notify::ChangeTable;
use gonogo_store::traits::Storage;

use crate::Result;
use crate::cache::RollupCache;
use crate::matrix::{self, MatrixFilter};
use crate::viewmodel::{
    CriticalPath, DependencyGraphView, EpicRollup, MatrixView, PmView, PoView, QaView,
};
use crate::{dashboards, graph};

/// Read-only query surface over the Store.
///
/// Rollups are cached keyed by their inputs; the cache subscribes to the
/// Store's change feed, so every committed write that touches a rollup's
/// inputs evicts it before the next read.
pub struct QueryEngine<'a> {
    store: &'a dyn Storage,
    config: &'a EngineConfig,
    cache: Arc<RollupCache>,
}

impl<'a> QueryEngine<'a> {
    pub fn new(store: &'a dyn Storage, config: &'a EngineConfig) -> Self {
        let cache = RollupCache::attached(config.report.cache_max_entries, store);
        Self {
            store,
            config,
            cache,
        }
    }

    fn deadline(&self) -> Option<Instant> {
        Some(Instant::now() + Duration::from_millis(self.config.report.query_deadline_ms))
    }

    /// The requirements matrix, bounded by the per-query deadline.
    pub fn matrix(&self, filter: &MatrixFilter) -> Result<MatrixView> {
        matrix::matrix_rows(self.store, filter, self.deadline())
    }

    /// One Epic's rollup, cached.
    pub fn epic_rollup(&self, epic_id: &str) -> Result<EpicRollup> {
        let key = format!("epic_rollup:{epic_id}");
        if let Some(value) = self.cache.get(&key) {
            if let Ok(rollup) = serde_json::from_value(value) {
                return Ok(rollup);
            }
        }

        let rollup = matrix::epic_rollup(self.store, epic_id)?;
        if let Ok(value) = serde_json::to_value(&rollup) {
            self.cache.put(
                key,
                &[
                    ChangeTable::Epics,
                    ChangeTable::Stories,
                    ChangeTable::Defects,
                ],
                value,
            );
        }
        Ok(rollup)
    }

    /// The dependency graph with cycles, cached.
    pub fn dependency_graph(
        &self,
        kinds: Option<&[DependencyKind]>,
    ) -> Result<DependencyGraphView> {
        let key = format!(
            "graph:{}",
            kinds
                .map(|ks| {
                    ks.iter()
                        .map(|k| k.as_str())
                        .collect::<Vec<_>>()
                        .join("+")
                })
                .unwrap_or_else(|| "blocks".to_string())
        );
        if let Some(value) = self.cache.get(&key) {
            if let Ok(view) = serde_json::from_value(value) {
                return Ok(view);
            }
        }

        let view = graph::dependency_graph(self.store, kinds)?;
        if let Ok(value) = serde_json::to_value(&view) {
            self.cache.put(
                key,
                &[ChangeTable::Epics, ChangeTable::Dependencies],
                value,
            );
        }
        Ok(view)
    }

    /// The longest weighted `blocks` chain to a target Epic, cached.
    pub fn critical_path_to(&self, target: &str) -> Result<CriticalPath> {
        let key = format!("critical_path:{target}");
        if let Some(value) = self.cache.get(&key) {
            if let Ok(path) = serde_json::from_value(value) {
                return Ok(path);
            }
        }

        let path = graph::critical_path_to(self.store, target)?;
        if let Ok(value) = serde_json::to_value(&path) {
            self.cache.put(
                key,
                &[
                    ChangeTable::Epics,
                    ChangeTable::Stories,
                    ChangeTable::Dependencies,
                ],
                value,
            );
        }
        Ok(path)
    }

    /// The `blocks*` closure for "what does this Epic block?" queries.
    pub fn reachable_from(&self, epic_id: &str) -> Result<Vec<String>> {
        graph::reachable_from(self.store, epic_id)
    }

    /// PM dashboard. Wall-clock dependent, never cached.
    pub fn pm_view(&self) -> Result<PmView> {
        dashboards::pm_view(self.store, self.config, self.deadline())
    }

    /// PO dashboard. Wall-clock dependent, never cached.
    pub fn po_view(&self) -> Result<PoView> {
        dashboards::po_view(self.store, self.config, self.deadline())
    }

    /// QA dashboard. Wall-clock dependent, never cached.
    pub fn qa_view(&self) -> Result<QaView> {
        dashboards::qa_view(self.store, self.config, self.deadline())
    }

    /// Cache handle, exposed for instrumentation.
    pub fn cache(&self) -> &RollupCache {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    use gonogo_core::enums::StoryStatus;
    use gonogo_core::epic::EpicBuilder;
    use gonogo_core::story::UserStory;
    use gonogo_store::SqliteStore;
    use gonogo_store::traits::{StoryUpdates, Transaction};

    fn seeded_store() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .run_in_transaction(&|tx: &dyn Transaction| {
                tx.create_epic(&EpicBuilder::new("EP-00001", "Checkout").build(), "admin")?;
                let mut story = UserStory::new("US-00001", "Cart", "US-00001");
                story.epic_id = Some("EP-00001".into());
                story.story_points = 4;
                tx.create_story(&story, "sync")
            })
            .unwrap();
        store
    }

    #[test]
    fn rollup_is_cached_between_reads() {
        let store = seeded_store();
        let config = EngineConfig::default();
        let engine = QueryEngine::new(&store, &config);

        let first = engine.epic_rollup("EP-00001").unwrap();
        assert_eq!(engine.cache().len(), 1);
        let second = engine.epic_rollup("EP-00001").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn write_invalidates_and_read_observes_post_write_state() {
        let store = seeded_store();
        let config = EngineConfig::default();
        let engine = QueryEngine::new(&store, &config);

        let before = engine.epic_rollup("EP-00001").unwrap();
        assert_eq!(before.completion.numerator, 0);

        store
            .update_story(
                "US-00001",
                &StoryUpdates {
                    status: Some(StoryStatus::Done),
                    ..Default::default()
                },
                "sync",
            )
            .unwrap();

        let after = engine.epic_rollup("EP-00001").unwrap();
        assert_eq!(after.completion.numerator, 4);
        assert_eq!(after.completion.denominator, 4);
    }

    #[test]
    fn graph_cache_invalidated_by_dependency_writes() {
        let store = seeded_store();
        let config = EngineConfig::default();
        let engine = QueryEngine::new(&store, &config);

        let before = engine.dependency_graph(None).unwrap();
        assert!(before.edges.is_empty());

        store
            .create_epic(&EpicBuilder::new("EP-00002", "Search").build(), "admin")
            .unwrap();
        store
            .add_dependency(
                &gonogo_core::dependency::EpicDependency::blocks("EP-00001", "EP-00002"),
                "admin",
            )
            .unwrap();

        let after = engine.dependency_graph(None).unwrap();
        assert_eq!(after.edges.len(), 1);
        assert!(after.cycles.is_empty());
    }

    #[test]
    fn critical_path_via_engine() {
        let store = seeded_store();
        let config = EngineConfig::default();
        let engine = QueryEngine::new(&store, &config);

        let cp = engine.critical_path_to("EP-00001").unwrap();
        assert_eq!(cp.path, vec!["EP-00001"]);
        assert_eq!(cp.total_points, 4);
    }
}
