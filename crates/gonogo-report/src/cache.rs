//! The rollup cache: keyed by the inputs that define each rollup,
//! invalidated write-through by Store change notifications.
//!
//! Invalidation is table-granular and conservative: any committed write to
//! a table a cached rollup reads from evicts the entry. Reads under
//! concurrent invalidation simply fall through to a fresh computation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::trace;

use gonogo_store::notify::{ChangeEvent, ChangeTable};
use gonogo_store::traits::Storage;

struct CacheEntry {
    value: Value,
    depends_on: Vec<ChangeTable>,
}

/// Bounded cache of computed rollups, keyed by a string encoding of the
/// rollup's inputs (e.g. `epic_rollup:EP-00005`). No TTLs: entries live
/// until a write invalidates them or capacity evicts them.
pub struct RollupCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    max_entries: usize,
}

impl RollupCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_entries: max_entries.max(1),
        }
    }

    /// Creates a cache already subscribed to the store's change feed.
    pub fn attached(max_entries: usize, store: &dyn Storage) -> Arc<Self> {
        let cache = Arc::new(Self::new(max_entries));
        let subscriber = Arc::clone(&cache);
        store.subscribe(Box::new(move |event| subscriber.invalidate(event)));
        cache
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let entries = self.entries.lock().ok()?;
        entries.get(key).map(|e| e.value.clone())
    }

    /// Stores a computed rollup with the tables it read from. When full,
    /// an arbitrary entry is evicted; the cache is an accelerator, not a
    /// source of truth.
    pub fn put(&self, key: impl Into<String>, depends_on: &[ChangeTable], value: Value) {
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        if entries.len() >= self.max_entries {
            if let Some(victim) = entries.keys().next().cloned() {
                entries.remove(&victim);
            }
        }
        entries.insert(
            key.into(),
            CacheEntry {
                value,
                depends_on: depends_on.to_vec(),
            },
        );
    }

    /// Evicts every entry depending on the changed table.
    pub fn invalidate(&self, event: &ChangeEvent) {
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        let before = entries.len();
        entries.retain(|_, e| !e.depends_on.contains(&event.table));
        let evicted = before - entries.len();
        if evicted > 0 {
            trace!(?event, evicted, "cache entries invalidated");
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn put_get_invalidate() {
        let cache = RollupCache::new(8);
        cache.put(
            "epic_rollup:EP-00001",
            &[ChangeTable::Epics, ChangeTable::Stories],
            json!({"completion": {"numerator": 3, "denominator": 8}}),
        );
        assert!(cache.get("epic_rollup:EP-00001").is_some());

        // A write to an unrelated table leaves the entry alone.
        cache.invalidate(&ChangeEvent::new(ChangeTable::Executions, "t"));
        assert!(cache.get("epic_rollup:EP-00001").is_some());

        // A story write evicts it.
        cache.invalidate(&ChangeEvent::new(ChangeTable::Stories, "US-00001"));
        assert!(cache.get("epic_rollup:EP-00001").is_none());
    }

    #[test]
    fn capacity_is_bounded() {
        let cache = RollupCache::new(2);
        cache.put("a", &[ChangeTable::Epics], json!(1));
        cache.put("b", &[ChangeTable::Epics], json!(2));
        cache.put("c", &[ChangeTable::Epics], json!(3));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn attached_cache_invalidates_on_store_writes() {
        use gonogo_core::epic::EpicBuilder;
        use gonogo_store::SqliteStore;

        let store = SqliteStore::open_in_memory().unwrap();
        let cache = RollupCache::attached(8, &store);
        cache.put("epics:list", &[ChangeTable::Epics], json!([]));
        assert_eq!(cache.len(), 1);

        store
            .create_epic(&EpicBuilder::new("EP-00001", "New epic").build(), "admin")
            .unwrap();
        assert!(cache.get("epics:list").is_none());
    }
}
