//! Transaction wrapper for [`SqliteStore`] and the [`Storage`] trait
//! implementation.
//!
//! [`StoreTx`] wraps a connection that already has an active transaction
//! and delegates to the same connection-level helpers used by the store's
//! direct methods. Change events are buffered on the wrapper and published
//! only after the transaction commits.

use std::cell::RefCell;

use rusqlite::Connection;

use gonogo_core::defect::Defect;
use gonogo_core::dependency::EpicDependency;
use gonogo_core::entity::Capability;
use gonogo_core::enums::{DependencyKind, FailureCategory};
use gonogo_core::epic::Epic;
use gonogo_core::id::EntityKind;
use gonogo_core::story::UserStory;
use gonogo_core::test::{ExecutionRecord, Test};

use crate::error::{Result, StoreError};
use crate::notify::{ChangeEvent, ChangeTable, Subscriber};
use crate::sqlite::store::SqliteStore;
use crate::sqlite::{
    capabilities, defects, dependencies, epics, executions, list_events_on_conn, meta, stories,
    tests,
};
use crate::traits::{
    AuditEvent, DefectUpdates, EpicUpdates, Storage, StoryUpdates, TestFlags, Transaction,
};

/// A connection-with-active-transaction wrapper implementing [`Transaction`].
pub(crate) struct StoreTx<'a> {
    pub(crate) conn: &'a Connection,
    events: RefCell<Vec<ChangeEvent>>,
}

impl<'a> StoreTx<'a> {
    pub(crate) fn new(conn: &'a Connection) -> Self {
        Self {
            conn,
            events: RefCell::new(Vec::new()),
        }
    }

    fn push_event(&self, table: ChangeTable, id: &str) {
        self.events
            .borrow_mut()
            .push(ChangeEvent::new(table, id));
    }

    pub(crate) fn take_events(&self) -> Vec<ChangeEvent> {
        self.events.borrow_mut().drain(..).collect()
    }
}

impl Transaction for StoreTx<'_> {
    fn allocate_id(&self, kind: EntityKind) -> Result<String> {
        meta::allocate_id_on_conn(self.conn, kind)
    }

    fn get_meta(&self, key: &str) -> Result<Option<String>> {
        meta::get_meta_on_conn(self.conn, key)
    }

    fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        meta::set_meta_on_conn(self.conn, key, value)?;
        self.push_event(ChangeTable::Meta, key);
        Ok(())
    }

    fn create_capability(&self, cap: &Capability, actor: &str) -> Result<()> {
        capabilities::insert_capability_on_conn(self.conn, cap, actor)?;
        self.push_event(ChangeTable::Capabilities, &cap.id);
        Ok(())
    }

    fn capability_exists(&self, id: &str) -> Result<bool> {
        capabilities::capability_exists_on_conn(self.conn, id)
    }

    fn create_epic(&self, epic: &Epic, actor: &str) -> Result<()> {
        epics::insert_epic_on_conn(self.conn, epic, actor)?;
        self.push_event(ChangeTable::Epics, &epic.id);

        // A newly ingested Epic re-resolves any orphan stories waiting on it.
        let resolved = stories::reresolve_orphans_on_conn(self.conn, &epic.id, actor)?;
        if resolved > 0 {
            self.push_event(ChangeTable::Stories, &epic.id);
            self.push_event(ChangeTable::Tests, &epic.id);
        }
        Ok(())
    }

    fn get_epic(&self, id: &str) -> Result<Epic> {
        epics::get_epic_on_conn(self.conn, id)
    }

    fn epic_exists(&self, id: &str) -> Result<bool> {
        epics::epic_exists_on_conn(self.conn, id)
    }

    fn update_epic(&self, id: &str, updates: &EpicUpdates, actor: &str) -> Result<()> {
        epics::update_epic_on_conn(self.conn, id, updates, actor)?;
        self.push_event(ChangeTable::Epics, id);
        Ok(())
    }

    fn create_story(&self, story: &UserStory, actor: &str) -> Result<()> {
        stories::insert_story_on_conn(self.conn, story, actor)?;
        self.push_event(ChangeTable::Stories, &story.id);
        self.push_event(ChangeTable::Tests, &story.id);
        Ok(())
    }

    fn get_story(&self, id: &str) -> Result<UserStory> {
        stories::get_story_on_conn(self.conn, id)
    }

    fn story_exists(&self, id: &str) -> Result<bool> {
        stories::story_exists_on_conn(self.conn, id)
    }

    fn find_story_by_tracker_ref(&self, tracker_ref: &str) -> Result<Option<UserStory>> {
        stories::find_story_by_tracker_ref_on_conn(self.conn, tracker_ref)
    }

    fn update_story(&self, id: &str, updates: &StoryUpdates, actor: &str) -> Result<()> {
        stories::update_story_on_conn(self.conn, id, updates, actor)?;
        self.push_event(ChangeTable::Stories, id);
        Ok(())
    }

    fn reresolve_orphans(&self, epic_id: &str, actor: &str) -> Result<usize> {
        let resolved = stories::reresolve_orphans_on_conn(self.conn, epic_id, actor)?;
        if resolved > 0 {
            self.push_event(ChangeTable::Stories, epic_id);
            self.push_event(ChangeTable::Tests, epic_id);
        }
        Ok(resolved)
    }

    fn create_defect(&self, defect: &Defect, actor: &str) -> Result<()> {
        defects::insert_defect_on_conn(self.conn, defect, actor)?;
        self.push_event(ChangeTable::Defects, &defect.id);
        Ok(())
    }

    fn get_defect(&self, id: &str) -> Result<Defect> {
        defects::get_defect_on_conn(self.conn, id)
    }

    fn find_defect_by_tracker_ref(&self, tracker_ref: &str) -> Result<Option<Defect>> {
        defects::find_defect_by_tracker_ref_on_conn(self.conn, tracker_ref)
    }

    fn find_open_auto_defect(
        &self,
        test_id: &str,
        category: FailureCategory,
    ) -> Result<Option<Defect>> {
        defects::find_open_auto_defect_on_conn(self.conn, test_id, category)
    }

    fn update_defect(&self, id: &str, updates: &DefectUpdates, actor: &str) -> Result<()> {
        defects::update_defect_on_conn(self.conn, id, updates, actor)?;
        self.push_event(ChangeTable::Defects, id);
        Ok(())
    }

    fn create_test(&self, test: &Test) -> Result<()> {
        tests::insert_test_on_conn(self.conn, test)?;
        self.push_event(ChangeTable::Tests, &test.id);
        Ok(())
    }

    fn find_test(&self, id: &str) -> Result<Option<Test>> {
        tests::find_test_on_conn(self.conn, id)
    }

    fn list_tests(&self) -> Result<Vec<Test>> {
        tests::list_tests_on_conn(self.conn)
    }

    fn merge_test(&self, test: &Test) -> Result<()> {
        tests::merge_test_on_conn(self.conn, test)?;
        self.push_event(ChangeTable::Tests, &test.id);
        Ok(())
    }

    fn set_test_flags(&self, id: &str, flags: &TestFlags) -> Result<()> {
        tests::set_test_flags_on_conn(self.conn, id, flags)?;
        self.push_event(ChangeTable::Tests, id);
        Ok(())
    }

    fn record_execution(&self, exec: &ExecutionRecord) -> Result<bool> {
        let applied = executions::record_execution_on_conn(self.conn, exec)?;
        if applied {
            self.push_event(ChangeTable::Executions, &exec.test_id);
            self.push_event(ChangeTable::Tests, &exec.test_id);
        }
        Ok(applied)
    }

    fn list_recent_executions(&self, test_id: &str, limit: u32) -> Result<Vec<ExecutionRecord>> {
        executions::list_recent_executions_on_conn(self.conn, test_id, limit)
    }

    fn prune_executions(&self, retain: u32) -> Result<u64> {
        let pruned = executions::prune_executions_on_conn(self.conn, retain)?;
        if pruned > 0 {
            self.push_event(ChangeTable::Executions, "*");
        }
        Ok(pruned)
    }

    fn add_dependency(&self, dep: &EpicDependency, actor: &str) -> Result<()> {
        dependencies::add_dependency_on_conn(self.conn, dep, actor)?;
        self.push_event(ChangeTable::Dependencies, &dep.from_epic);
        Ok(())
    }

    fn remove_dependency(
        &self,
        from: &str,
        to: &str,
        kind: DependencyKind,
        actor: &str,
    ) -> Result<()> {
        dependencies::remove_dependency_on_conn(self.conn, from, to, kind, actor)?;
        self.push_event(ChangeTable::Dependencies, from);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Storage implementation
// ---------------------------------------------------------------------------

impl Storage for SqliteStore {
    fn run_in_transaction(&self, f: &dyn Fn(&dyn Transaction) -> Result<()>) -> Result<()> {
        let events;
        {
            let conn = self.lock_conn()?;
            let tx = conn
                .unchecked_transaction()
                .map_err(|e| StoreError::Transaction(format!("failed to begin: {e}")))?;

            let store_tx = StoreTx::new(&tx);
            match f(&store_tx) {
                Ok(()) => {
                    events = store_tx.take_events();
                    tx.commit()
                        .map_err(|e| StoreError::Transaction(format!("failed to commit: {e}")))?;
                }
                Err(e) => {
                    // Transaction is rolled back on drop.
                    return Err(e);
                }
            }
        }
        // Publish after the connection lock is released: subscribers may
        // read back through the store.
        self.notifier.publish(&events);
        Ok(())
    }

    fn subscribe(&self, sub: Subscriber) {
        self.notifier.subscribe(sub);
    }

    // -- Reads ---------------------------------------------------------------

    fn get_capability(&self, id: &str) -> Result<Capability> {
        let conn = self.lock_conn()?;
        capabilities::get_capability_on_conn(&conn, id)
    }

    fn list_capabilities(&self) -> Result<Vec<Capability>> {
        let conn = self.lock_conn()?;
        capabilities::list_capabilities_on_conn(&conn)
    }

    fn get_epic(&self, id: &str) -> Result<Epic> {
        let conn = self.lock_conn()?;
        epics::get_epic_on_conn(&conn, id)
    }

    fn list_epics(&self) -> Result<Vec<Epic>> {
        let conn = self.lock_conn()?;
        epics::list_epics_on_conn(&conn)
    }

    fn get_story(&self, id: &str) -> Result<UserStory> {
        let conn = self.lock_conn()?;
        stories::get_story_on_conn(&conn, id)
    }

    fn list_stories(&self) -> Result<Vec<UserStory>> {
        let conn = self.lock_conn()?;
        stories::list_stories_on_conn(&conn)
    }

    fn find_story_by_tracker_ref(&self, tracker_ref: &str) -> Result<Option<UserStory>> {
        let conn = self.lock_conn()?;
        stories::find_story_by_tracker_ref_on_conn(&conn, tracker_ref)
    }

    fn get_defect(&self, id: &str) -> Result<Defect> {
        let conn = self.lock_conn()?;
        defects::get_defect_on_conn(&conn, id)
    }

    fn list_defects(&self) -> Result<Vec<Defect>> {
        let conn = self.lock_conn()?;
        defects::list_defects_on_conn(&conn)
    }

    fn find_test(&self, id: &str) -> Result<Option<Test>> {
        let conn = self.lock_conn()?;
        tests::find_test_on_conn(&conn, id)
    }

    fn list_tests(&self) -> Result<Vec<Test>> {
        let conn = self.lock_conn()?;
        tests::list_tests_on_conn(&conn)
    }

    fn list_dependencies(&self, kinds: Option<&[DependencyKind]>) -> Result<Vec<EpicDependency>> {
        let conn = self.lock_conn()?;
        dependencies::list_dependencies_on_conn(&conn, kinds)
    }

    fn list_recent_executions(&self, test_id: &str, limit: u32) -> Result<Vec<ExecutionRecord>> {
        let conn = self.lock_conn()?;
        executions::list_recent_executions_on_conn(&conn, test_id, limit)
    }

    fn list_events(&self, entity_id: &str) -> Result<Vec<AuditEvent>> {
        let conn = self.lock_conn()?;
        list_events_on_conn(&conn, entity_id)
    }

    fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let conn = self.lock_conn()?;
        meta::get_meta_on_conn(&conn, key)
    }

    // -- Single-shot writes --------------------------------------------------

    fn create_capability(&self, cap: &Capability, actor: &str) -> Result<()> {
        self.run_in_transaction(&|tx| tx.create_capability(cap, actor))
    }

    fn create_epic(&self, epic: &Epic, actor: &str) -> Result<()> {
        self.run_in_transaction(&|tx| tx.create_epic(epic, actor))
    }

    fn update_epic(&self, id: &str, updates: &EpicUpdates, actor: &str) -> Result<()> {
        self.run_in_transaction(&|tx| tx.update_epic(id, updates, actor))
    }

    fn create_story(&self, story: &UserStory, actor: &str) -> Result<()> {
        self.run_in_transaction(&|tx| tx.create_story(story, actor))
    }

    fn update_story(&self, id: &str, updates: &StoryUpdates, actor: &str) -> Result<()> {
        self.run_in_transaction(&|tx| tx.update_story(id, updates, actor))
    }

    fn create_defect(&self, defect: &Defect, actor: &str) -> Result<()> {
        self.run_in_transaction(&|tx| tx.create_defect(defect, actor))
    }

    fn update_defect(&self, id: &str, updates: &DefectUpdates, actor: &str) -> Result<()> {
        self.run_in_transaction(&|tx| tx.update_defect(id, updates, actor))
    }

    fn add_dependency(&self, dep: &EpicDependency, actor: &str) -> Result<()> {
        self.run_in_transaction(&|tx| tx.add_dependency(dep, actor))
    }

    fn remove_dependency(
        &self,
        from: &str,
        to: &str,
        kind: DependencyKind,
        actor: &str,
    ) -> Result<()> {
        self.run_in_transaction(&|tx| tx.remove_dependency(from, to, kind, actor))
    }

    fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        self.run_in_transaction(&|tx| tx.set_meta(key, value))
    }
}

#[cfg(test)]
mod tx_tests {
    use super::*;
    use gonogo_core::epic::EpicBuilder;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    #[test]
    fn transaction_commit() {
        let store = test_store();

        store
            .run_in_transaction(&|tx| {
                let epic = EpicBuilder::new("EP-00001", "In transaction").build();
                tx.create_epic(&epic, "admin")?;
                Ok(())
            })
            .unwrap();

        let epic = Storage::get_epic(&store, "EP-00001").unwrap();
        assert_eq!(epic.title, "In transaction");
    }

    #[test]
    fn transaction_rollback_on_error() {
        let store = test_store();

        let result = store.run_in_transaction(&|tx| {
            let epic = EpicBuilder::new("EP-00001", "Should roll back").build();
            tx.create_epic(&epic, "admin")?;
            Err(StoreError::Internal("forced".into()))
        });
        assert!(result.is_err());

        let err = Storage::get_epic(&store, "EP-00001").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn events_published_after_commit_only() {
        let store = test_store();
        let count = Arc::new(AtomicUsize::new(0));
        {
            let count = Arc::clone(&count);
            store.subscribe(Box::new(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            }));
        }

        // Failed transaction: nothing published.
        let _ = store.run_in_transaction(&|tx| {
            let epic = EpicBuilder::new("EP-00001", "Rolled back").build();
            tx.create_epic(&epic, "admin")?;
            Err(StoreError::Internal("forced".into()))
        });
        assert_eq!(count.load(Ordering::SeqCst), 0);

        // Committed transaction publishes.
        store
            .run_in_transaction(&|tx| {
                let epic = EpicBuilder::new("EP-00001", "Committed").build();
                tx.create_epic(&epic, "admin")
            })
            .unwrap();
        assert!(count.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn id_allocation_inside_transaction() {
        let store = test_store();
        store
            .run_in_transaction(&|tx| {
                let id = tx.allocate_id(EntityKind::Defect)?;
                assert_eq!(id, "DEF-00001");
                let id = tx.allocate_id(EntityKind::Defect)?;
                assert_eq!(id, "DEF-00002");
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn epic_creation_reresolves_orphans() {
        let store = test_store();

        store
            .run_in_transaction(&|tx| {
                let mut story =
                    gonogo_core::story::UserStory::new("US-00100", "Orphan", "US-00100");
                story.orphan_parent = Some("EP-00099".into());
                tx.create_story(&story, "sync")
            })
            .unwrap();

        store
            .run_in_transaction(&|tx| {
                let epic = EpicBuilder::new("EP-00099", "Late epic").build();
                tx.create_epic(&epic, "admin")
            })
            .unwrap();

        let story = Storage::get_story(&store, "US-00100").unwrap();
        assert!(!story.is_orphan());
        assert_eq!(story.epic_id.as_deref(), Some("EP-00099"));
    }
}
