//! Export/import: the full Store as a stream of tagged JSONL records.
//!
//! `export_records` then `import_records` into an empty Store reconstructs
//! an equivalent Store: entity rows, association sets, dependency edges,
//! execution history, ID counters, and the sync cursor all round-trip.

use rusqlite::params;

use gonogo_core::jsonl::ExportRecord;

use crate::error::Result;
use crate::sqlite::store::SqliteStore;
use crate::sqlite::{
    capabilities, defects, dependencies, epics, executions, format_datetime, meta, stories, tests,
};

impl SqliteStore {
    /// Collects every row as an export record, entities before the edges
    /// and history that reference them.
    pub fn export_records(&self) -> Result<Vec<ExportRecord>> {
        let conn = self.lock_conn()?;
        let mut records = Vec::new();

        for cap in capabilities::list_capabilities_on_conn(&conn)? {
            records.push(ExportRecord::Capability(cap));
        }
        for epic in epics::list_epics_on_conn(&conn)? {
            records.push(ExportRecord::Epic(epic));
        }
        for story in stories::list_stories_on_conn(&conn)? {
            records.push(ExportRecord::UserStory(story));
        }
        for defect in defects::list_defects_on_conn(&conn)? {
            records.push(ExportRecord::Defect(defect));
        }
        for test in tests::list_tests_on_conn(&conn)? {
            records.push(ExportRecord::Test(test));
        }
        for dep in dependencies::list_dependencies_on_conn(&conn, None)? {
            records.push(ExportRecord::EpicDependency(dep));
        }

        {
            let mut stmt = conn.prepare(
                "SELECT test_id, status, duration_ms, recorded_at, failure_category, failure_digest
                 FROM test_executions ORDER BY test_id, recorded_at",
            )?;
            let rows = stmt.query_map([], executions::scan_execution)?;
            for row in rows {
                records.push(ExportRecord::Execution(row?));
            }
        }

        // ID counters and sync cursor.
        {
            let mut stmt = conn.prepare(
                "SELECT key, value FROM config WHERE key LIKE 'next_id:%' ORDER BY key",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            for row in rows {
                let (key, value) = row?;
                records.push(ExportRecord::Meta { key, value });
            }
        }
        {
            let mut stmt = conn.prepare(
                "SELECT key, value FROM metadata WHERE key NOT LIKE 'migration:%' ORDER BY key",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            for row in rows {
                let (key, value) = row?;
                records.push(ExportRecord::Meta { key, value });
            }
        }

        Ok(records)
    }

    /// Imports records into this Store inside one transaction. Records are
    /// applied entities-first regardless of input order, so arbitrary
    /// orderings of a valid export import cleanly.
    pub fn import_records(&self, records: Vec<ExportRecord>, actor: &str) -> Result<usize> {
        let mut caps = Vec::new();
        let mut epic_rows = Vec::new();
        let mut story_rows = Vec::new();
        let mut defect_rows = Vec::new();
        let mut test_rows = Vec::new();
        let mut dep_rows = Vec::new();
        let mut exec_rows = Vec::new();
        let mut meta_rows = Vec::new();

        for record in records {
            match record {
                ExportRecord::Capability(c) => caps.push(c),
                ExportRecord::Epic(e) => epic_rows.push(e),
                ExportRecord::UserStory(s) => story_rows.push(s),
                ExportRecord::Defect(d) => defect_rows.push(d),
                ExportRecord::Test(t) => test_rows.push(t),
                ExportRecord::EpicDependency(d) => dep_rows.push(d),
                ExportRecord::Execution(e) => exec_rows.push(e),
                ExportRecord::Meta { key, value } => meta_rows.push((key, value)),
            }
        }

        let total = caps.len()
            + epic_rows.len()
            + story_rows.len()
            + defect_rows.len()
            + test_rows.len()
            + dep_rows.len()
            + exec_rows.len();

        let events;
        {
            let conn = self.lock_conn()?;
            let tx = conn
                .unchecked_transaction()
                .map_err(|e| crate::StoreError::Transaction(format!("failed to begin: {e}")))?;

            for cap in &caps {
                capabilities::insert_capability_on_conn(&tx, cap, actor)?;
            }
            for epic in &epic_rows {
                epics::insert_epic_on_conn(&tx, epic, actor)?;
            }
            for story in &story_rows {
                stories::insert_story_on_conn(&tx, story, actor)?;
            }
            for defect in &defect_rows {
                defects::insert_defect_on_conn(&tx, defect, actor)?;
            }
            for test in &test_rows {
                tests::insert_test_on_conn(&tx, test)?;
            }
            for dep in &dep_rows {
                dependencies::add_dependency_on_conn(&tx, dep, actor)?;
            }
            for exec in &exec_rows {
                // History rows are imported verbatim; the Test rows already
                // carry their last-execution fields.
                tx.execute(
                    "INSERT INTO test_executions
                     (test_id, status, duration_ms, recorded_at, failure_category, failure_digest)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        exec.test_id,
                        exec.status.as_str(),
                        exec.duration_ms,
                        format_datetime(&exec.recorded_at),
                        exec.failure_category.map(|c| c.as_str()),
                        exec.failure_digest,
                    ],
                )?;
            }
            for (key, value) in &meta_rows {
                if key.starts_with("next_id:") {
                    tx.execute(
                        "INSERT OR REPLACE INTO config (key, value) VALUES (?1, ?2)",
                        params![key, value],
                    )?;
                } else {
                    meta::set_meta_on_conn(&tx, key, value)?;
                }
            }

            tx.commit()
                .map_err(|e| crate::StoreError::Transaction(format!("failed to commit: {e}")))?;

            events = vec![crate::notify::ChangeEvent::new(
                crate::notify::ChangeTable::Meta,
                "import",
            )];
        }
        self.notifier.publish(&events);

        Ok(total)
    }
}

#[cfg(test)]
mod export_tests {
    use gonogo_core::dependency::EpicDependency;
    use gonogo_core::epic::EpicBuilder;
    use gonogo_core::story::UserStory;
    use gonogo_core::test::TestBuilder;

    use crate::sqlite::store::SqliteStore;
    use crate::traits::{Storage, Transaction};

    fn seeded_store() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .run_in_transaction(&|tx: &dyn Transaction| {
                tx.create_epic(&EpicBuilder::new("EP-00001", "Alpha").build(), "admin")?;
                tx.create_epic(&EpicBuilder::new("EP-00002", "Beta").build(), "admin")?;

                let mut story = UserStory::new("US-00001", "Story one", "US-00001");
                story.epic_id = Some("EP-00001".into());
                story.story_points = 5;
                tx.create_story(&story, "sync")?;

                let test = TestBuilder::new("tests/test_a.py", "test_a")
                    .story_ids(vec!["US-00001".into()])
                    .build();
                tx.create_test(&test)?;

                tx.add_dependency(&EpicDependency::blocks("EP-00001", "EP-00002"), "admin")?;
                tx.set_meta("sync:since_token", "cursor-7")?;
                Ok(())
            })
            .unwrap();
        store
    }

    #[test]
    fn export_import_reconstructs_equivalent_store() {
        let source = seeded_store();
        let records = source.export_records().unwrap();

        let target = SqliteStore::open_in_memory().unwrap();
        let imported = target.import_records(records, "import").unwrap();
        assert!(imported >= 5);

        // Entity-by-entity equivalence.
        assert_eq!(
            source.list_epics().unwrap().len(),
            target.list_epics().unwrap().len()
        );
        let src_story = Storage::get_story(&source, "US-00001").unwrap();
        let dst_story = Storage::get_story(&target, "US-00001").unwrap();
        assert_eq!(src_story, dst_story);

        let src_test = source.list_tests().unwrap();
        let dst_test = target.list_tests().unwrap();
        assert_eq!(src_test, dst_test);

        assert_eq!(
            source.list_dependencies(None).unwrap(),
            target.list_dependencies(None).unwrap()
        );

        // Counters and cursor survive.
        assert_eq!(
            target.get_meta("sync:since_token").unwrap().as_deref(),
            Some("cursor-7")
        );
    }

    #[test]
    fn double_roundtrip_is_stable() {
        let source = seeded_store();
        let first = source.export_records().unwrap();

        let target = SqliteStore::open_in_memory().unwrap();
        target.import_records(first.clone(), "import").unwrap();
        let second = target.export_records().unwrap();

        assert_eq!(first, second);
    }
}
