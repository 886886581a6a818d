//! Test row CRUD operations: upsert-with-merge for the scanner, minimal
//! creation for the collector, and association-set loading.
//!
//! Association sets (stories, epics, defects, component tags) live in join
//! tables and follow union semantics: the scanner never subtracts.

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};

use gonogo_core::enums::{
    EventType, ExecutionStatus, FailureCategory, TestPriority, TestType,
};
use gonogo_core::test::{LastExecution, Test};
use gonogo_core::validation::validate_test;

use crate::error::{Result, StoreError};
use crate::sqlite::{emit_event, format_datetime, parse_datetime};
use crate::traits::TestFlags;

pub(crate) const TEST_COLUMNS: &str = "\
    id, file_path, symbol, test_type, priority, bdd_scenario, \
    orphaned, potentially_removed, uncovered, \
    last_status, last_duration_ms, last_recorded_at, \
    last_failure_category, last_failure_digest, \
    created_at, updated_at, summarized_runs, summarized_passed";

/// Deserialises a row into a [`Test`] without association sets; callers
/// follow up with [`load_test_assocs`].
pub(crate) fn scan_test(row: &Row<'_>) -> rusqlite::Result<Test> {
    let test_type_str: String = row.get("test_type")?;
    let priority_str: String = row.get("priority")?;

    let last_status: Option<String> = row.get("last_status")?;
    let last_execution = match last_status {
        Some(ref status_str) => {
            let status = ExecutionStatus::parse(status_str).unwrap_or_default();
            let recorded_at_str: Option<String> = row.get("last_recorded_at")?;
            recorded_at_str.map(|ts| LastExecution {
                status,
                duration_ms: row
                    .get::<_, Option<i64>>("last_duration_ms")
                    .unwrap_or(None)
                    .unwrap_or(0),
                recorded_at: parse_datetime(&ts),
                failure_category: row
                    .get::<_, Option<String>>("last_failure_category")
                    .unwrap_or(None)
                    .as_deref()
                    .and_then(FailureCategory::parse),
                failure_digest: row
                    .get::<_, Option<String>>("last_failure_digest")
                    .unwrap_or(None),
            })
        }
        None => None,
    };

    Ok(Test {
        id: row.get("id")?,
        file_path: row.get("file_path")?,
        symbol: row.get("symbol")?,
        test_type: TestType::parse(&test_type_str).unwrap_or_default(),
        priority: TestPriority::parse(&priority_str).unwrap_or_default(),
        component_tags: Vec::new(),
        story_ids: Vec::new(),
        epic_ids: Vec::new(),
        defect_ids: Vec::new(),
        bdd_scenario: row.get("bdd_scenario")?,
        orphaned: row.get::<_, i32>("orphaned")? != 0,
        potentially_removed: row.get::<_, i32>("potentially_removed")? != 0,
        uncovered: row.get::<_, i32>("uncovered")? != 0,
        last_execution,
        created_at: parse_datetime(&row.get::<_, String>("created_at")?),
        updated_at: parse_datetime(&row.get::<_, String>("updated_at")?),
        summarized_runs: row.get("summarized_runs")?,
        summarized_passed: row.get("summarized_passed")?,
    })
}

/// Loads the four association sets onto a scanned test.
pub(crate) fn load_test_assocs(conn: &Connection, test: &mut Test) -> Result<()> {
    test.story_ids = load_assoc(conn, "test_stories", "story_id", &test.id)?;
    test.epic_ids = load_assoc(conn, "test_epics", "epic_id", &test.id)?;
    test.defect_ids = load_assoc(conn, "test_defects", "defect_id", &test.id)?;
    test.component_tags = load_assoc(conn, "test_components", "tag", &test.id)?;
    Ok(())
}

fn load_assoc(
    conn: &Connection,
    table: &str,
    column: &str,
    test_id: &str,
) -> Result<Vec<String>> {
    let sql = format!("SELECT {column} FROM {table} WHERE test_id = ?1 ORDER BY {column}");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![test_id], |row| row.get::<_, String>(0))?;
    let mut values = Vec::new();
    for row in rows {
        values.push(row?);
    }
    Ok(values)
}

fn insert_assocs(conn: &Connection, test: &Test) -> Result<()> {
    for story in &test.story_ids {
        conn.execute(
            "INSERT OR IGNORE INTO test_stories (test_id, story_id) VALUES (?1, ?2)",
            params![test.id, story],
        )?;
    }
    for epic in &test.epic_ids {
        conn.execute(
            "INSERT OR IGNORE INTO test_epics (test_id, epic_id) VALUES (?1, ?2)",
            params![test.id, epic],
        )?;
    }
    for defect in &test.defect_ids {
        conn.execute(
            "INSERT OR IGNORE INTO test_defects (test_id, defect_id) VALUES (?1, ?2)",
            params![test.id, defect],
        )?;
    }
    for tag in &test.component_tags {
        conn.execute(
            "INSERT OR IGNORE INTO test_components (test_id, tag) VALUES (?1, ?2)",
            params![test.id, tag],
        )?;
    }
    Ok(())
}

pub(crate) fn insert_test_on_conn(conn: &Connection, test: &Test) -> Result<()> {
    validate_test(test)?;

    let last = test.last_execution.as_ref();
    conn.execute(
        &format!(
            "INSERT INTO tests ({TEST_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)"
        ),
        params![
            test.id,
            test.file_path,
            test.symbol,
            test.test_type.as_str(),
            test.priority.as_str(),
            test.bdd_scenario,
            test.orphaned as i32,
            test.potentially_removed as i32,
            test.uncovered as i32,
            last.map(|l| l.status.as_str()),
            last.map(|l| l.duration_ms),
            last.map(|l| format_datetime(&l.recorded_at)),
            last.and_then(|l| l.failure_category.map(|c| c.as_str())),
            last.and_then(|l| l.failure_digest.clone()),
            format_datetime(&test.created_at),
            format_datetime(&test.updated_at),
            test.summarized_runs,
            test.summarized_passed,
        ],
    )?;

    insert_assocs(conn, test)?;
    Ok(())
}

pub(crate) fn find_test_on_conn(conn: &Connection, id: &str) -> Result<Option<Test>> {
    let sql = format!("SELECT {TEST_COLUMNS} FROM tests WHERE id = ?1");
    let test = conn.query_row(&sql, params![id], scan_test).optional()?;
    match test {
        Some(mut t) => {
            load_test_assocs(conn, &mut t)?;
            Ok(Some(t))
        }
        None => Ok(None),
    }
}

pub(crate) fn list_tests_on_conn(conn: &Connection) -> Result<Vec<Test>> {
    let sql = format!("SELECT {TEST_COLUMNS} FROM tests ORDER BY id");
    let mut tests = {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], scan_test)?;
        let mut tests = Vec::new();
        for row in rows {
            tests.push(row?);
        }
        tests
    };
    for test in &mut tests {
        load_test_assocs(conn, test)?;
    }
    Ok(tests)
}

/// Merges a freshly scanned test into its existing row: annotation
/// metadata is refreshed, association sets are unioned, and scanner flags
/// (orphaned, potentially_removed) are cleared. Execution fields are
/// untouched -- those belong to the Collector.
pub(crate) fn merge_test_on_conn(conn: &Connection, test: &Test) -> Result<()> {
    validate_test(test)?;

    let affected = conn.execute(
        "UPDATE tests SET
            file_path = ?2, symbol = ?3, test_type = ?4, priority = ?5,
            bdd_scenario = ?6, orphaned = 0, potentially_removed = 0,
            uncovered = ?7, updated_at = ?8
         WHERE id = ?1",
        params![
            test.id,
            test.file_path,
            test.symbol,
            test.test_type.as_str(),
            test.priority.as_str(),
            test.bdd_scenario,
            test.uncovered as i32,
            format_datetime(&Utc::now()),
        ],
    )?;
    if affected == 0 {
        return Err(StoreError::not_found("test", &test.id));
    }

    insert_assocs(conn, test)?;
    Ok(())
}

pub(crate) fn set_test_flags_on_conn(
    conn: &Connection,
    id: &str,
    flags: &TestFlags,
) -> Result<()> {
    let current = find_test_on_conn(conn, id)?
        .ok_or_else(|| StoreError::not_found("test", id))?;

    let orphaned = flags.orphaned.unwrap_or(current.orphaned);
    let potentially_removed = flags
        .potentially_removed
        .unwrap_or(current.potentially_removed);
    let uncovered = flags.uncovered.unwrap_or(current.uncovered);

    conn.execute(
        "UPDATE tests SET orphaned = ?2, potentially_removed = ?3, uncovered = ?4, updated_at = ?5
         WHERE id = ?1",
        params![
            id,
            orphaned as i32,
            potentially_removed as i32,
            uncovered as i32,
            format_datetime(&Utc::now()),
        ],
    )?;

    if orphaned && !current.orphaned {
        emit_event(conn, id, EventType::Archived, "scanner", None, None, Some("orphaned"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gonogo_core::test::TestBuilder;

    use crate::sqlite::store::SqliteStore;

    #[test]
    fn insert_and_find_with_assocs() {
        let store = SqliteStore::open_in_memory().unwrap();
        let conn = store.lock_conn().unwrap();

        let t = TestBuilder::new("tests/test_auth.py", "test_login")
            .story_ids(vec!["US-00006".into()])
            .epic_ids(vec!["EP-00003".into()])
            .component_tags(vec!["backend".into(), "auth".into()])
            .build();
        insert_test_on_conn(&conn, &t).unwrap();

        let back = find_test_on_conn(&conn, "tests/test_auth.py::test_login")
            .unwrap()
            .unwrap();
        assert_eq!(back.story_ids, vec!["US-00006"]);
        assert_eq!(back.epic_ids, vec!["EP-00003"]);
        assert_eq!(back.component_tags, vec!["auth", "backend"]);
    }

    #[test]
    fn merge_unions_associations() {
        let store = SqliteStore::open_in_memory().unwrap();
        let conn = store.lock_conn().unwrap();

        let t = TestBuilder::new("tests/test_auth.py", "test_login")
            .story_ids(vec!["US-00006".into()])
            .build();
        insert_test_on_conn(&conn, &t).unwrap();

        let rescanned = TestBuilder::new("tests/test_auth.py", "test_login")
            .story_ids(vec!["US-00007".into()])
            .component_tags(vec!["auth".into()])
            .build();
        merge_test_on_conn(&conn, &rescanned).unwrap();

        let back = find_test_on_conn(&conn, "tests/test_auth.py::test_login")
            .unwrap()
            .unwrap();
        // Union: earlier association survives.
        assert_eq!(back.story_ids, vec!["US-00006", "US-00007"]);
        assert_eq!(back.component_tags, vec!["auth"]);
    }

    #[test]
    fn merge_clears_orphan_flags() {
        let store = SqliteStore::open_in_memory().unwrap();
        let conn = store.lock_conn().unwrap();

        let t = TestBuilder::new("tests/test_auth.py", "test_login").build();
        insert_test_on_conn(&conn, &t).unwrap();
        set_test_flags_on_conn(
            &conn,
            &t.id,
            &TestFlags {
                orphaned: Some(true),
                ..Default::default()
            },
        )
        .unwrap();

        let rescanned = TestBuilder::new("tests/test_auth.py", "test_login").build();
        merge_test_on_conn(&conn, &rescanned).unwrap();

        let back = find_test_on_conn(&conn, &t.id).unwrap().unwrap();
        assert!(!back.orphaned);
        assert!(!back.potentially_removed);
    }

    #[test]
    fn merge_missing_test_is_not_found() {
        let store = SqliteStore::open_in_memory().unwrap();
        let conn = store.lock_conn().unwrap();
        let t = TestBuilder::new("tests/test_x.py", "test_x").build();
        let err = merge_test_on_conn(&conn, &t).unwrap_err();
        assert!(err.is_not_found());
    }
}
