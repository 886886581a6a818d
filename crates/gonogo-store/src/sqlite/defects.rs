//! Defect CRUD operations, including the auto-created-defect lookup used
//! by the Execution Collector's idempotence invariant.

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};

use gonogo_core::defect::Defect;
use gonogo_core::enums::{DefectSeverity, DefectStatus, EventType, FailureCategory};
use gonogo_core::validation::validate_defect;

use crate::error::{Result, StoreError};
use crate::sqlite::{emit_event, format_datetime, parse_datetime};
use crate::traits::DefectUpdates;

pub(crate) const DEFECT_COLUMNS: &str = "\
    id, title, severity, status, tracker_ref, user_story_id, test_id, \
    auto_created, failure_category, failure_digest, \
    created_at, updated_at, resolved_at, archived";

pub(crate) fn scan_defect(row: &Row<'_>) -> rusqlite::Result<Defect> {
    let severity_str: String = row.get("severity")?;
    let status_str: String = row.get("status")?;
    Ok(Defect {
        id: row.get("id")?,
        title: row.get("title")?,
        severity: DefectSeverity::parse(&severity_str).unwrap_or_default(),
        status: DefectStatus::parse(&status_str).unwrap_or_default(),
        tracker_ref: row.get("tracker_ref")?,
        user_story_id: row.get("user_story_id")?,
        test_id: row.get("test_id")?,
        auto_created: row.get::<_, i32>("auto_created")? != 0,
        failure_category: row
            .get::<_, Option<String>>("failure_category")?
            .as_deref()
            .and_then(FailureCategory::parse),
        failure_digest: row.get("failure_digest")?,
        created_at: parse_datetime(&row.get::<_, String>("created_at")?),
        updated_at: parse_datetime(&row.get::<_, String>("updated_at")?),
        resolved_at: row
            .get::<_, Option<String>>("resolved_at")?
            .as_deref()
            .map(parse_datetime),
        archived: row.get::<_, i32>("archived")? != 0,
    })
}

pub(crate) fn insert_defect_on_conn(
    conn: &Connection,
    defect: &Defect,
    actor: &str,
) -> Result<()> {
    validate_defect(defect)?;

    conn.execute(
        &format!(
            "INSERT INTO defects ({DEFECT_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
        ),
        params![
            defect.id,
            defect.title,
            defect.severity.as_str(),
            defect.status.as_str(),
            defect.tracker_ref,
            defect.user_story_id,
            defect.test_id,
            defect.auto_created as i32,
            defect.failure_category.map(|c| c.as_str()),
            defect.failure_digest,
            format_datetime(&defect.created_at),
            format_datetime(&defect.updated_at),
            defect.resolved_at.as_ref().map(format_datetime),
            defect.archived as i32,
        ],
    )?;

    let event_type = if defect.auto_created {
        EventType::DefectAutoCreated
    } else {
        EventType::Created
    };
    emit_event(
        conn,
        &defect.id,
        event_type,
        actor,
        None,
        defect.test_id.as_deref(),
        None,
    )?;
    Ok(())
}

pub(crate) fn get_defect_on_conn(conn: &Connection, id: &str) -> Result<Defect> {
    let sql = format!("SELECT {DEFECT_COLUMNS} FROM defects WHERE id = ?1");
    conn.query_row(&sql, params![id], scan_defect)
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::not_found("defect", id),
            other => StoreError::Query(other),
        })
}

pub(crate) fn find_defect_by_tracker_ref_on_conn(
    conn: &Connection,
    tracker_ref: &str,
) -> Result<Option<Defect>> {
    let sql = format!("SELECT {DEFECT_COLUMNS} FROM defects WHERE tracker_ref = ?1");
    let defect = conn
        .query_row(&sql, params![tracker_ref], scan_defect)
        .optional()?;
    Ok(defect)
}

/// The open auto-created defect for (test, failure category), if any.
/// The idempotence invariant keeps this to at most one row.
pub(crate) fn find_open_auto_defect_on_conn(
    conn: &Connection,
    test_id: &str,
    category: FailureCategory,
) -> Result<Option<Defect>> {
    let sql = format!(
        "SELECT {DEFECT_COLUMNS} FROM defects
         WHERE test_id = ?1
           AND failure_category = ?2
           AND auto_created = 1
           AND archived = 0
           AND status IN ('open', 'triaged', 'in_progress')"
    );
    let defect = conn
        .query_row(&sql, params![test_id, category.as_str()], scan_defect)
        .optional()?;
    Ok(defect)
}

pub(crate) fn list_defects_on_conn(conn: &Connection) -> Result<Vec<Defect>> {
    let sql = format!("SELECT {DEFECT_COLUMNS} FROM defects ORDER BY id");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], scan_defect)?;
    let mut defects = Vec::new();
    for row in rows {
        defects.push(row?);
    }
    Ok(defects)
}

/// Applies partial updates. A transition into `resolved`/`wontfix` stamps
/// `resolved_at` once.
pub(crate) fn update_defect_on_conn(
    conn: &Connection,
    id: &str,
    updates: &DefectUpdates,
    actor: &str,
) -> Result<()> {
    let current = get_defect_on_conn(conn, id)?;
    let mut next = current.clone();

    if let Some(ref title) = updates.title {
        next.title = title.clone();
    }
    if let Some(severity) = updates.severity {
        next.severity = severity;
    }
    if let Some(status) = updates.status {
        next.status = status;
        if !status.is_open() && next.resolved_at.is_none() {
            next.resolved_at = Some(Utc::now());
        }
    }
    if let Some(ref tref) = updates.tracker_ref {
        next.tracker_ref = tref.clone();
    }
    if let Some(ref story) = updates.user_story_id {
        next.user_story_id = story.clone();
    }
    if let Some(archived) = updates.archived {
        next.archived = archived;
    }
    next.updated_at = Utc::now();
    validate_defect(&next)?;

    conn.execute(
        "UPDATE defects SET
            title = ?2, severity = ?3, status = ?4, tracker_ref = ?5,
            user_story_id = ?6, updated_at = ?7, resolved_at = ?8, archived = ?9
         WHERE id = ?1",
        params![
            id,
            next.title,
            next.severity.as_str(),
            next.status.as_str(),
            next.tracker_ref,
            next.user_story_id,
            format_datetime(&next.updated_at),
            next.resolved_at.as_ref().map(format_datetime),
            next.archived as i32,
        ],
    )?;

    if next.status != current.status {
        emit_event(
            conn,
            id,
            EventType::StatusChanged,
            actor,
            Some(current.status.as_str()),
            Some(next.status.as_str()),
            None,
        )?;
    } else {
        emit_event(conn, id, EventType::Updated, actor, None, None, None)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::store::SqliteStore;

    fn auto_defect(id: &str, test_id: &str, category: FailureCategory) -> Defect {
        let mut d = Defect::new(id, format!("Auto-created: {test_id} keeps failing"));
        d.auto_created = true;
        d.test_id = Some(test_id.into());
        d.failure_category = Some(category);
        d.failure_digest = Some("ab12cd34ef56ab12".into());
        d
    }

    #[test]
    fn insert_and_get() {
        let store = SqliteStore::open_in_memory().unwrap();
        let conn = store.lock_conn().unwrap();

        let d = Defect::new("DEF-00001", "Checkout 500s");
        insert_defect_on_conn(&conn, &d, "sync").unwrap();
        let back = get_defect_on_conn(&conn, "DEF-00001").unwrap();
        assert_eq!(back.title, "Checkout 500s");
    }

    #[test]
    fn open_auto_defect_lookup() {
        let store = SqliteStore::open_in_memory().unwrap();
        let conn = store.lock_conn().unwrap();

        let test_id = "tests/test_checkout.py::test_checkout";
        let d = auto_defect("DEF-00001", test_id, FailureCategory::Assertion);
        insert_defect_on_conn(&conn, &d, "collector").unwrap();

        let found =
            find_open_auto_defect_on_conn(&conn, test_id, FailureCategory::Assertion)
                .unwrap();
        assert!(found.is_some());

        // Different category: no match.
        let other =
            find_open_auto_defect_on_conn(&conn, test_id, FailureCategory::Timeout).unwrap();
        assert!(other.is_none());
    }

    #[test]
    fn resolved_auto_defect_not_open() {
        let store = SqliteStore::open_in_memory().unwrap();
        let conn = store.lock_conn().unwrap();

        let test_id = "tests/test_checkout.py::test_checkout";
        let d = auto_defect("DEF-00001", test_id, FailureCategory::Assertion);
        insert_defect_on_conn(&conn, &d, "collector").unwrap();

        let updates = DefectUpdates {
            status: Some(DefectStatus::Resolved),
            ..Default::default()
        };
        update_defect_on_conn(&conn, "DEF-00001", &updates, "sync").unwrap();

        let found =
            find_open_auto_defect_on_conn(&conn, test_id, FailureCategory::Assertion)
                .unwrap();
        assert!(found.is_none());

        let d = get_defect_on_conn(&conn, "DEF-00001").unwrap();
        assert!(d.resolved_at.is_some());
    }

    #[test]
    fn auto_created_event_emitted() {
        let store = SqliteStore::open_in_memory().unwrap();
        let conn = store.lock_conn().unwrap();

        let d = auto_defect("DEF-00001", "t.py::t", FailureCategory::Flaky);
        insert_defect_on_conn(&conn, &d, "collector").unwrap();

        let count: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM events WHERE event_type = 'defect_auto_created'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }
}
