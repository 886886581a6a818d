//! Epic CRUD operations, including the status-monotonicity invariant.

use chrono::Utc;
use rusqlite::{Connection, Row, params};

use gonogo_core::enums::{EpicStatus, EventType};
use gonogo_core::epic::Epic;
use gonogo_core::validation::validate_epic;

use crate::error::{Result, StoreError};
use crate::sqlite::{emit_event, format_datetime, parse_datetime};
use crate::traits::EpicUpdates;

pub(crate) const EPIC_COLUMNS: &str = "\
    id, title, status, capability_id, tracker_ref, planned_end_at, \
    roi_value_cents, roi_cost_cents, adoption_metric, \
    created_at, updated_at, archived";

pub(crate) fn scan_epic(row: &Row<'_>) -> rusqlite::Result<Epic> {
    let status_str: String = row.get("status")?;
    Ok(Epic {
        id: row.get("id")?,
        title: row.get("title")?,
        status: EpicStatus::parse(&status_str).unwrap_or_default(),
        capability_id: row.get("capability_id")?,
        tracker_ref: row.get("tracker_ref")?,
        planned_end_at: row
            .get::<_, Option<String>>("planned_end_at")?
            .as_deref()
            .map(parse_datetime),
        roi_value_cents: row.get("roi_value_cents")?,
        roi_cost_cents: row.get("roi_cost_cents")?,
        adoption_metric: row.get("adoption_metric")?,
        created_at: parse_datetime(&row.get::<_, String>("created_at")?),
        updated_at: parse_datetime(&row.get::<_, String>("updated_at")?),
        archived: row.get::<_, i32>("archived")? != 0,
    })
}

pub(crate) fn insert_epic_on_conn(conn: &Connection, epic: &Epic, actor: &str) -> Result<()> {
    validate_epic(epic)?;

    conn.execute(
        &format!(
            "INSERT INTO epics ({EPIC_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
        ),
        params![
            epic.id,
            epic.title,
            epic.status.as_str(),
            epic.capability_id,
            epic.tracker_ref,
            epic.planned_end_at.as_ref().map(format_datetime),
            epic.roi_value_cents,
            epic.roi_cost_cents,
            epic.adoption_metric,
            format_datetime(&epic.created_at),
            format_datetime(&epic.updated_at),
            epic.archived as i32,
        ],
    )?;

    emit_event(conn, &epic.id, EventType::Created, actor, None, None, None)?;
    Ok(())
}

pub(crate) fn get_epic_on_conn(conn: &Connection, id: &str) -> Result<Epic> {
    let sql = format!("SELECT {EPIC_COLUMNS} FROM epics WHERE id = ?1");
    conn.query_row(&sql, params![id], scan_epic)
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::not_found("epic", id),
            other => StoreError::Query(other),
        })
}

pub(crate) fn epic_exists_on_conn(conn: &Connection, id: &str) -> Result<bool> {
    let count: i32 = conn.query_row(
        "SELECT COUNT(*) FROM epics WHERE id = ?1",
        params![id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub(crate) fn list_epics_on_conn(conn: &Connection) -> Result<Vec<Epic>> {
    let sql = format!("SELECT {EPIC_COLUMNS} FROM epics ORDER BY id");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], scan_epic)?;
    let mut epics = Vec::new();
    for row in rows {
        epics.push(row?);
    }
    Ok(epics)
}

/// Applies partial updates. A status change that regresses the lattice is
/// rejected unless `updates.admin_override` is set, in which case it is
/// logged as `status_overridden`.
pub(crate) fn update_epic_on_conn(
    conn: &Connection,
    id: &str,
    updates: &EpicUpdates,
    actor: &str,
) -> Result<()> {
    let current = get_epic_on_conn(conn, id)?;
    let mut next = current.clone();

    if let Some(ref title) = updates.title {
        next.title = title.clone();
    }
    if let Some(status) = updates.status {
        if current.status.is_regression_to(status) && !updates.admin_override {
            return Err(StoreError::StatusRegression {
                from: current.status.as_str().to_owned(),
                to: status.as_str().to_owned(),
            });
        }
        next.status = status;
    }
    if let Some(ref cap) = updates.capability_id {
        next.capability_id = cap.clone();
    }
    if let Some(ref tref) = updates.tracker_ref {
        next.tracker_ref = tref.clone();
    }
    if let Some(planned) = updates.planned_end_at {
        next.planned_end_at = planned;
    }
    if let Some(v) = updates.roi_value_cents {
        next.roi_value_cents = v;
    }
    if let Some(c) = updates.roi_cost_cents {
        next.roi_cost_cents = c;
    }
    if let Some(adoption) = updates.adoption_metric {
        next.adoption_metric = adoption;
    }
    if let Some(archived) = updates.archived {
        next.archived = archived;
    }
    next.updated_at = Utc::now();
    validate_epic(&next)?;

    conn.execute(
        "UPDATE epics SET
            title = ?2, status = ?3, capability_id = ?4, tracker_ref = ?5,
            planned_end_at = ?6, roi_value_cents = ?7, roi_cost_cents = ?8,
            adoption_metric = ?9, updated_at = ?10, archived = ?11
         WHERE id = ?1",
        params![
            id,
            next.title,
            next.status.as_str(),
            next.capability_id,
            next.tracker_ref,
            next.planned_end_at.as_ref().map(format_datetime),
            next.roi_value_cents,
            next.roi_cost_cents,
            next.adoption_metric,
            format_datetime(&next.updated_at),
            next.archived as i32,
        ],
    )?;

    if next.status != current.status {
        let event_type = if current.status.is_regression_to(next.status) {
            EventType::StatusOverridden
        } else {
            EventType::StatusChanged
        };
        emit_event(
            conn,
            id,
            event_type,
            actor,
            Some(current.status.as_str()),
            Some(next.status.as_str()),
            None,
        )?;
    } else {
        emit_event(conn, id, EventType::Updated, actor, None, None, None)?;
    }

    // Archiving an Epic removes its dependency edges (both directions).
    if next.archived && !current.archived {
        conn.execute(
            "DELETE FROM epic_dependencies WHERE from_epic = ?1 OR to_epic = ?1",
            params![id],
        )?;
        emit_event(conn, id, EventType::Archived, actor, None, None, None)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gonogo_core::epic::EpicBuilder;

    use crate::sqlite::store::SqliteStore;

    fn store_with_epic(status: EpicStatus) -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        {
            let conn = store.lock_conn().unwrap();
            let epic = EpicBuilder::new("EP-00001", "Checkout").status(status).build();
            insert_epic_on_conn(&conn, &epic, "admin").unwrap();
        }
        store
    }

    #[test]
    fn insert_and_get() {
        let store = store_with_epic(EpicStatus::Planned);
        let conn = store.lock_conn().unwrap();
        let epic = get_epic_on_conn(&conn, "EP-00001").unwrap();
        assert_eq!(epic.title, "Checkout");
        assert!(epic_exists_on_conn(&conn, "EP-00001").unwrap());
        assert!(!epic_exists_on_conn(&conn, "EP-00002").unwrap());
    }

    #[test]
    fn forward_status_change_allowed() {
        let store = store_with_epic(EpicStatus::Planned);
        let conn = store.lock_conn().unwrap();
        let updates = EpicUpdates {
            status: Some(EpicStatus::InProgress),
            ..Default::default()
        };
        update_epic_on_conn(&conn, "EP-00001", &updates, "admin").unwrap();
        let epic = get_epic_on_conn(&conn, "EP-00001").unwrap();
        assert_eq!(epic.status, EpicStatus::InProgress);
    }

    #[test]
    fn regression_rejected_without_override() {
        let store = store_with_epic(EpicStatus::Done);
        let conn = store.lock_conn().unwrap();
        let updates = EpicUpdates {
            status: Some(EpicStatus::Planned),
            ..Default::default()
        };
        let err = update_epic_on_conn(&conn, "EP-00001", &updates, "admin").unwrap_err();
        assert!(matches!(err, StoreError::StatusRegression { .. }));

        // State unchanged.
        let epic = get_epic_on_conn(&conn, "EP-00001").unwrap();
        assert_eq!(epic.status, EpicStatus::Done);
    }

    #[test]
    fn regression_with_override_is_logged() {
        let store = store_with_epic(EpicStatus::Done);
        let conn = store.lock_conn().unwrap();
        let updates = EpicUpdates {
            status: Some(EpicStatus::Planned),
            admin_override: true,
            ..Default::default()
        };
        update_epic_on_conn(&conn, "EP-00001", &updates, "admin").unwrap();

        let epic = get_epic_on_conn(&conn, "EP-00001").unwrap();
        assert_eq!(epic.status, EpicStatus::Planned);

        let count: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM events WHERE entity_id = 'EP-00001' AND event_type = 'status_overridden'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn archive_removes_dependency_edges() {
        let store = store_with_epic(EpicStatus::Planned);
        let conn = store.lock_conn().unwrap();
        let other = EpicBuilder::new("EP-00002", "Other").build();
        insert_epic_on_conn(&conn, &other, "admin").unwrap();
        conn.execute(
            "INSERT INTO epic_dependencies (from_epic, to_epic, kind, created_at)
             VALUES ('EP-00001', 'EP-00002', 'blocks', '2026-01-01T00:00:00.000Z')",
            [],
        )
        .unwrap();

        let updates = EpicUpdates {
            archived: Some(true),
            ..Default::default()
        };
        update_epic_on_conn(&conn, "EP-00001", &updates, "admin").unwrap();

        let count: i32 = conn
            .query_row("SELECT COUNT(*) FROM epic_dependencies", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
