//! Capability CRUD operations.

use rusqlite::{Connection, Row, params};

use gonogo_core::entity::Capability;
use gonogo_core::enums::EventType;

use crate::error::{Result, StoreError};
use crate::sqlite::{emit_event, format_datetime, parse_datetime};

pub(crate) const CAPABILITY_COLUMNS: &str =
    "id, name, description, created_at, updated_at, archived";

pub(crate) fn scan_capability(row: &Row<'_>) -> rusqlite::Result<Capability> {
    Ok(Capability {
        id: row.get("id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        created_at: parse_datetime(&row.get::<_, String>("created_at")?),
        updated_at: parse_datetime(&row.get::<_, String>("updated_at")?),
        archived: row.get::<_, i32>("archived")? != 0,
    })
}

pub(crate) fn insert_capability_on_conn(
    conn: &Connection,
    cap: &Capability,
    actor: &str,
) -> Result<()> {
    if !gonogo_core::id::is_valid_id(gonogo_core::id::EntityKind::Capability, &cap.id) {
        return Err(StoreError::validation(format!(
            "malformed capability id: {}",
            cap.id
        )));
    }
    if cap.name.is_empty() {
        return Err(StoreError::validation("capability name is required"));
    }

    conn.execute(
        &format!(
            "INSERT INTO capabilities ({CAPABILITY_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
        ),
        params![
            cap.id,
            cap.name,
            cap.description,
            format_datetime(&cap.created_at),
            format_datetime(&cap.updated_at),
            cap.archived as i32,
        ],
    )?;

    emit_event(conn, &cap.id, EventType::Created, actor, None, None, None)?;
    Ok(())
}

pub(crate) fn get_capability_on_conn(conn: &Connection, id: &str) -> Result<Capability> {
    let sql = format!("SELECT {CAPABILITY_COLUMNS} FROM capabilities WHERE id = ?1");
    conn.query_row(&sql, params![id], scan_capability)
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::not_found("capability", id),
            other => StoreError::Query(other),
        })
}

pub(crate) fn capability_exists_on_conn(conn: &Connection, id: &str) -> Result<bool> {
    let count: i32 = conn.query_row(
        "SELECT COUNT(*) FROM capabilities WHERE id = ?1",
        params![id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub(crate) fn list_capabilities_on_conn(conn: &Connection) -> Result<Vec<Capability>> {
    let sql = format!("SELECT {CAPABILITY_COLUMNS} FROM capabilities ORDER BY id");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], scan_capability)?;
    let mut caps = Vec::new();
    for row in rows {
        caps.push(row?);
    }
    Ok(caps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::store::SqliteStore;

    #[test]
    fn insert_and_get() {
        let store = SqliteStore::open_in_memory().unwrap();
        let conn = store.lock_conn().unwrap();

        let cap = Capability::new("CAP-00001", "Payments");
        insert_capability_on_conn(&conn, &cap, "admin").unwrap();

        let back = get_capability_on_conn(&conn, "CAP-00001").unwrap();
        assert_eq!(back.name, "Payments");

        let all = list_capabilities_on_conn(&conn).unwrap();
        assert_eq!(all.len(), 1);
    }

    #[test]
    fn malformed_id_rejected() {
        let store = SqliteStore::open_in_memory().unwrap();
        let conn = store.lock_conn().unwrap();

        let cap = Capability::new("CAP-1", "Bad");
        let err = insert_capability_on_conn(&conn, &cap, "admin").unwrap_err();
        assert!(matches!(err, StoreError::Validation { .. }));
    }

    #[test]
    fn missing_capability_is_not_found() {
        let store = SqliteStore::open_in_memory().unwrap();
        let conn = store.lock_conn().unwrap();
        let err = get_capability_on_conn(&conn, "CAP-00099").unwrap_err();
        assert!(err.is_not_found());
    }
}
