//! Config/metadata key-value operations and sequential ID allocation.

use rusqlite::{Connection, OptionalExtension, params};

use gonogo_core::id::{EntityKind, format_id};

use crate::error::Result;

/// Allocates the next `PREFIX-NNNNN` ID for the given kind and advances
/// the counter. Must run inside a transaction so concurrent allocations
/// cannot collide.
pub(crate) fn allocate_id_on_conn(conn: &Connection, kind: EntityKind) -> Result<String> {
    let key = kind.counter_key();
    let seq: u32 = conn
        .query_row(
            "SELECT value FROM config WHERE key = ?1",
            params![key],
            |row| {
                let v: String = row.get(0)?;
                Ok(v.parse::<u32>().unwrap_or(1))
            },
        )
        .optional()?
        .unwrap_or(1);

    conn.execute(
        "INSERT OR REPLACE INTO config (key, value) VALUES (?1, ?2)",
        params![key, (seq + 1).to_string()],
    )?;

    Ok(format_id(kind, seq))
}

/// Reads a metadata value (since-token, journal cursors, ...).
pub(crate) fn get_meta_on_conn(conn: &Connection, key: &str) -> Result<Option<String>> {
    let value = conn
        .query_row(
            "SELECT value FROM metadata WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value)
}

/// Writes a metadata value.
pub(crate) fn set_meta_on_conn(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
        params![key, value],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::store::SqliteStore;

    #[test]
    fn ids_are_sequential_per_kind() {
        let store = SqliteStore::open_in_memory().unwrap();
        let conn = store.lock_conn().unwrap();

        assert_eq!(
            allocate_id_on_conn(&conn, EntityKind::Epic).unwrap(),
            "EP-00001"
        );
        assert_eq!(
            allocate_id_on_conn(&conn, EntityKind::Epic).unwrap(),
            "EP-00002"
        );
        // Other kinds keep their own counters.
        assert_eq!(
            allocate_id_on_conn(&conn, EntityKind::Defect).unwrap(),
            "DEF-00001"
        );
    }

    #[test]
    fn meta_roundtrip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let conn = store.lock_conn().unwrap();

        assert_eq!(get_meta_on_conn(&conn, "sync:since_token").unwrap(), None);
        set_meta_on_conn(&conn, "sync:since_token", "cursor-42").unwrap();
        assert_eq!(
            get_meta_on_conn(&conn, "sync:since_token").unwrap().as_deref(),
            Some("cursor-42")
        );
        set_meta_on_conn(&conn, "sync:since_token", "cursor-43").unwrap();
        assert_eq!(
            get_meta_on_conn(&conn, "sync:since_token").unwrap().as_deref(),
            Some("cursor-43")
        );
    }
}
