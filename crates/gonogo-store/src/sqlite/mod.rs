//! SQLite backend: schema, per-table operation modules, and the
//! [`Storage`](crate::traits::Storage) implementation.

pub mod capabilities;
pub mod defects;
pub mod dependencies;
pub mod epics;
pub mod executions;
pub mod export;
pub mod meta;
pub mod schema;
pub mod store;
pub mod stories;
pub mod tests;
pub mod transaction;

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use gonogo_core::enums::EventType;

use crate::error::Result;

// ---------------------------------------------------------------------------
// Shared datetime helpers
// ---------------------------------------------------------------------------

/// Formats a `DateTime<Utc>` as ISO 8601 TEXT for SQLite.
pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Parses an ISO 8601 TEXT string from SQLite into a `DateTime<Utc>`.
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    s.parse::<DateTime<Utc>>().unwrap_or_else(|_| {
        chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.fZ")
            .or_else(|_| chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%SZ"))
            .or_else(|_| chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
            .map(|ndt| ndt.and_utc())
            .unwrap_or_else(|_| Utc::now())
    })
}

// ---------------------------------------------------------------------------
// Audit events
// ---------------------------------------------------------------------------

/// Emits an event row into the events table.
pub(crate) fn emit_event(
    conn: &Connection,
    entity_id: &str,
    event_type: EventType,
    actor: &str,
    old_value: Option<&str>,
    new_value: Option<&str>,
    comment: Option<&str>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO events (entity_id, event_type, actor, old_value, new_value, comment, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            entity_id,
            event_type.as_str(),
            actor,
            old_value,
            new_value,
            comment,
            format_datetime(&Utc::now()),
        ],
    )?;
    Ok(())
}

/// Lists audit events for an entity, oldest first.
pub(crate) fn list_events_on_conn(
    conn: &Connection,
    entity_id: &str,
) -> Result<Vec<crate::traits::AuditEvent>> {
    let mut stmt = conn.prepare(
        "SELECT entity_id, event_type, actor, old_value, new_value, comment, created_at
         FROM events WHERE entity_id = ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(rusqlite::params![entity_id], |row| {
        let event_type_str: String = row.get("event_type")?;
        Ok(crate::traits::AuditEvent {
            entity_id: row.get("entity_id")?,
            event_type: EventType::parse(&event_type_str).unwrap_or_default(),
            actor: row.get("actor")?,
            old_value: row.get("old_value")?,
            new_value: row.get("new_value")?,
            comment: row.get("comment")?,
            created_at: parse_datetime(&row.get::<_, String>("created_at")?),
        })
    })?;
    let mut events = Vec::new();
    for row in rows {
        events.push(row?);
    }
    Ok(events)
}

#[cfg(test)]
mod mod_tests {
    use super::*;

    #[test]
    fn datetime_roundtrip() {
        let now = Utc::now();
        let s = format_datetime(&now);
        let back = parse_datetime(&s);
        // Millisecond precision is preserved.
        assert_eq!(
            now.timestamp_millis(),
            back.timestamp_millis()
        );
    }

    #[test]
    fn parse_tolerates_second_precision() {
        let back = parse_datetime("2026-03-01T12:00:00Z");
        assert_eq!(back.timestamp() % 60, 0);
    }
}
