//! EpicDependency CRUD operations and cycle detection.

use std::collections::{HashSet, VecDeque};

use rusqlite::{Connection, Row, params};

use gonogo_core::dependency::EpicDependency;
use gonogo_core::enums::{DependencyKind, EventType};
use gonogo_core::validation::validate_dependency;

use crate::error::{Result, StoreError};
use crate::sqlite::{emit_event, format_datetime, parse_datetime};

pub(crate) const DEPENDENCY_COLUMNS: &str = "from_epic, to_epic, kind, rationale, created_at";

pub(crate) fn scan_dependency(row: &Row<'_>) -> rusqlite::Result<EpicDependency> {
    let kind_str: String = row.get("kind")?;
    Ok(EpicDependency {
        from_epic: row.get("from_epic")?,
        to_epic: row.get("to_epic")?,
        kind: DependencyKind::parse(&kind_str).unwrap_or_default(),
        rationale: row.get("rationale")?,
        created_at: parse_datetime(&row.get::<_, String>("created_at")?),
    })
}

/// Inserts a dependency edge, with cycle detection for `blocks` edges.
/// Both endpoints must exist (enforced by foreign keys).
pub(crate) fn add_dependency_on_conn(
    conn: &Connection,
    dep: &EpicDependency,
    actor: &str,
) -> Result<()> {
    validate_dependency(dep)?;

    if dep.kind.is_blocking() {
        detect_cycle(conn, &dep.from_epic, &dep.to_epic)?;
    }

    conn.execute(
        &format!(
            "INSERT OR REPLACE INTO epic_dependencies ({DEPENDENCY_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5)"
        ),
        params![
            dep.from_epic,
            dep.to_epic,
            dep.kind.as_str(),
            dep.rationale,
            format_datetime(&dep.created_at),
        ],
    )?;

    emit_event(
        conn,
        &dep.from_epic,
        EventType::DependencyAdded,
        actor,
        None,
        Some(&dep.to_epic),
        Some(dep.kind.as_str()),
    )?;

    Ok(())
}

/// Removes a dependency edge.
pub(crate) fn remove_dependency_on_conn(
    conn: &Connection,
    from: &str,
    to: &str,
    kind: DependencyKind,
    actor: &str,
) -> Result<()> {
    let affected = conn.execute(
        "DELETE FROM epic_dependencies WHERE from_epic = ?1 AND to_epic = ?2 AND kind = ?3",
        params![from, to, kind.as_str()],
    )?;

    if affected == 0 {
        return Err(StoreError::not_found(
            "dependency",
            format!("{from} -{}-> {to}", kind.as_str()),
        ));
    }

    emit_event(
        conn,
        from,
        EventType::DependencyRemoved,
        actor,
        Some(to),
        None,
        Some(kind.as_str()),
    )?;

    Ok(())
}

/// Returns all edges, optionally restricted to the given kinds.
pub(crate) fn list_dependencies_on_conn(
    conn: &Connection,
    kinds: Option<&[DependencyKind]>,
) -> Result<Vec<EpicDependency>> {
    let mut deps = Vec::new();
    match kinds {
        None => {
            let sql = format!(
                "SELECT {DEPENDENCY_COLUMNS} FROM epic_dependencies ORDER BY from_epic, to_epic"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], scan_dependency)?;
            for row in rows {
                deps.push(row?);
            }
        }
        Some(kinds) => {
            let placeholders: Vec<String> =
                (1..=kinds.len()).map(|i| format!("?{i}")).collect();
            let sql = format!(
                "SELECT {DEPENDENCY_COLUMNS} FROM epic_dependencies
                 WHERE kind IN ({})
                 ORDER BY from_epic, to_epic",
                placeholders.join(",")
            );
            let mut stmt = conn.prepare(&sql)?;
            let kind_strs: Vec<&str> = kinds.iter().map(|k| k.as_str()).collect();
            let rows = stmt.query_map(rusqlite::params_from_iter(kind_strs), scan_dependency)?;
            for row in rows {
                deps.push(row?);
            }
        }
    }
    Ok(deps)
}

// ---------------------------------------------------------------------------
// Cycle detection
// ---------------------------------------------------------------------------

/// Detects whether adding an edge `from -> to` would create a cycle in the
/// `blocks` graph. BFS from `to` along existing blocks edges; reaching
/// `from` means the new edge would close a loop.
fn detect_cycle(conn: &Connection, from: &str, to: &str) -> Result<()> {
    let mut visited: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<String> = VecDeque::new();
    queue.push_back(to.to_string());

    while let Some(current) = queue.pop_front() {
        if current == from {
            return Err(StoreError::CycleDetected);
        }
        if !visited.insert(current.clone()) {
            continue;
        }
        let mut stmt = conn.prepare_cached(
            "SELECT to_epic FROM epic_dependencies
             WHERE from_epic = ?1 AND kind = 'blocks'",
        )?;
        let rows = stmt.query_map(params![current], |row| row.get::<_, String>(0))?;
        for row in rows {
            let next = row?;
            if !visited.contains(&next) {
                queue.push_back(next);
            }
        }
    }

    Ok(())
}
