//! DDL statements and migrations for the SQLite schema.
//!
//! Timestamps are stored as TEXT in ISO 8601 format (SQLite has no native
//! datetime type). Booleans are stored as INTEGER (0/1). Association sets
//! live in join tables without foreign keys: annotations may reference
//! Epics and Stories that have not been ingested yet, and resolve later.

/// Current schema version. Bumped whenever DDL or migrations change.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Core DDL statements executed during `init_schema`.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    // -- Capabilities --------------------------------------------------------
    r#"
    CREATE TABLE IF NOT EXISTS capabilities (
        id          TEXT PRIMARY KEY,
        name        TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        updated_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        archived    INTEGER NOT NULL DEFAULT 0
    )
    "#,
    // -- Epics ---------------------------------------------------------------
    r#"
    CREATE TABLE IF NOT EXISTS epics (
        id              TEXT PRIMARY KEY,
        title           TEXT NOT NULL,
        status          TEXT NOT NULL DEFAULT 'planned',
        capability_id   TEXT,
        tracker_ref     TEXT,
        planned_end_at  TEXT,
        roi_value_cents INTEGER NOT NULL DEFAULT 0,
        roi_cost_cents  INTEGER NOT NULL DEFAULT 0,
        adoption_metric REAL,
        created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        updated_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        archived        INTEGER NOT NULL DEFAULT 0,
        FOREIGN KEY (capability_id) REFERENCES capabilities(id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_epics_status ON epics(status)",
    "CREATE INDEX IF NOT EXISTS idx_epics_capability ON epics(capability_id)",
    "CREATE INDEX IF NOT EXISTS idx_epics_tracker_ref ON epics(tracker_ref)",
    // -- UserStories ---------------------------------------------------------
    r#"
    CREATE TABLE IF NOT EXISTS user_stories (
        id            TEXT PRIMARY KEY,
        title         TEXT NOT NULL,
        story_points  INTEGER NOT NULL DEFAULT 0,
        status        TEXT NOT NULL DEFAULT 'planned',
        tracker_ref   TEXT NOT NULL UNIQUE,
        epic_id       TEXT,
        orphan_parent TEXT,
        assignee      TEXT NOT NULL DEFAULT '',
        created_at    TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        updated_at    TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        done_at       TEXT,
        FOREIGN KEY (epic_id) REFERENCES epics(id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_stories_epic ON user_stories(epic_id)",
    "CREATE INDEX IF NOT EXISTS idx_stories_status ON user_stories(status)",
    "CREATE INDEX IF NOT EXISTS idx_stories_orphan_parent ON user_stories(orphan_parent)",
    // -- Defects -------------------------------------------------------------
    r#"
    CREATE TABLE IF NOT EXISTS defects (
        id               TEXT PRIMARY KEY,
        title            TEXT NOT NULL,
        severity         TEXT NOT NULL DEFAULT 'medium',
        status           TEXT NOT NULL DEFAULT 'open',
        tracker_ref      TEXT,
        user_story_id    TEXT,
        test_id          TEXT,
        auto_created     INTEGER NOT NULL DEFAULT 0,
        failure_category TEXT,
        failure_digest   TEXT,
        created_at       TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        updated_at       TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        resolved_at      TEXT,
        archived         INTEGER NOT NULL DEFAULT 0
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_defects_story ON defects(user_story_id)",
    "CREATE INDEX IF NOT EXISTS idx_defects_status ON defects(status)",
    "CREATE INDEX IF NOT EXISTS idx_defects_tracker_ref ON defects(tracker_ref)",
    "CREATE INDEX IF NOT EXISTS idx_defects_auto ON defects(test_id, failure_category, status)",
    // -- Tests ---------------------------------------------------------------
    r#"
    CREATE TABLE IF NOT EXISTS tests (
        id                    TEXT PRIMARY KEY,
        file_path             TEXT NOT NULL,
        symbol                TEXT NOT NULL,
        test_type             TEXT NOT NULL DEFAULT 'unit',
        priority              TEXT NOT NULL DEFAULT 'medium',
        bdd_scenario          TEXT,
        orphaned              INTEGER NOT NULL DEFAULT 0,
        potentially_removed   INTEGER NOT NULL DEFAULT 0,
        uncovered             INTEGER NOT NULL DEFAULT 0,
        last_status           TEXT,
        last_duration_ms      INTEGER,
        last_recorded_at      TEXT,
        last_failure_category TEXT,
        last_failure_digest   TEXT,
        created_at            TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        updated_at            TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        summarized_runs       INTEGER NOT NULL DEFAULT 0,
        summarized_passed     INTEGER NOT NULL DEFAULT 0
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_tests_file ON tests(file_path)",
    "CREATE INDEX IF NOT EXISTS idx_tests_orphaned ON tests(orphaned)",
    "CREATE INDEX IF NOT EXISTS idx_tests_uncovered ON tests(uncovered)",
    // -- Test association sets (no FKs: references may resolve later) -------
    r#"
    CREATE TABLE IF NOT EXISTS test_stories (
        test_id  TEXT NOT NULL,
        story_id TEXT NOT NULL,
        PRIMARY KEY (test_id, story_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_test_stories_story ON test_stories(story_id)",
    r#"
    CREATE TABLE IF NOT EXISTS test_epics (
        test_id TEXT NOT NULL,
        epic_id TEXT NOT NULL,
        PRIMARY KEY (test_id, epic_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_test_epics_epic ON test_epics(epic_id)",
    r#"
    CREATE TABLE IF NOT EXISTS test_defects (
        test_id   TEXT NOT NULL,
        defect_id TEXT NOT NULL,
        PRIMARY KEY (test_id, defect_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS test_components (
        test_id TEXT NOT NULL,
        tag     TEXT NOT NULL,
        PRIMARY KEY (test_id, tag)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_test_components_tag ON test_components(tag)",
    // -- Epic dependencies ---------------------------------------------------
    r#"
    CREATE TABLE IF NOT EXISTS epic_dependencies (
        from_epic  TEXT NOT NULL,
        to_epic    TEXT NOT NULL,
        kind       TEXT NOT NULL DEFAULT 'blocks',
        rationale  TEXT NOT NULL DEFAULT '',
        created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        PRIMARY KEY (from_epic, to_epic, kind),
        FOREIGN KEY (from_epic) REFERENCES epics(id) ON DELETE CASCADE,
        FOREIGN KEY (to_epic) REFERENCES epics(id) ON DELETE CASCADE
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_epic_deps_to ON epic_dependencies(to_epic, kind)",
    // -- Execution history ---------------------------------------------------
    r#"
    CREATE TABLE IF NOT EXISTS test_executions (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        test_id          TEXT NOT NULL,
        status           TEXT NOT NULL,
        duration_ms      INTEGER NOT NULL DEFAULT 0,
        recorded_at      TEXT NOT NULL,
        failure_category TEXT,
        failure_digest   TEXT,
        FOREIGN KEY (test_id) REFERENCES tests(id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_executions_test ON test_executions(test_id, recorded_at DESC)",
    // -- Events (audit trail) ------------------------------------------------
    r#"
    CREATE TABLE IF NOT EXISTS events (
        id         INTEGER PRIMARY KEY AUTOINCREMENT,
        entity_id  TEXT NOT NULL,
        event_type TEXT NOT NULL,
        actor      TEXT NOT NULL,
        old_value  TEXT,
        new_value  TEXT,
        comment    TEXT,
        created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_id)",
    // -- Config and metadata -------------------------------------------------
    r#"
    CREATE TABLE IF NOT EXISTS config (
        key   TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS metadata (
        key   TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )
    "#,
];

/// Default config rows inserted once (INSERT OR IGNORE).
pub const DEFAULT_CONFIG: &[(&str, &str)] = &[
    ("next_id:capability", "1"),
    ("next_id:epic", "1"),
    ("next_id:story", "1"),
    ("next_id:defect", "1"),
];

/// Named forward-only migrations applied after the base DDL. Each runs at
/// most once, tracked via `metadata` keys `migration:<name>`.
pub const MIGRATIONS: &[(&str, &str)] = &[];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statements_are_nonempty() {
        assert!(!SCHEMA_STATEMENTS.is_empty());
        for stmt in SCHEMA_STATEMENTS {
            assert!(!stmt.trim().is_empty());
        }
    }

    #[test]
    fn default_config_covers_all_counters() {
        let keys: Vec<&str> = DEFAULT_CONFIG.iter().map(|(k, _)| *k).collect();
        assert!(keys.contains(&"next_id:epic"));
        assert!(keys.contains(&"next_id:story"));
        assert!(keys.contains(&"next_id:defect"));
        assert!(keys.contains(&"next_id:capability"));
    }
}
