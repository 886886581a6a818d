//! Execution-outcome recording with the monotonicity invariant, recent
//! history lookup, and retention (prune-and-summarize).

use rusqlite::{Connection, OptionalExtension, Row, params};

use gonogo_core::enums::{ExecutionStatus, FailureCategory};
use gonogo_core::test::ExecutionRecord;

use crate::error::{Result, StoreError};
use crate::sqlite::{format_datetime, parse_datetime};

pub(crate) fn scan_execution(row: &Row<'_>) -> rusqlite::Result<ExecutionRecord> {
    let status_str: String = row.get("status")?;
    Ok(ExecutionRecord {
        test_id: row.get("test_id")?,
        status: ExecutionStatus::parse(&status_str).unwrap_or_default(),
        duration_ms: row.get("duration_ms")?,
        recorded_at: parse_datetime(&row.get::<_, String>("recorded_at")?),
        failure_category: row
            .get::<_, Option<String>>("failure_category")?
            .as_deref()
            .and_then(FailureCategory::parse),
        failure_digest: row.get("failure_digest")?,
    })
}

/// Records one outcome and advances the test's `last_execution` fields.
///
/// Returns `false` without writing when the outcome's timestamp does not
/// advance past the stored one (execution monotonicity): out-of-order
/// reports from parallel workers collapse deterministically to the
/// most-recent-by-timestamp.
pub(crate) fn record_execution_on_conn(
    conn: &Connection,
    exec: &ExecutionRecord,
) -> Result<bool> {
    let stored: Option<Option<String>> = conn
        .query_row(
            "SELECT last_recorded_at FROM tests WHERE id = ?1",
            params![exec.test_id],
            |row| row.get(0),
        )
        .optional()?;

    let stored = match stored {
        Some(s) => s,
        None => return Err(StoreError::not_found("test", &exec.test_id)),
    };

    if let Some(ref stored_ts) = stored {
        if parse_datetime(stored_ts) >= exec.recorded_at {
            return Ok(false);
        }
    }

    conn.execute(
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

    conn.execute(
        "UPDATE tests SET
            last_status = ?2, last_duration_ms = ?3, last_recorded_at = ?4,
            last_failure_category = ?5, last_failure_digest = ?6, updated_at = ?4
         WHERE id = ?1",
        params![
            exec.test_id,
            exec.status.as_str(),
            exec.duration_ms,
            format_datetime(&exec.recorded_at),
            exec.failure_category.map(|c| c.as_str()),
            exec.failure_digest,
        ],
    )?;

    Ok(true)
}

/// The most recent `limit` outcomes for a test, newest first.
pub(crate) fn list_recent_executions_on_conn(
    conn: &Connection,
    test_id: &str,
    limit: u32,
) -> Result<Vec<ExecutionRecord>> {
    let mut stmt = conn.prepare(
        "SELECT test_id, status, duration_ms, recorded_at, failure_category, failure_digest
         FROM test_executions
         WHERE test_id = ?1
         ORDER BY recorded_at DESC
         LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![test_id, limit], scan_execution)?;
    let mut execs = Vec::new();
    for row in rows {
        execs.push(row?);
    }
    Ok(execs)
}

/// Prunes executions beyond the most recent `retain` per test, folding
/// them into the test's summary counters. Returns total rows pruned.
pub(crate) fn prune_executions_on_conn(conn: &Connection, retain: u32) -> Result<u64> {
    let over_retention: Vec<String> = {
        let mut stmt = conn.prepare(
            "SELECT test_id FROM test_executions
             GROUP BY test_id HAVING COUNT(*) > ?1",
        )?;
        let rows = stmt.query_map(params![retain], |row| row.get::<_, String>(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        ids
    };

    let mut total_pruned: u64 = 0;
    for test_id in over_retention {
        // Rows beyond the newest `retain`, oldest last.
        let stale: Vec<(i64, String)> = {
            let mut stmt = conn.prepare(
                "SELECT id, status FROM test_executions
                 WHERE test_id = ?1
                 ORDER BY recorded_at DESC
                 LIMIT -1 OFFSET ?2",
            )?;
            let rows = stmt.query_map(params![test_id, retain], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?;
            let mut stale = Vec::new();
            for row in rows {
                stale.push(row?);
            }
            stale
        };

        let pruned = stale.len() as i64;
        let passed = stale
            .iter()
            .filter(|(_, status)| status == ExecutionStatus::Passed.as_str())
            .count() as i64;

        for (row_id, _) in &stale {
            conn.execute("DELETE FROM test_executions WHERE id = ?1", params![row_id])?;
        }

        conn.execute(
            "UPDATE tests SET
                summarized_runs = summarized_runs + ?2,
                summarized_passed = summarized_passed + ?3
             WHERE id = ?1",
            params![test_id, pruned, passed],
        )?;

        total_pruned += pruned as u64;
    }

    Ok(total_pruned)
}
