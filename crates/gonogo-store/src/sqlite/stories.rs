//! UserStory CRUD operations and orphan re-resolution.

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};

use gonogo_core::enums::{EventType, StoryStatus};
use gonogo_core::story::UserStory;
use gonogo_core::validation::validate_story;

use crate::error::{Result, StoreError};
use crate::sqlite::{emit_event, format_datetime, parse_datetime};
use crate::traits::StoryUpdates;

pub(crate) const STORY_COLUMNS: &str = "\
    id, title, story_points, status, tracker_ref, epic_id, orphan_parent, \
    assignee, created_at, updated_at, done_at";

pub(crate) fn scan_story(row: &Row<'_>) -> rusqlite::Result<UserStory> {
    let status_str: String = row.get("status")?;
    Ok(UserStory {
        id: row.get("id")?,
        title: row.get("title")?,
        story_points: row.get::<_, i64>("story_points")?.max(0) as u32,
        status: StoryStatus::parse(&status_str).unwrap_or_default(),
        tracker_ref: row.get("tracker_ref")?,
        epic_id: row.get("epic_id")?,
        orphan_parent: row.get("orphan_parent")?,
        assignee: row.get("assignee")?,
        created_at: parse_datetime(&row.get::<_, String>("created_at")?),
        updated_at: parse_datetime(&row.get::<_, String>("updated_at")?),
        done_at: row
            .get::<_, Option<String>>("done_at")?
            .as_deref()
            .map(parse_datetime),
    })
}

pub(crate) fn insert_story_on_conn(
    conn: &Connection,
    story: &UserStory,
    actor: &str,
) -> Result<()> {
    validate_story(story)?;

    conn.execute(
        &format!(
            "INSERT INTO user_stories ({STORY_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
        ),
        params![
            story.id,
            story.title,
            story.story_points,
            story.status.as_str(),
            story.tracker_ref,
            story.epic_id,
            story.orphan_parent,
            story.assignee,
            format_datetime(&story.created_at),
            format_datetime(&story.updated_at),
            story.done_at.as_ref().map(format_datetime),
        ],
    )?;

    // Tests annotated against this story before it existed are covered now.
    conn.execute(
        "UPDATE tests SET uncovered = 0
         WHERE uncovered = 1
           AND id IN (SELECT test_id FROM test_stories WHERE story_id = ?1)",
        params![story.id],
    )?;

    emit_event(conn, &story.id, EventType::Created, actor, None, None, None)?;
    Ok(())
}

pub(crate) fn get_story_on_conn(conn: &Connection, id: &str) -> Result<UserStory> {
    let sql = format!("SELECT {STORY_COLUMNS} FROM user_stories WHERE id = ?1");
    conn.query_row(&sql, params![id], scan_story)
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::not_found("user story", id),
            other => StoreError::Query(other),
        })
}

pub(crate) fn story_exists_on_conn(conn: &Connection, id: &str) -> Result<bool> {
    let count: i32 = conn.query_row(
        "SELECT COUNT(*) FROM user_stories WHERE id = ?1",
        params![id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub(crate) fn find_story_by_tracker_ref_on_conn(
    conn: &Connection,
    tracker_ref: &str,
) -> Result<Option<UserStory>> {
    let sql = format!("SELECT {STORY_COLUMNS} FROM user_stories WHERE tracker_ref = ?1");
    let story = conn
        .query_row(&sql, params![tracker_ref], scan_story)
        .optional()?;
    Ok(story)
}

pub(crate) fn list_stories_on_conn(conn: &Connection) -> Result<Vec<UserStory>> {
    let sql = format!("SELECT {STORY_COLUMNS} FROM user_stories ORDER BY id");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], scan_story)?;
    let mut stories = Vec::new();
    for row in rows {
        stories.push(row?);
    }
    Ok(stories)
}

/// Applies partial updates. A transition into `done` stamps `done_at` once;
/// the stamp is never cleared (velocity history survives reopening).
pub(crate) fn update_story_on_conn(
    conn: &Connection,
    id: &str,
    updates: &StoryUpdates,
    actor: &str,
) -> Result<()> {
    let current = get_story_on_conn(conn, id)?;
    let mut next = current.clone();

    if let Some(ref title) = updates.title {
        next.title = title.clone();
    }
    if let Some(points) = updates.story_points {
        next.story_points = points;
    }
    if let Some(status) = updates.status {
        next.status = status;
        if status.is_done() && next.done_at.is_none() {
            next.done_at = Some(Utc::now());
        }
    }
    if let Some(ref epic) = updates.epic_id {
        next.epic_id = epic.clone();
    }
    if let Some(ref orphan) = updates.orphan_parent {
        next.orphan_parent = orphan.clone();
    }
    if let Some(ref assignee) = updates.assignee {
        next.assignee = assignee.clone();
    }
    next.updated_at = Utc::now();
    validate_story(&next)?;

    conn.execute(
        "UPDATE user_stories SET
            title = ?2, story_points = ?3, status = ?4, epic_id = ?5,
            orphan_parent = ?6, assignee = ?7, updated_at = ?8, done_at = ?9
         WHERE id = ?1",
        params![
            id,
            next.title,
            next.story_points,
            next.status.as_str(),
            next.epic_id,
            next.orphan_parent,
            next.assignee,
            format_datetime(&next.updated_at),
            next.done_at.as_ref().map(format_datetime),
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

/// Re-resolves orphan stories claiming `epic_id` as parent, and clears the
/// uncovered flag of tests that reach the Epic through them or directly.
/// Returns the number of stories re-resolved.
pub(crate) fn reresolve_orphans_on_conn(
    conn: &Connection,
    epic_id: &str,
    actor: &str,
) -> Result<usize> {
    let orphan_ids: Vec<String> = {
        let mut stmt =
            conn.prepare("SELECT id FROM user_stories WHERE orphan_parent = ?1")?;
        let rows = stmt.query_map(params![epic_id], |row| row.get::<_, String>(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        ids
    };

    let now_str = format_datetime(&Utc::now());
    for story_id in &orphan_ids {
        conn.execute(
            "UPDATE user_stories
             SET epic_id = ?2, orphan_parent = NULL, updated_at = ?3
             WHERE id = ?1",
            params![story_id, epic_id, now_str],
        )?;
        emit_event(
            conn,
            story_id,
            EventType::Updated,
            actor,
            None,
            Some(epic_id),
            Some("orphan re-resolved"),
        )?;
    }

    conn.execute(
        "UPDATE tests SET uncovered = 0
         WHERE uncovered = 1
           AND id IN (
               SELECT test_id FROM test_epics WHERE epic_id = ?1
               UNION
               SELECT ts.test_id FROM test_stories ts
               INNER JOIN user_stories us ON us.id = ts.story_id
               WHERE us.epic_id = ?1
           )",
        params![epic_id],
    )?;

    Ok(orphan_ids.len())
}
