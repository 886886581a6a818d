//! UserStory -- a unit of delivery mirrored from the external tracker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::StoryStatus;

/// A unit of delivery. Created when a matching tracker item is first seen;
/// mirrored state is refreshed on every sync. Never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserStory {
    /// Stable `US-NNNNN` ID.
    pub id: String,

    pub title: String,

    /// Non-negative story points from the tracker's `points:N` label.
    #[serde(default)]
    pub story_points: u32,

    #[serde(default, skip_serializing_if = "StoryStatus::is_default")]
    pub status: StoryStatus,

    /// Authoritative tracker reference.
    pub tracker_ref: String,

    /// Parent Epic, once resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epic_id: Option<String>,

    /// The claimed parent Epic when it has not been ingested yet.
    /// `Some` here is the orphan flag; cleared on re-resolution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orphan_parent: Option<String>,

    /// Velocity attribution (mirrored tracker assignee).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub assignee: String,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,

    /// Set when status first transitions to done; feeds velocity windows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done_at: Option<DateTime<Utc>>,
}

impl UserStory {
    /// Creates a story with the given ID, title, and tracker reference.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        tracker_ref: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            story_points: 0,
            status: StoryStatus::Planned,
            tracker_ref: tracker_ref.into(),
            epic_id: None,
            orphan_parent: None,
            assignee: String::new(),
            created_at: now,
            updated_at: now,
            done_at: None,
        }
    }

    /// Returns `true` if the parent Epic has not been ingested yet.
    pub fn is_orphan(&self) -> bool {
        self.orphan_parent.is_some()
    }
}
