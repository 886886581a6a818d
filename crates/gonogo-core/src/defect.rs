//! Defect -- a bug record, mirrored from the tracker or auto-created by the
//! Execution Collector on recurring failure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::{DefectSeverity, DefectStatus, FailureCategory};

fn is_false(b: &bool) -> bool {
    !b
}

/// A bug record. Resolution is authoritative from the tracker; the engine
/// never auto-closes a defect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Defect {
    /// Stable `DEF-NNNNN` ID.
    pub id: String,

    pub title: String,

    #[serde(default, skip_serializing_if = "DefectSeverity::is_default")]
    pub severity: DefectSeverity,

    #[serde(default, skip_serializing_if = "DefectStatus::is_default")]
    pub status: DefectStatus,

    /// Tracker reference, absent until mirroring completes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracker_ref: Option<String>,

    /// Parent story, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_story_id: Option<String>,

    /// Source test for auto-created defects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_id: Option<String>,

    /// Set for defects created by the Execution Collector.
    #[serde(default, skip_serializing_if = "is_false")]
    pub auto_created: bool,

    /// Failure category that triggered auto-creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_category: Option<FailureCategory>,

    /// Failure digest that triggered auto-creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_digest: Option<String>,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub archived: bool,
}

impl Defect {
    /// Creates a defect with the given ID and title.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            severity: DefectSeverity::Medium,
            status: DefectStatus::Open,
            tracker_ref: None,
            user_story_id: None,
            test_id: None,
            auto_created: false,
            failure_category: None,
            failure_digest: None,
            created_at: now,
            updated_at: now,
            resolved_at: None,
            archived: false,
        }
    }

    /// Returns `true` if the defect counts as open for rollups.
    pub fn is_open(&self) -> bool {
        self.status.is_open() && !self.archived
    }

    /// Age in whole weeks, used by the technical-debt score.
    pub fn age_weeks(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_weeks().max(0)
    }
}
