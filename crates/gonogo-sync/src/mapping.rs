//! Pure mapping functions from tracker items to store fields.

use gonogo_core::enums::{DefectSeverity, DefectStatus, EpicStatus, StoryStatus};
use gonogo_core::id::{EntityKind, parse_id};

/// Which entity a tracker reference routes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappedKind {
    Story,
    Defect,
    Epic,
    Unknown,
}

/// Routes an external ID by its prefix.
pub fn classify_ref(external_id: &str) -> MappedKind {
    match parse_id(external_id) {
        Some((EntityKind::Story, _)) => MappedKind::Story,
        Some((EntityKind::Defect, _)) => MappedKind::Defect,
        Some((EntityKind::Epic, _)) => MappedKind::Epic,
        _ => MappedKind::Unknown,
    }
}

/// Extracts story points from a `points:N` label.
pub fn extract_points(labels: &[String]) -> Option<u32> {
    labels
        .iter()
        .find_map(|l| l.strip_prefix("points:"))
        .and_then(|v| v.trim().parse().ok())
}

/// Extracts a capability link from a `capability:CAP-NNNNN` label.
pub fn extract_capability(labels: &[String]) -> Option<String> {
    labels
        .iter()
        .find_map(|l| l.strip_prefix("capability:"))
        .map(|v| v.trim().to_string())
        .filter(|v| gonogo_core::id::is_valid_id(EntityKind::Capability, v))
}

/// Extracts a severity override from a `severity:<level>` label.
pub fn extract_severity(labels: &[String]) -> Option<DefectSeverity> {
    labels
        .iter()
        .find_map(|l| l.strip_prefix("severity:"))
        .and_then(|v| DefectSeverity::parse(v.trim()))
}

/// Extracts the parent reference from a recognized `Parent: <ID>` body
/// line. Stories expect an `EP-` parent; Defects a `US-` parent.
pub fn extract_parent(body: &str) -> Option<String> {
    body.lines().find_map(|line| {
        line.trim()
            .strip_prefix("Parent:")
            .map(|v| v.trim().to_string())
            .filter(|v| parse_id(v).is_some())
    })
}

/// Maps a story status into the Epic lattice. `blocked` has no Epic
/// counterpart and yields `None`.
pub fn story_status_to_epic(status: StoryStatus) -> Option<EpicStatus> {
    match status {
        StoryStatus::Planned => Some(EpicStatus::Planned),
        StoryStatus::InProgress => Some(EpicStatus::InProgress),
        StoryStatus::InReview => Some(EpicStatus::InReview),
        StoryStatus::Done => Some(EpicStatus::Done),
        StoryStatus::Cancelled => Some(EpicStatus::Cancelled),
        StoryStatus::Blocked => None,
    }
}

/// Fixed label table for Defect statuses. Unknown labels leave status
/// unchanged (the caller reports them).
pub fn map_defect_status(label: &str) -> Option<DefectStatus> {
    match label.to_lowercase().as_str() {
        "open" | "new" | "backlog" => Some(DefectStatus::Open),
        "triaged" | "accepted" => Some(DefectStatus::Triaged),
        "in progress" | "in_progress" => Some(DefectStatus::InProgress),
        "resolved" | "done" | "closed" | "fixed" => Some(DefectStatus::Resolved),
        "wontfix" | "won't fix" | "rejected" => Some(DefectStatus::Wontfix),
        _ => None,
    }
}
