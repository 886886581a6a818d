//! Entity validation rules, applied by the Store before any insert.

use crate::defect::Defect;
use crate::dependency::EpicDependency;
use crate::epic::Epic;
use crate::id::{self, EntityKind};
use crate::story::UserStory;
use crate::test::Test;

/// Error type for validation failures.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("title is required")]
    TitleRequired,

    #[error("title must be 500 characters or less (got {0})")]
    TitleTooLong(usize),

    #[error("malformed {kind} id: {id}")]
    MalformedId {
        kind: &'static str,
        id: String,
    },

    #[error("tracker reference is required")]
    TrackerRefRequired,

    #[error("test id must be <path>::<symbol> (got {0})")]
    MalformedTestId(String),

    #[error("dependency cannot point an epic at itself: {0}")]
    SelfDependency(String),

    #[error("orphan story cannot also carry a resolved parent")]
    OrphanWithParent,
}

fn check_title(title: &str) -> Result<(), ValidationError> {
    if title.is_empty() {
        return Err(ValidationError::TitleRequired);
    }
    if title.len() > 500 {
        return Err(ValidationError::TitleTooLong(title.len()));
    }
    Ok(())
}

fn check_id(kind: EntityKind, value: &str) -> Result<(), ValidationError> {
    if !id::is_valid_id(kind, value) {
        return Err(ValidationError::MalformedId {
            kind: kind.prefix(),
            id: value.to_owned(),
        });
    }
    Ok(())
}

/// Validates an Epic before insert.
pub fn validate_epic(epic: &Epic) -> Result<(), ValidationError> {
    check_id(EntityKind::Epic, &epic.id)?;
    check_title(&epic.title)?;
    if let Some(ref cap) = epic.capability_id {
        check_id(EntityKind::Capability, cap)?;
    }
    Ok(())
}

/// Validates a UserStory before insert.
pub fn validate_story(story: &UserStory) -> Result<(), ValidationError> {
    check_id(EntityKind::Story, &story.id)?;
    check_title(&story.title)?;
    if story.tracker_ref.is_empty() {
        return Err(ValidationError::TrackerRefRequired);
    }
    if let Some(ref epic) = story.epic_id {
        check_id(EntityKind::Epic, epic)?;
        if story.orphan_parent.is_some() {
            return Err(ValidationError::OrphanWithParent);
        }
    }
    if let Some(ref orphan) = story.orphan_parent {
        check_id(EntityKind::Epic, orphan)?;
    }
    Ok(())
}

/// Validates a Defect before insert.
pub fn validate_defect(defect: &Defect) -> Result<(), ValidationError> {
    check_id(EntityKind::Defect, &defect.id)?;
    check_title(&defect.title)?;
    if let Some(ref story) = defect.user_story_id {
        check_id(EntityKind::Story, story)?;
    }
    Ok(())
}

/// Validates a Test before insert.
pub fn validate_test(test: &Test) -> Result<(), ValidationError> {
    if test.file_path.is_empty()
        || test.symbol.is_empty()
        || !test.id.contains("::")
    {
        return Err(ValidationError::MalformedTestId(test.id.clone()));
    }
    for story in &test.story_ids {
        check_id(EntityKind::Story, story)?;
    }
    for epic in &test.epic_ids {
        check_id(EntityKind::Epic, epic)?;
    }
    for defect in &test.defect_ids {
        check_id(EntityKind::Defect, defect)?;
    }
    Ok(())
}

/// Validates a dependency edge before insert.
pub fn validate_dependency(dep: &EpicDependency) -> Result<(), ValidationError> {
    check_id(EntityKind::Epic, &dep.from_epic)?;
    check_id(EntityKind::Epic, &dep.to_epic)?;
    if dep.is_self_loop() {
        return Err(ValidationError::SelfDependency(dep.from_epic.clone()));
    }
    Ok(())
}
