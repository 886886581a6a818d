//! The requirements matrix: one row per UserStory with linked tests,
//! defects, and the parent Epic's rollup.

use std::collections::HashMap;
use std::time::Instant;

use gonogo_core::enums::{StoryStatus, TestPriority};
use gonogo_core::epic::Epic;
use gonogo_core::story::UserStory;
use gonogo_core::test::Test;
use gonogo_store::traits::Storage;

use crate::Result;
use crate::viewmodel::{
    Completion, DefectSummary, EpicRollup, MatrixRow, MatrixView, TestSummary,
};

/// Optional matrix filters. Component and priority keep stories that have
/// at least one linked test matching.
#[derive(Debug, Clone, Default)]
pub struct MatrixFilter {
    pub epic: Option<String>,
    pub capability: Option<String>,
    pub component: Option<String>,
    pub status: Option<StoryStatus>,
    pub priority: Option<TestPriority>,
}

/// Groups live (non-orphaned) tests by associated story ID.
pub(crate) fn tests_by_story(tests: &[Test]) -> HashMap<String, Vec<usize>> {
    let mut map: HashMap<String, Vec<usize>> = HashMap::new();
    for (index, test) in tests.iter().enumerate() {
        if test.orphaned {
            continue;
        }
        for story in &test.story_ids {
            map.entry(story.clone()).or_default().push(index);
        }
    }
    map
}

/// Derived Epic linkage for a test: explicit annotations unioned with the
/// parents of its associated stories.
pub(crate) fn epics_of_test(test: &Test, stories: &HashMap<String, &UserStory>) -> Vec<String> {
    let mut epics = test.epic_ids.clone();
    for story_id in &test.story_ids {
        if let Some(story) = stories.get(story_id) {
            if let Some(ref epic) = story.epic_id {
                if !epics.contains(epic) {
                    epics.push(epic.clone());
                }
            }
        }
    }
    epics
}

/// Builds the matrix. `deadline` bounds the computation; on expiry the
/// rows built so far return flagged incomplete.
pub fn matrix_rows(
    store: &dyn Storage,
    filter: &MatrixFilter,
    deadline: Option<Instant>,
) -> Result<MatrixView> {
    let stories = store.list_stories()?;
    let epics: HashMap<String, Epic> = store
        .list_epics()?
        .into_iter()
        .map(|e| (e.id.clone(), e))
        .collect();
    let tests = store.list_tests()?;
    let defects = store.list_defects()?;

    let by_story = tests_by_story(&tests);
    let mut defects_by_story: HashMap<&str, Vec<&gonogo_core::defect::Defect>> = HashMap::new();
    for defect in &defects {
        if let Some(ref story) = defect.user_story_id {
            defects_by_story.entry(story).or_default().push(defect);
        }
    }

    let mut view = MatrixView::default();
    for story in &stories {
        if let Some(deadline) = deadline {
            if Instant::now() > deadline {
                view.incomplete = true;
                break;
            }
        }

        if let Some(ref want) = filter.status {
            if story.status != *want {
                continue;
            }
        }
        if let Some(ref want) = filter.epic {
            if story.epic_id.as_deref() != Some(want.as_str()) {
                continue;
            }
        }
        if let Some(ref want) = filter.capability {
            let capability = story
                .epic_id
                .as_ref()
                .and_then(|id| epics.get(id))
                .and_then(|e| e.capability_id.as_deref());
            if capability != Some(want.as_str()) {
                continue;
            }
        }

        let linked: Vec<&Test> = by_story
            .get(&story.id)
            .map(|indices| indices.iter().map(|&i| &tests[i]).collect())
            .unwrap_or_default();

        if let Some(ref tag) = filter.component {
            if !linked.iter().any(|t| t.component_tags.contains(tag)) {
                continue;
            }
        }
        if let Some(priority) = filter.priority {
            if !linked.iter().any(|t| t.priority == priority) {
                continue;
            }
        }

        let mut test_summaries: Vec<TestSummary> = linked
            .iter()
            .map(|t| TestSummary {
                test_id: t.id.clone(),
                priority: t.priority,
                last_status: t.last_execution.as_ref().map(|l| l.status),
                last_duration_ms: t.last_execution.as_ref().map(|l| l.duration_ms),
            })
            .collect();
        test_summaries.sort_by(|a, b| a.test_id.cmp(&b.test_id));

        let mut defect_summaries: Vec<DefectSummary> = defects_by_story
            .get(story.id.as_str())
            .map(|list| {
                list.iter()
                    .map(|d| DefectSummary {
                        defect_id: d.id.clone(),
                        severity: d.severity,
                        status: d.status,
                    })
                    .collect()
            })
            .unwrap_or_default();
        defect_summaries.sort_by(|a, b| a.defect_id.cmp(&b.defect_id));

        view.rows.push(MatrixRow {
            user_story_id: story.id.clone(),
            title: story.title.clone(),
            status: story.status,
            story_points: story.story_points,
            epic_id: story.epic_id.clone(),
            coverage_flag: test_summaries.is_empty(),
            tests: test_summaries,
            defects: defect_summaries,
        });
    }

    Ok(view)
}

/// Computes one Epic's rollup from Store rows.
pub fn epic_rollup(store: &dyn Storage, epic_id: &str) -> Result<EpicRollup> {
    let epic = store.get_epic(epic_id)?;
    let stories: Vec<UserStory> = store
        .list_stories()?
        .into_iter()
        .filter(|s| s.epic_id.as_deref() == Some(epic_id))
        .collect();
    let defects = store.list_defects()?;

    let story_ids: Vec<&str> = stories.iter().map(|s| s.id.as_str()).collect();
    let mut completion = Completion {
        numerator: 0,
        denominator: 0,
    };
    let mut last_updated_at = epic.updated_at;
    for story in &stories {
        completion.denominator += story.story_points as u64;
        if story.status.is_done() {
            completion.numerator += story.story_points as u64;
        }
        if story.updated_at > last_updated_at {
            last_updated_at = story.updated_at;
        }
    }

    let mut defect_count_by_severity = HashMap::new();
    for defect in &defects {
        let linked = defect
            .user_story_id
            .as_deref()
            .is_some_and(|s| story_ids.contains(&s));
        if linked && defect.is_open() {
            *defect_count_by_severity.entry(defect.severity).or_insert(0u64) += 1;
            if defect.updated_at > last_updated_at {
                last_updated_at = defect.updated_at;
            }
        }
    }

    Ok(EpicRollup {
        epic_id: epic.id,
        title: epic.title,
        status: epic.status,
        completion,
        story_count: stories.len() as u64,
        defect_count_by_severity,
        last_updated_at,
    })
}
