//! Persona dashboards: PM, PO, and QA aggregates.
//!
//! Every field is a pure function of Store rows and the configuration
//! record (weights, rolling window, severity map).

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use gonogo_config::EngineConfig;
use gonogo_core::defect::Defect;
use gonogo_core::enums::{DependencyKind, EpicStatus};
use gonogo_core::epic::Epic;
use gonogo_core::story::UserStory;
use gonogo_store::traits::Storage;

use crate::Result;
use crate::matrix::{epics_of_test, tests_by_story};
use crate::viewmodel::{
    Completion, Coverage, EpicQa, EpicRoi, EpicSchedule, MemberVelocity, PassRate, PmView, PoView,
    QaView, RiskEntry, TrendPoint,
};

/// Open-defect density above which an Epic lands on the PM risk list.
const RISK_DENSITY_THRESHOLD: f64 = 0.25;

fn completion_of(stories: &[&UserStory]) -> Completion {
    let mut completion = Completion {
        numerator: 0,
        denominator: 0,
    };
    for story in stories {
        completion.denominator += story.story_points as u64;
        if story.status.is_done() {
            completion.numerator += story.story_points as u64;
        }
    }
    completion
}

fn stories_by_epic(stories: &[UserStory]) -> HashMap<&str, Vec<&UserStory>> {
    let mut map: HashMap<&str, Vec<&UserStory>> = HashMap::new();
    for story in stories {
        if let Some(ref epic) = story.epic_id {
            map.entry(epic.as_str()).or_default().push(story);
        }
    }
    map
}

fn open_defects_by_epic<'a>(
    defects: &'a [Defect],
    stories: &HashMap<String, &'a UserStory>,
) -> HashMap<&'a str, Vec<&'a Defect>> {
    let mut map: HashMap<&str, Vec<&Defect>> = HashMap::new();
    for defect in defects {
        if !defect.is_open() {
            continue;
        }
        let epic = defect
            .user_story_id
            .as_ref()
            .and_then(|s| stories.get(s))
            .and_then(|s| s.epic_id.as_deref());
        if let Some(epic) = epic {
            map.entry(epic).or_default().push(defect);
        }
    }
    map
}

// ---------------------------------------------------------------------------
// PM view
// ---------------------------------------------------------------------------

/// Schedule variance, per-member velocity, and the risk list.
pub fn pm_view(
    store: &dyn Storage,
    config: &EngineConfig,
    deadline: Option<Instant>,
) -> Result<PmView> {
    let now = Utc::now();
    let epics: Vec<Epic> = store.list_epics()?.into_iter().filter(|e| !e.archived).collect();
    let stories = store.list_stories()?;
    let defects = store.list_defects()?;
    let blocks = store.list_dependencies(Some(&[DependencyKind::Blocks]))?;

    let by_epic = stories_by_epic(&stories);
    let story_index: HashMap<String, &UserStory> =
        stories.iter().map(|s| (s.id.clone(), s)).collect();
    let open_defects = open_defects_by_epic(&defects, &story_index);
    let epic_index: HashMap<&str, &Epic> = epics.iter().map(|e| (e.id.as_str(), e)).collect();

    // Reverse adjacency for transitive blockers.
    let mut blockers_of: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in &blocks {
        blockers_of
            .entry(edge.to_epic.as_str())
            .or_default()
            .push(edge.from_epic.as_str());
    }

    let mut view = PmView::default();
    for epic in &epics {
        if deadline.is_some_and(|d| Instant::now() > d) {
            view.incomplete = true;
            break;
        }

        let epic_stories = by_epic.get(epic.id.as_str()).cloned().unwrap_or_default();
        let completion = completion_of(&epic_stories);

        let schedule_variance_days = epic.planned_end_at.map(|planned| {
            if epic.status == EpicStatus::Done {
                let actual = epic_stories
                    .iter()
                    .filter_map(|s| s.done_at)
                    .max()
                    .unwrap_or(epic.updated_at);
                (actual - planned).num_days()
            } else {
                // Late-so-far for an unfinished Epic; 0 before the plan date.
                (now - planned).num_days().max(0)
            }
        });

        view.epics.push(EpicSchedule {
            epic_id: epic.id.clone(),
            title: epic.title.clone(),
            status: epic.status,
            completion,
            planned_end_at: epic.planned_end_at,
            schedule_variance_days,
        });

        // Risks: overdue transitive blockers, or defect density rising
        // past the threshold.
        if epic.status != EpicStatus::Done && epic.status != EpicStatus::Cancelled {
            for blocker in transitive_blockers(&blockers_of, &epic.id) {
                if let Some(blocker_epic) = epic_index.get(blocker) {
                    let overdue = blocker_epic.status != EpicStatus::Done
                        && blocker_epic
                            .planned_end_at
                            .is_some_and(|planned| planned < now);
                    if overdue {
                        view.risks.push(RiskEntry {
                            epic_id: epic.id.clone(),
                            reason: format!("blocked by overdue epic {blocker}"),
                        });
                    }
                }
            }
            let density = density_of(
                open_defects.get(epic.id.as_str()).map_or(0, |d| d.len()),
                completion.denominator,
            );
            if density > RISK_DENSITY_THRESHOLD {
                view.risks.push(RiskEntry {
                    epic_id: epic.id.clone(),
                    reason: format!("defect density {density:.2} exceeds {RISK_DENSITY_THRESHOLD}"),
                });
            }
        }
    }

    view.velocity = member_velocity(&stories, config.report.rolling_window_weeks, now);
    debug!(epics = view.epics.len(), risks = view.risks.len(), "pm view computed");
    Ok(view)
}

fn transitive_blockers<'a>(
    blockers_of: &HashMap<&'a str, Vec<&'a str>>,
    epic_id: &str,
) -> Vec<&'a str> {
    let mut visited: HashSet<&str> = HashSet::new();
    let mut queue: Vec<&str> = blockers_of
        .get(epic_id)
        .map(Vec::clone)
        .unwrap_or_default();
    let mut result = Vec::new();
    while let Some(node) = queue.pop() {
        if !visited.insert(node) {
            continue;
        }
        result.push(node);
        if let Some(more) = blockers_of.get(node) {
            queue.extend(more.iter().copied());
        }
    }
    result.sort();
    result
}

/// Story points per week per assignee over the rolling window. Stories
/// without an assignee aggregate under `(unassigned)`.
fn member_velocity(
    stories: &[UserStory],
    window_weeks: u32,
    now: DateTime<Utc>,
) -> Vec<MemberVelocity> {
    let window_start = now - Duration::weeks(window_weeks.max(1) as i64);
    let mut points: HashMap<&str, u64> = HashMap::new();
    for story in stories {
        let done_in_window = story
            .done_at
            .is_some_and(|done| done >= window_start && done <= now);
        if done_in_window {
            let assignee = if story.assignee.is_empty() {
                "(unassigned)"
            } else {
                story.assignee.as_str()
            };
            *points.entry(assignee).or_insert(0) += story.story_points as u64;
        }
    }

    let mut velocity: Vec<MemberVelocity> = points
        .into_iter()
        .map(|(assignee, pts)| MemberVelocity {
            assignee: assignee.to_string(),
            points_per_week: pts as f64 / window_weeks.max(1) as f64,
        })
        .collect();
    velocity.sort_by(|a, b| a.assignee.cmp(&b.assignee));
    velocity
}

// ---------------------------------------------------------------------------
// PO view
// ---------------------------------------------------------------------------

/// ROI, adoption, and the completion trend.
pub fn po_view(
    store: &dyn Storage,
    config: &EngineConfig,
    deadline: Option<Instant>,
) -> Result<PoView> {
    let now = Utc::now();
    let epics: Vec<Epic> = store.list_epics()?.into_iter().filter(|e| !e.archived).collect();
    let stories = store.list_stories()?;
    let by_epic = stories_by_epic(&stories);

    let mut view = PoView::default();
    for epic in &epics {
        if deadline.is_some_and(|d| Instant::now() > d) {
            view.incomplete = true;
            break;
        }
        let epic_stories = by_epic.get(epic.id.as_str()).cloned().unwrap_or_default();
        view.epics.push(EpicRoi {
            epic_id: epic.id.clone(),
            title: epic.title.clone(),
            completion: completion_of(&epic_stories),
            roi: epic.roi(),
            adoption_metric: epic.adoption_metric,
        });
    }

    // Points delivered per week, oldest week first.
    let weeks = config.report.rolling_window_weeks.max(1) as i64;
    for offset in (0..weeks).rev() {
        let week_start = now - Duration::weeks(offset + 1);
        let week_end = now - Duration::weeks(offset);
        let points_done: u64 = stories
            .iter()
            .filter(|s| {
                s.done_at
                    .is_some_and(|done| done >= week_start && done < week_end)
            })
            .map(|s| s.story_points as u64)
            .sum();
        view.completion_trend.push(TrendPoint {
            week_start,
            points_done,
        });
    }

    Ok(view)
}

// ---------------------------------------------------------------------------
// QA view
// ---------------------------------------------------------------------------

/// Coverage, last-run pass rate, defect density, and technical debt.
pub fn qa_view(
    store: &dyn Storage,
    config: &EngineConfig,
    deadline: Option<Instant>,
) -> Result<QaView> {
    let now = Utc::now();
    let epics: Vec<Epic> = store.list_epics()?.into_iter().filter(|e| !e.archived).collect();
    let stories = store.list_stories()?;
    let defects = store.list_defects()?;
    let tests = store.list_tests()?;

    let by_epic = stories_by_epic(&stories);
    let story_index: HashMap<String, &UserStory> =
        stories.iter().map(|s| (s.id.clone(), s)).collect();
    let covered_story_ids: HashSet<String> = tests_by_story(&tests).into_keys().collect();
    let open_defects = open_defects_by_epic(&defects, &story_index);

    // Tests linked to each epic, via annotation or story parent.
    let mut tests_of_epic: HashMap<String, Vec<usize>> = HashMap::new();
    for (index, test) in tests.iter().enumerate() {
        if test.orphaned {
            continue;
        }
        for epic in epics_of_test(test, &story_index) {
            tests_of_epic.entry(epic).or_default().push(index);
        }
    }

    let mut view = QaView::default();
    for epic in &epics {
        if deadline.is_some_and(|d| Instant::now() > d) {
            view.incomplete = true;
            break;
        }

        let epic_stories = by_epic.get(epic.id.as_str()).cloned().unwrap_or_default();
        let covered = epic_stories
            .iter()
            .filter(|s| covered_story_ids.contains(&s.id))
            .count() as u64;

        let mut pass_rate = PassRate::default();
        for &index in tests_of_epic.get(epic.id.as_str()).map(Vec::as_slice).unwrap_or(&[]) {
            if let Some(ref last) = tests[index].last_execution {
                pass_rate.add(last.status);
            }
        }

        let epic_open = open_defects.get(epic.id.as_str()).cloned().unwrap_or_default();
        let total_points: u64 = epic_stories.iter().map(|s| s.story_points as u64).sum();
        let defect_density = density_of(epic_open.len(), total_points);

        // Debt: severity weight x (1 + age in weeks), so a fresh critical
        // defect already outweighs an old low one.
        let tech_debt_score: f64 = epic_open
            .iter()
            .map(|d| config.debt_weight(d.severity) * (1 + d.age_weeks(now)) as f64)
            .sum();

        view.epics.push(EpicQa {
            epic_id: epic.id.clone(),
            title: epic.title.clone(),
            coverage: Coverage {
                covered_stories: covered,
                total_stories: epic_stories.len() as u64,
            },
            pass_rate,
            defect_density,
            tech_debt_score,
        });
    }

    view.uncovered_stories = stories
        .iter()
        .filter(|s| !covered_story_ids.contains(&s.id))
        .map(|s| s.id.clone())
        .collect();
    view.uncovered_stories.sort();

    Ok(view)
}

fn density_of(open_defects: usize, total_points: u64) -> f64 {
    if total_points == 0 {
        0.0
    } else {
        open_defects as f64 / total_points as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    use gonogo_core::dependency::EpicDependency;
    use gonogo_core::enums::{DefectSeverity, ExecutionStatus, StoryStatus};
    use gonogo_core::epic::EpicBuilder;
    use gonogo_core::test::{ExecutionRecord, TestBuilder};
    use gonogo_store::SqliteStore;
    use gonogo_store::traits::{StoryUpdates, Transaction};

    fn seeded_store() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .run_in_transaction(&|tx: &dyn Transaction| {
                tx.create_epic(
                    &EpicBuilder::new("EP-00001", "Checkout")
                        .roi(600_00, 300_00)
                        .adoption_metric(0.4)
                        .planned_end_at(Utc::now() - Duration::days(10))
                        .build(),
                    "admin",
                )?;
                tx.create_epic(&EpicBuilder::new("EP-00002", "Search").build(), "admin")?;
                tx.add_dependency(&EpicDependency::blocks("EP-00001", "EP-00002"), "admin")?;

                let mut s1 = UserStory::new("US-00001", "Cart", "US-00001");
                s1.epic_id = Some("EP-00001".into());
                s1.story_points = 5;
                s1.assignee = "alice".into();
                tx.create_story(&s1, "sync")?;

                let mut s2 = UserStory::new("US-00002", "Pay", "US-00002");
                s2.epic_id = Some("EP-00001".into());
                s2.story_points = 3;
                tx.create_story(&s2, "sync")?;

                let test = TestBuilder::new("tests/test_cart.py", "test_cart")
                    .story_ids(vec!["US-00001".into()])
                    .build();
                tx.create_test(&test)?;
                tx.record_execution(&ExecutionRecord {
                    test_id: test.id.clone(),
                    status: ExecutionStatus::Failed,
                    duration_ms: 12,
                    recorded_at: Utc::now(),
                    failure_category: None,
                    failure_digest: None,
                })?;

                let mut defect = Defect::new("DEF-00001", "Cart total wrong");
                defect.user_story_id = Some("US-00001".into());
                defect.severity = DefectSeverity::Critical;
                tx.create_defect(&defect, "sync")?;
                Ok(())
            })
            .unwrap();
        // Mark one story done for velocity/trend.
        store
            .update_story(
                "US-00001",
                &StoryUpdates {
                    status: Some(StoryStatus::Done),
                    ..Default::default()
                },
                "sync",
            )
            .unwrap();
        store
    }

    #[test]
    fn pm_view_schedule_and_risks() {
        let store = seeded_store();
        let config = EngineConfig::default();
        let view = pm_view(&store, &config, None).unwrap();

        let checkout = view.epics.iter().find(|e| e.epic_id == "EP-00001").unwrap();
        // Plan date was 10 days ago and the epic is not done.
        assert_eq!(checkout.schedule_variance_days, Some(10));
        assert_eq!(
            checkout.completion,
            Completion {
                numerator: 5,
                denominator: 8
            }
        );

        // Search is blocked by the overdue Checkout epic.
        assert!(
            view.risks
                .iter()
                .any(|r| r.epic_id == "EP-00002" && r.reason.contains("EP-00001"))
        );
    }

    #[test]
    fn pm_velocity_buckets_by_assignee() {
        let store = seeded_store();
        let config = EngineConfig::default();
        let view = pm_view(&store, &config, None).unwrap();

        let alice = view
            .velocity
            .iter()
            .find(|v| v.assignee == "alice")
            .unwrap();
        assert_eq!(alice.points_per_week, 5.0 / 4.0);
    }

    #[test]
    fn po_view_roi_and_trend() {
        let store = seeded_store();
        let config = EngineConfig::default();
        let view = po_view(&store, &config, None).unwrap();

        let checkout = view.epics.iter().find(|e| e.epic_id == "EP-00001").unwrap();
        assert_eq!(checkout.roi, Some(2.0));
        assert_eq!(checkout.adoption_metric, Some(0.4));

        assert_eq!(view.completion_trend.len(), 4);
        // The story finished moments ago: the newest bucket holds it.
        assert_eq!(view.completion_trend.last().unwrap().points_done, 5);
    }

    #[test]
    fn qa_view_coverage_density_debt() {
        let store = seeded_store();
        let config = EngineConfig::default();
        let view = qa_view(&store, &config, None).unwrap();

        let checkout = view.epics.iter().find(|e| e.epic_id == "EP-00001").unwrap();
        assert_eq!(
            checkout.coverage,
            Coverage {
                covered_stories: 1,
                total_stories: 2
            }
        );
        assert_eq!(checkout.pass_rate.failed, 1);
        assert_eq!(checkout.pass_rate.rate(), Some(0.0));
        // One open critical defect over 8 points.
        assert_eq!(checkout.defect_density, 1.0 / 8.0);
        // Fresh critical defect: weight 8 x (1 + 0 weeks).
        assert_eq!(checkout.tech_debt_score, 8.0);

        assert_eq!(view.uncovered_stories, vec!["US-00002"]);
    }

    #[test]
    fn deadline_marks_views_incomplete() {
        let store = seeded_store();
        let config = EngineConfig::default();
        let past = Instant::now() - std::time::Duration::from_millis(1);
        assert!(pm_view(&store, &config, Some(past)).unwrap().incomplete);
        assert!(po_view(&store, &config, Some(past)).unwrap().incomplete);
        assert!(qa_view(&store, &config, Some(past)).unwrap().incomplete);
    }
}
