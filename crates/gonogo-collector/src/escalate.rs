//! Auto-Defect escalation: recurring failures become open Defects.

use gonogo_config::EngineConfig;
use gonogo_core::defect::Defect;
use gonogo_core::enums::FailureCategory;
use gonogo_core::id::EntityKind;
use gonogo_store::traits::Transaction;
use tracing::info;

/// Examines the last N recorded outcomes for a failed test and creates an
/// auto-Defect when at least K of them share this failure's category and
/// digest, provided no open auto-Defect exists for (test, category).
///
/// Returns the created Defect, or `None` when the threshold is not met or
/// an open auto-Defect already covers the recurrence. A test that later
/// passes never closes the Defect here; closure is authoritative from the
/// tracker.
pub fn maybe_escalate(
    tx: &dyn Transaction,
    config: &EngineConfig,
    test_id: &str,
    category: FailureCategory,
    digest: &str,
) -> gonogo_store::Result<Option<Defect>> {
    let window = config.collector.defect_window_n;
    let threshold = config.collector.defect_threshold_k as usize;

    let recent = tx.list_recent_executions(test_id, window)?;
    let matching = recent
        .iter()
        .filter(|e| {
            e.status.is_failing()
                && e.failure_category == Some(category)
                && e.failure_digest.as_deref() == Some(digest)
        })
        .count();
    if matching < threshold {
        return Ok(None);
    }

    if tx.find_open_auto_defect(test_id, category)?.is_some() {
        return Ok(None);
    }

    let id = tx.allocate_id(EntityKind::Defect)?;
    let mut defect = Defect::new(id, format!("Recurring {category} failure: {test_id}"));
    defect.severity = config.severity_for(category);
    defect.auto_created = true;
    defect.test_id = Some(test_id.to_string());
    defect.failure_category = Some(category);
    defect.failure_digest = Some(digest.to_string());

    // Link the test's primary story when it resolves.
    if let Some(test) = tx.find_test(test_id)? {
        if let Some(story) = test.primary_story() {
            if tx.story_exists(story)? {
                defect.user_story_id = Some(story.to_string());
            }
        }
    }

    tx.create_defect(&defect, "collector")?;
    info!(
        defect = %defect.id,
        test = test_id,
        category = %category,
        "auto-defect created for recurring failure"
    );
    Ok(Some(defect))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    use gonogo_core::enums::{DefectSeverity, ExecutionStatus};
    use gonogo_core::story::UserStory;
    use gonogo_core::test::{ExecutionRecord, TestBuilder};
    use gonogo_store::traits::Storage;
    use gonogo_store::SqliteStore;

    const TID: &str = "tests/test_checkout.py::test_checkout";
    const DIGEST: &str = "ab12cd34ef56ab12";

    fn seeded_store() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .run_in_transaction(&|tx| {
                let story = UserStory::new("US-00006", "Checkout story", "US-00006");
                tx.create_story(&story, "sync")?;
                let test = TestBuilder::new("tests/test_checkout.py", "test_checkout")
                    .story_ids(vec!["US-00006".into()])
                    .build();
                tx.create_test(&test)
            })
            .unwrap();
        store
    }

    fn record_failures(store: &SqliteStore, count: usize, digest: &str, start_offset_ms: i64) {
        store
            .run_in_transaction(&|tx| {
                for i in 0..count {
                    let exec = ExecutionRecord {
                        test_id: TID.into(),
                        status: ExecutionStatus::Failed,
                        duration_ms: 10,
                        recorded_at: Utc::now()
                            + Duration::milliseconds(start_offset_ms + i as i64 * 10),
                        failure_category: Some(FailureCategory::Assertion),
                        failure_digest: Some(digest.to_string()),
                    };
                    let applied = tx.record_execution(&exec)?;
                    assert!(applied, "test fixture produced a stale outcome");
                }
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn below_threshold_no_defect() {
        let store = seeded_store();
        let config = EngineConfig::default();
        record_failures(&store, 2, DIGEST, 0);

        store
            .run_in_transaction(&|tx| {
                let created =
                    maybe_escalate(tx, &config, TID, FailureCategory::Assertion, DIGEST).unwrap();
                assert!(created.is_none());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn third_recurrence_creates_exactly_one_defect() {
        let store = seeded_store();
        let config = EngineConfig::default();
        record_failures(&store, 3, DIGEST, 0);

        store
            .run_in_transaction(&|tx| {
                let created =
                    maybe_escalate(tx, &config, TID, FailureCategory::Assertion, DIGEST).unwrap();
                let defect = created.expect("threshold met");
                assert_eq!(defect.severity, DefectSeverity::High);
                assert_eq!(defect.test_id.as_deref(), Some(TID));
                assert_eq!(defect.user_story_id.as_deref(), Some("US-00006"));
                assert!(defect.auto_created);

                // Second call is idempotent.
                let again =
                    maybe_escalate(tx, &config, TID, FailureCategory::Assertion, DIGEST).unwrap();
                assert!(again.is_none());
                Ok(())
            })
            .unwrap();

        assert_eq!(store.list_defects().unwrap().len(), 1);
    }

    #[test]
    fn different_digest_does_not_count() {
        let store = seeded_store();
        let config = EngineConfig::default();
        record_failures(&store, 2, DIGEST, 0);
        record_failures(&store, 1, "feedfacefeedface", 1000);

        store
            .run_in_transaction(&|tx| {
                let created =
                    maybe_escalate(tx, &config, TID, FailureCategory::Assertion, DIGEST).unwrap();
                // Window of 3 holds only 2 matching outcomes plus one other.
                assert!(created.is_none());
                Ok(())
            })
            .unwrap();
    }
}
