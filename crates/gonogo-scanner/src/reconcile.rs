//! Store reconciliation: discovered tests are upserted in one end-of-scan
//! transaction with union merge semantics.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use gonogo_config::EngineConfig;
use gonogo_core::report::OperationReport;
use gonogo_core::test::{Test, TestBuilder};
use gonogo_store::traits::{Storage, TestFlags, Transaction};

use crate::parser::{ParsedFile, ParsedTest, parse_source};
use crate::walker::{collect_test_files, normalize_rel_path};
use crate::{Result, ScanError};

/// Scan options.
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Parse and report only; skip all Store writes.
    pub annotate_only: bool,
}

/// The outcome of one scan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanReport {
    pub discovered: u64,
    pub created: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub orphaned: u64,
    pub potentially_removed: u64,
    pub reactivated: u64,

    /// ok/warning/error counters plus bounded per-item messages
    /// (annotation errors, unknown references, collisions).
    #[serde(flatten)]
    pub report: OperationReport,
}

/// Walks a source tree and reconciles Test rows.
pub struct Scanner<'a> {
    store: &'a dyn Storage,
    config: &'a EngineConfig,
}

impl<'a> Scanner<'a> {
    pub fn new(store: &'a dyn Storage, config: &'a EngineConfig) -> Self {
        Self { store, config }
    }

    /// Scans `root`. File parsing is parallel; Store writes happen in one
    /// transaction at the end, so a crash mid-scan leaves the Store
    /// unchanged and no reader observes a half-scanned tree.
    pub fn scan(&self, root: &Path, options: &ScanOptions) -> Result<ScanReport> {
        let files = collect_test_files(root, &self.config.scanner)?;
        info!(files = files.len(), root = %root.display(), "scanning source tree");

        let parsed: Vec<(String, std::io::Result<ParsedFile>)> = files
            .par_iter()
            .map(|rel| {
                let rel_str = normalize_rel_path(rel);
                let result = std::fs::read_to_string(root.join(rel))
                    .map(|src| parse_source(&rel_str, &src));
                (rel_str, result)
            })
            .collect();

        let mut report = ScanReport::default();
        let mut discovered: HashMap<String, Test> = HashMap::new();
        let mut order: Vec<String> = Vec::new();

        for (rel_str, result) in parsed {
            let file = match result {
                Ok(file) => file,
                Err(e) => {
                    // Unreadable file: recorded, scan continues.
                    report.report.error(&rel_str, format!("parse failure: {e}"));
                    continue;
                }
            };
            for warning in file.warnings {
                report.report.warn(&rel_str, warning);
            }
            for test in file.tests {
                let built = build_test(&test);
                if let Some(previous) = discovered.insert(built.id.clone(), built) {
                    // Identical normalized identifier: last writer wins.
                    report.report.warn(
                        &previous.id,
                        "duplicate test identifier; last definition wins",
                    );
                } else {
                    order.push(test_id_of(&test));
                }
            }
        }

        report.discovered = discovered.len() as u64;

        if options.annotate_only {
            debug!("annotate-only scan: skipping store writes");
            report.report.ok += report.discovered;
            return Ok(report);
        }

        let shared = RefCell::new(report);
        self.store
            .run_in_transaction(&|tx| {
                let mut report = shared.borrow_mut();
                reconcile_tx(tx, root, &discovered, &order, &mut report)
            })
            .map_err(ScanError::Store)?;

        Ok(shared.into_inner())
    }
}

fn test_id_of(parsed: &ParsedTest) -> String {
    gonogo_core::test::test_id(&parsed.file_path, &parsed.symbol)
}

fn build_test(parsed: &ParsedTest) -> Test {
    let a = &parsed.annotations;
    let mut builder = TestBuilder::new(parsed.file_path.clone(), parsed.symbol.clone())
        .component_tags(a.components.clone())
        .story_ids(a.stories.clone())
        .epic_ids(a.epics.clone())
        .defect_ids(a.defects.clone());
    if let Some(priority) = a.priority {
        builder = builder.priority(priority);
    }
    if let Some(test_type) = a.test_type {
        builder = builder.test_type(test_type);
    }
    if let Some(ref scenario) = a.bdd_scenario {
        builder = builder.bdd_scenario(scenario.clone());
    }
    builder.build()
}

/// Returns `true` when at least one associated Story or Epic resolves.
/// Unknown references are recorded as warnings; they re-resolve at the
/// next Epic/Story ingest.
fn resolve_coverage(
    tx: &dyn Transaction,
    test: &Test,
    report: &mut ScanReport,
) -> gonogo_store::Result<bool> {
    let mut covered = false;
    for story in &test.story_ids {
        if tx.story_exists(story)? {
            covered = true;
        } else {
            report
                .report
                .warn(&test.id, format!("references unknown user story {story}"));
        }
    }
    for epic in &test.epic_ids {
        if tx.epic_exists(epic)? {
            covered = true;
        } else {
            report
                .report
                .warn(&test.id, format!("references unknown epic {epic}"));
        }
    }
    Ok(covered)
}

/// Returns `true` when a rescan would change the stored row: refreshed
/// metadata, new associations, a flag to clear, or a coverage change.
fn needs_update(existing: &Test, scanned: &Test) -> bool {
    existing.orphaned
        || existing.potentially_removed
        || existing.uncovered != scanned.uncovered
        || existing.test_type != scanned.test_type
        || existing.priority != scanned.priority
        || existing.bdd_scenario != scanned.bdd_scenario
        || existing.file_path != scanned.file_path
        || !scanned
            .story_ids
            .iter()
            .all(|s| existing.story_ids.contains(s))
        || !scanned.epic_ids.iter().all(|e| existing.epic_ids.contains(e))
        || !scanned
            .defect_ids
            .iter()
            .all(|d| existing.defect_ids.contains(d))
        || !scanned
            .component_tags
            .iter()
            .all(|t| existing.component_tags.contains(t))
}

fn reconcile_tx(
    tx: &dyn Transaction,
    root: &Path,
    discovered: &HashMap<String, Test>,
    order: &[String],
    report: &mut ScanReport,
) -> gonogo_store::Result<()> {
    let existing: HashMap<String, Test> = tx
        .list_tests()?
        .into_iter()
        .map(|t| (t.id.clone(), t))
        .collect();

    for id in order {
        let Some(test) = discovered.get(id) else {
            continue;
        };
        let mut test = test.clone();
        test.uncovered = !resolve_coverage(tx, &test, report)?;

        match existing.get(id) {
            Some(current) => {
                if needs_update(current, &test) {
                    tx.merge_test(&test)?;
                    report.updated += 1;
                    if current.orphaned {
                        report.reactivated += 1;
                    }
                } else {
                    report.unchanged += 1;
                }
            }
            None => {
                tx.create_test(&test)?;
                report.created += 1;
            }
        }
        report.report.record_ok();
    }

    // Rows not seen this scan: advisory when the file still exists,
    // orphaned when it is gone. History is preserved either way.
    for (id, current) in &existing {
        if discovered.contains_key(id) {
            continue;
        }
        let file_present = root.join(&current.file_path).is_file();
        if file_present {
            if !current.potentially_removed && !current.orphaned {
                tx.set_test_flags(
                    id,
                    &TestFlags {
                        potentially_removed: Some(true),
                        ..Default::default()
                    },
                )?;
                report.potentially_removed += 1;
            }
        } else if !current.orphaned {
            tx.set_test_flags(
                id,
                &TestFlags {
                    orphaned: Some(true),
                    potentially_removed: Some(false),
                    ..Default::default()
                },
            )?;
            report.orphaned += 1;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    use gonogo_core::enums::TestPriority;
    use gonogo_core::epic::EpicBuilder;
    use gonogo_core::story::UserStory;
    use gonogo_store::SqliteStore;

    const LOGIN_TEST: &str = r#"
import pytest

@pytest.mark.epic("EP-00003")
@pytest.mark.user_story("US-00006")
@pytest.mark.component("backend", "auth")
@pytest.mark.priority("high")
def test_login(client):
    assert client.login()
"#;

    fn seeded_store() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .run_in_transaction(&|tx| {
                tx.create_epic(&EpicBuilder::new("EP-00003", "Auth epic").build(), "admin")?;
                let mut story = UserStory::new("US-00006", "Login story", "US-00006");
                story.epic_id = Some("EP-00003".into());
                tx.create_story(&story, "sync")
            })
            .unwrap();
        store
    }

    fn write_tree(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (rel, content) in files {
            let path = dir.path().join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
        }
        dir
    }

    #[test]
    fn fresh_scan_one_annotated_test() {
        let store = seeded_store();
        let config = EngineConfig::default();
        let tree = write_tree(&[("tests/test_auth.py", LOGIN_TEST)]);

        let scanner = Scanner::new(&store, &config);
        let report = scanner.scan(tree.path(), &ScanOptions::default()).unwrap();

        assert_eq!(report.discovered, 1);
        assert_eq!(report.created, 1);
        assert_eq!(report.updated, 0);
        assert_eq!(report.orphaned, 0);
        assert_eq!(report.report.errors, 0);

        let test = store
            .find_test("tests/test_auth.py::test_login")
            .unwrap()
            .unwrap();
        assert_eq!(test.story_ids, vec!["US-00006"]);
        assert_eq!(test.epic_ids, vec!["EP-00003"]);
        assert_eq!(test.component_tags, vec!["auth", "backend"]);
        assert_eq!(test.priority, TestPriority::High);
        assert!(!test.uncovered);
        assert!(!test.orphaned);
    }

    #[test]
    fn rescan_without_changes_writes_nothing() {
        let store = seeded_store();
        let config = EngineConfig::default();
        let tree = write_tree(&[("tests/test_auth.py", LOGIN_TEST)]);
        let scanner = Scanner::new(&store, &config);

        scanner.scan(tree.path(), &ScanOptions::default()).unwrap();
        let before = store
            .find_test("tests/test_auth.py::test_login")
            .unwrap()
            .unwrap();

        let second = scanner.scan(tree.path(), &ScanOptions::default()).unwrap();
        assert_eq!(second.created, 0);
        assert_eq!(second.updated, 0);
        assert_eq!(second.unchanged, 1);

        let after = store
            .find_test("tests/test_auth.py::test_login")
            .unwrap()
            .unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn removed_file_orphans_and_restore_reactivates() {
        let store = seeded_store();
        let config = EngineConfig::default();
        let tree = write_tree(&[("tests/test_auth.py", LOGIN_TEST)]);
        let scanner = Scanner::new(&store, &config);

        scanner.scan(tree.path(), &ScanOptions::default()).unwrap();

        std::fs::remove_file(tree.path().join("tests/test_auth.py")).unwrap();
        let report = scanner.scan(tree.path(), &ScanOptions::default()).unwrap();
        assert_eq!(report.orphaned, 1);
        let test = store
            .find_test("tests/test_auth.py::test_login")
            .unwrap()
            .unwrap();
        assert!(test.orphaned);

        std::fs::write(tree.path().join("tests/test_auth.py"), LOGIN_TEST).unwrap();
        let report = scanner.scan(tree.path(), &ScanOptions::default()).unwrap();
        assert_eq!(report.reactivated, 1);
        let test = store
            .find_test("tests/test_auth.py::test_login")
            .unwrap()
            .unwrap();
        assert!(!test.orphaned);
    }

    #[test]
    fn vanished_symbol_is_potentially_removed() {
        let store = seeded_store();
        let config = EngineConfig::default();
        let tree = write_tree(&[("tests/test_auth.py", LOGIN_TEST)]);
        let scanner = Scanner::new(&store, &config);
        scanner.scan(tree.path(), &ScanOptions::default()).unwrap();

        // File keeps existing but the test function is renamed.
        std::fs::write(
            tree.path().join("tests/test_auth.py"),
            "def test_login_v2():\n    pass\n",
        )
        .unwrap();
        let report = scanner.scan(tree.path(), &ScanOptions::default()).unwrap();
        assert_eq!(report.potentially_removed, 1);
        assert_eq!(report.created, 1); // the new symbol

        let old = store
            .find_test("tests/test_auth.py::test_login")
            .unwrap()
            .unwrap();
        assert!(old.potentially_removed);
        assert!(!old.orphaned);
    }

    #[test]
    fn unknown_epic_reference_warns_but_scan_succeeds() {
        let store = SqliteStore::open_in_memory().unwrap();
        let config = EngineConfig::default();
        let tree = write_tree(&[(
            "tests/test_x.py",
            "@pytest.mark.epic(\"EP-00042\")\ndef test_x():\n    pass\n",
        )]);

        let scanner = Scanner::new(&store, &config);
        let report = scanner.scan(tree.path(), &ScanOptions::default()).unwrap();
        assert_eq!(report.created, 1);
        assert_eq!(report.report.errors, 0);
        assert!(report.report.warnings > 0);

        let test = store.find_test("tests/test_x.py::test_x").unwrap().unwrap();
        assert!(test.uncovered);
        // The association is recorded for later re-resolution.
        assert_eq!(test.epic_ids, vec!["EP-00042"]);
    }

    #[test]
    fn uncovered_clears_when_epic_arrives_later() {
        let store = SqliteStore::open_in_memory().unwrap();
        let config = EngineConfig::default();
        let tree = write_tree(&[(
            "tests/test_x.py",
            "@pytest.mark.epic(\"EP-00042\")\ndef test_x():\n    pass\n",
        )]);
        Scanner::new(&store, &config)
            .scan(tree.path(), &ScanOptions::default())
            .unwrap();

        store
            .create_epic(&EpicBuilder::new("EP-00042", "Late epic").build(), "admin")
            .unwrap();

        let test = store.find_test("tests/test_x.py::test_x").unwrap().unwrap();
        assert!(!test.uncovered);
    }

    #[test]
    fn annotate_only_skips_writes() {
        let store = seeded_store();
        let config = EngineConfig::default();
        let tree = write_tree(&[("tests/test_auth.py", LOGIN_TEST)]);

        let report = Scanner::new(&store, &config)
            .scan(
                tree.path(),
                &ScanOptions {
                    annotate_only: true,
                },
            )
            .unwrap();
        assert_eq!(report.discovered, 1);
        assert_eq!(report.created, 0);
        assert!(store.list_tests().unwrap().is_empty());
    }

    #[test]
    fn duplicate_definition_reports_collision() {
        let store = seeded_store();
        let config = EngineConfig::default();
        let tree = write_tree(&[(
            "tests/test_dup.py",
            "def test_same():\n    pass\n\ndef test_same():\n    pass\n",
        )]);

        let report = Scanner::new(&store, &config)
            .scan(tree.path(), &ScanOptions::default())
            .unwrap();
        assert_eq!(report.discovered, 1);
        assert!(
            report
                .report
                .messages
                .iter()
                .any(|m| m.detail.contains("last definition wins"))
        );
    }

    #[test]
    fn parse_failure_is_nonfatal() {
        let store = seeded_store();
        let config = EngineConfig::default();
        let tree = write_tree(&[
            ("tests/test_ok.py", "def test_ok():\n    pass\n"),
            ("tests/test_bad.py", "def test_bad():\n    pass\n"),
        ]);
        // Make one file unreadable as bytes: invalid UTF-8.
        std::fs::write(tree.path().join("tests/test_bad.py"), [0xff, 0xfe, 0x00]).unwrap();

        let report = Scanner::new(&store, &config)
            .scan(tree.path(), &ScanOptions::default())
            .unwrap();
        assert_eq!(report.report.errors, 1);
        assert_eq!(report.created, 1);
    }
}
