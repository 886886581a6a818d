//! The collector runtime: lifecycle events, buffering, chunked flush, and
//! the escalation pass.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use gonogo_config::EngineConfig;
use gonogo_core::defect::Defect;
use gonogo_core::digest::failure_digest;
use gonogo_core::enums::{ExecutionStatus, FailureCategory};
use gonogo_core::report::OperationReport;
use gonogo_core::test::{ExecutionRecord, Test, TestBuilder};
use gonogo_store::traits::{Storage, Transaction};

use crate::classify::{FailureInfo, classify_failure};
use crate::escalate::maybe_escalate;
use crate::journal::{Journal, remove_replayed, replay_foreign};
use crate::{CollectError, Result};

/// Distinguishes journal files created by the same process.
static JOURNAL_SEQ: AtomicU64 = AtomicU64::new(0);

/// The outcome of one collection run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectorReport {
    pub discovered: u64,
    pub buffered: u64,
    /// Outcomes recovered from journals left behind by crashed processes.
    pub recovered: u64,
    pub flushed: u64,
    /// Outcomes discarded by execution monotonicity.
    pub stale: u64,
    /// Outcomes accepted journal-only past the high-water mark.
    pub dropped: u64,
    pub auto_defects: u64,
    pub pruned_executions: u64,

    #[serde(flatten)]
    pub report: OperationReport,
}

/// Fire-and-forget mirroring seam. The shipped implementation wraps the
/// Synchronizer; failures are logged, never propagated -- the Defect is
/// usable locally even if mirroring is delayed.
pub trait DefectMirror {
    fn request_mirror(&self, defect: &Defect);
}

/// Observes one test run and attaches outcomes to Test rows.
pub struct ExecutionCollector<'a> {
    store: &'a dyn Storage,
    config: &'a EngineConfig,
    mirror: Option<&'a dyn DefectMirror>,
    journal: Journal,
    buffer: Vec<ExecutionRecord>,
    run_report: CollectorReport,
}

impl<'a> ExecutionCollector<'a> {
    /// Creates a collector with its own journal file and recovers any
    /// journals left behind by dead collector processes in the same
    /// directory.
    pub fn new(
        store: &'a dyn Storage,
        config: &'a EngineConfig,
        mirror: Option<&'a dyn DefectMirror>,
    ) -> Result<Self> {
        let dir = PathBuf::from(&config.collector.journal_dir);
        let name = format!(
            "collector-{}-{}.jsonl",
            std::process::id(),
            JOURNAL_SEQ.fetch_add(1, Ordering::SeqCst)
        );
        let journal = Journal::open(dir.join(name))?;

        let mut collector = Self {
            store,
            config,
            mirror,
            journal,
            buffer: Vec::new(),
            run_report: CollectorReport::default(),
        };
        collector.recover_foreign_journals(&dir)?;
        Ok(collector)
    }

    /// Resets run counters; call when the runner starts a session.
    pub fn on_run_start(&mut self) {
        self.run_report = CollectorReport::default();
        self.buffer.clear();
    }

    /// Looks up (or minimally creates) the Test row for a discovered test.
    /// Rows the scanner has not seen yet are created uncovered; the next
    /// scan enriches them.
    pub fn on_test_discovered(&mut self, test_id: &str) -> Result<()> {
        self.run_report.discovered += 1;

        if self.store.find_test(test_id)?.is_some() {
            return Ok(());
        }
        let Some(test) = minimal_test_row(test_id) else {
            self.run_report
                .report
                .warn(test_id, "malformed test identifier; outcome will be dropped");
            return Ok(());
        };
        self.store.run_in_transaction(&|tx| {
            if tx.find_test(test_id)?.is_none() {
                tx.create_test(&test)?;
            }
            Ok(())
        })?;
        debug!(test = test_id, "created minimal uncovered test row");
        Ok(())
    }

    /// Buffers one outcome. Past the high-water mark outcomes are
    /// journal-only; the journal guarantees at-least-once delivery.
    pub fn on_test_outcome(
        &mut self,
        test_id: &str,
        status: ExecutionStatus,
        duration_ms: i64,
        failure: Option<&FailureInfo>,
    ) -> Result<()> {
        let (category, digest) = match failure {
            Some(info) => (
                Some(classify_failure(&info.kind, &info.message)),
                Some(failure_digest(&info.message)),
            ),
            None => (None, None),
        };
        let record = ExecutionRecord {
            test_id: test_id.to_string(),
            status,
            duration_ms,
            recorded_at: Utc::now(),
            failure_category: category,
            failure_digest: digest,
        };

        self.journal.append(&record)?;
        self.run_report.buffered += 1;
        if self.buffer.len() < self.config.collector.high_water_mark {
            self.buffer.push(record);
        } else {
            self.run_report.dropped += 1;
        }
        Ok(())
    }

    /// Flushes buffered outcomes in bounded chunks (one transaction per
    /// chunk), runs the auto-Defect escalation pass, prunes execution
    /// history past the retention bound, and truncates the journal.
    pub fn on_run_complete(&mut self) -> Result<CollectorReport> {
        // Past the high-water mark the buffer is incomplete; the journal
        // has everything.
        let records = if self.run_report.dropped > 0 {
            self.journal.replay()?
        } else {
            std::mem::take(&mut self.buffer)
        };

        let failed = self.flush_records(&records)?;
        self.escalate(&failed)?;
        self.prune()?;

        self.journal.truncate()?;
        self.buffer.clear();

        let report = std::mem::take(&mut self.run_report);
        info!(
            flushed = report.flushed,
            stale = report.stale,
            auto_defects = report.auto_defects,
            "collection run complete"
        );
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Flushes records chunk by chunk; returns the unique failure keys
    /// that applied this run, for the escalation pass.
    fn flush_records(
        &mut self,
        records: &[ExecutionRecord],
    ) -> Result<BTreeSet<(String, FailureCategory, String)>> {
        let chunk_size = self.config.collector.flush_chunk_size.max(1);
        let failed: RefCell<BTreeSet<(String, FailureCategory, String)>> =
            RefCell::new(BTreeSet::new());
        let counters: RefCell<(u64, u64)> = RefCell::new((0, 0)); // (flushed, stale)

        for chunk in records.chunks(chunk_size) {
            self.store.run_in_transaction(&|tx| {
                for record in chunk {
                    ensure_test_row(tx, &record.test_id)?;
                    let applied = tx.record_execution(record)?;
                    let mut counters = counters.borrow_mut();
                    if applied {
                        counters.0 += 1;
                        if record.status.is_failing() {
                            if let (Some(category), Some(digest)) =
                                (record.failure_category, record.failure_digest.as_ref())
                            {
                                failed.borrow_mut().insert((
                                    record.test_id.clone(),
                                    category,
                                    digest.clone(),
                                ));
                            }
                        }
                    } else {
                        counters.1 += 1;
                    }
                }
                Ok(())
            })?;
        }

        let (flushed, stale) = counters.into_inner();
        self.run_report.flushed += flushed;
        self.run_report.stale += stale;
        Ok(failed.into_inner())
    }

    fn escalate(&mut self, failed: &BTreeSet<(String, FailureCategory, String)>) -> Result<()> {
        let mut created: Vec<Defect> = Vec::new();
        for (test_id, category, digest) in failed {
            let slot: RefCell<Option<Defect>> = RefCell::new(None);
            self.store.run_in_transaction(&|tx| {
                *slot.borrow_mut() =
                    maybe_escalate(tx, self.config, test_id, *category, digest)?;
                Ok(())
            })?;
            if let Some(defect) = slot.into_inner() {
                self.run_report.auto_defects += 1;
                created.push(defect);
            }
        }

        // Mirroring is fire-and-forget; the Defects are already usable.
        if let Some(mirror) = self.mirror {
            for defect in &created {
                mirror.request_mirror(defect);
            }
        }
        Ok(())
    }

    fn prune(&mut self) -> Result<()> {
        let retain = self.config.collector.retention_executions;
        let pruned: RefCell<u64> = RefCell::new(0);
        self.store.run_in_transaction(&|tx| {
            *pruned.borrow_mut() = tx.prune_executions(retain)?;
            Ok(())
        })?;
        self.run_report.pruned_executions += pruned.into_inner();
        Ok(())
    }

    /// Replays and flushes journals abandoned by dead processes. Files
    /// still locked by live collectors are skipped.
    fn recover_foreign_journals(&mut self, dir: &std::path::Path) -> Result<()> {
        let own = self.journal.path().to_path_buf();
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(CollectError::Journal(e)),
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path == own || path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                continue;
            }
            let Some(records) = replay_foreign(&path)? else {
                continue;
            };
            if !records.is_empty() {
                warn!(
                    path = %path.display(),
                    records = records.len(),
                    "recovering journal from dead collector"
                );
                let flushed_failed = self.flush_records(&records)?;
                self.escalate(&flushed_failed)?;
                self.run_report.recovered += records.len() as u64;
            }
            remove_replayed(&path)?;
        }
        Ok(())
    }
}

/// Builds the minimal uncovered Test row for an identifier the scanner has
/// not seen. Returns `None` for identifiers missing the `::` separator.
fn minimal_test_row(test_id: &str) -> Option<Test> {
    let (path, symbol) = test_id.split_once("::")?;
    if path.is_empty() || symbol.is_empty() {
        return None;
    }
    Some(TestBuilder::new(path, symbol).uncovered(true).build())
}

/// Ensures a Test row exists before an outcome lands on it.
fn ensure_test_row(tx: &dyn Transaction, test_id: &str) -> gonogo_store::Result<()> {
    if tx.find_test(test_id)?.is_none() {
        if let Some(test) = minimal_test_row(test_id) {
            tx.create_test(&test)?;
        }
    }
    Ok(())
}
