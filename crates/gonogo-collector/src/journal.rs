//! The append-only execution journal.
//!
//! Each collector process owns one JSONL journal file holding outcomes
//! that have not been flushed to the Store yet. A crash between
//! `on_test_outcome` and flush is recovered on next startup by replaying
//! leftover journals; the file is truncated after a successful flush.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{debug, warn};

use gonogo_core::test::ExecutionRecord;

use crate::Result;

/// An exclusively locked, append-only journal file.
pub struct Journal {
    path: PathBuf,
    file: File,
}

impl Journal {
    /// Opens (creating if needed) and exclusively locks a journal file.
    /// The lock marks the journal as owned by a live process; recovery
    /// skips locked files.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)?;
        file.try_lock_exclusive()?;
        debug!(path = %path.display(), "journal opened");
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one record and flushes it to the OS.
    pub fn append(&mut self, record: &ExecutionRecord) -> Result<()> {
        let line = serde_json::to_string(record)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        self.file.write_all(line.as_bytes())?;
        self.file.write_all(b"\n")?;
        self.file.flush()?;
        Ok(())
    }

    /// Replays this journal's own records (crash recovery within the same
    /// path, e.g. after reopening).
    pub fn replay(&mut self) -> Result<Vec<ExecutionRecord>> {
        self.file.seek(SeekFrom::Start(0))?;
        let records = read_records(&self.path, &mut BufReader::new(&self.file));
        self.file.seek(SeekFrom::End(0))?;
        records
    }

    /// Truncates the journal after a successful flush.
    pub fn truncate(&mut self) -> Result<()> {
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        Ok(())
    }
}

/// Replays a foreign journal file left behind by a dead process.
///
/// Returns `None` when the file is still exclusively locked (its owner is
/// alive). The file is left in place; callers remove it with
/// [`remove_replayed`] only after the records are safely in the Store.
pub fn replay_foreign(path: &Path) -> Result<Option<Vec<ExecutionRecord>>> {
    let file = match OpenOptions::new().read(true).write(true).open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if file.try_lock_exclusive().is_err() {
        // Owner still alive.
        return Ok(None);
    }
    let records = read_records(path, &mut BufReader::new(&file))?;
    fs2::FileExt::unlock(&file)?;
    Ok(Some(records))
}

/// Removes a foreign journal once its records are safely in the Store.
pub fn remove_replayed(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn read_records<R: BufRead>(path: &Path, reader: &mut R) -> Result<Vec<ExecutionRecord>> {
    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<ExecutionRecord>(trimmed) {
            Ok(record) => records.push(record),
            Err(e) => {
                // A torn final line from a crash mid-write is expected;
                // anything before it already parsed.
                warn!(
                    path = %path.display(),
                    line = index + 1,
                    error = %e,
                    "skipping unreadable journal line"
                );
            }
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use gonogo_core::enums::ExecutionStatus;

    fn record(test_id: &str) -> ExecutionRecord {
        ExecutionRecord {
            test_id: test_id.into(),
            status: ExecutionStatus::Passed,
            duration_ms: 5,
            recorded_at: Utc::now(),
            failure_category: None,
            failure_digest: None,
        }
    }

    #[test]
    fn append_replay_truncate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("collector-1.jsonl");
        let mut journal = Journal::open(&path).unwrap();

        journal.append(&record("a.py::test_a")).unwrap();
        journal.append(&record("a.py::test_b")).unwrap();

        let replayed = journal.replay().unwrap();
        assert_eq!(replayed.len(), 2);
        assert_eq!(replayed[0].test_id, "a.py::test_a");

        journal.truncate().unwrap();
        assert_eq!(journal.replay().unwrap().len(), 0);
    }

    #[test]
    fn foreign_replay_after_owner_death() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("collector-dead.jsonl");
        {
            let mut journal = Journal::open(&path).unwrap();
            journal.append(&record("a.py::test_a")).unwrap();
            // Drop releases the lock, simulating process death.
        }

        let records = replay_foreign(&path).unwrap().unwrap();
        assert_eq!(records.len(), 1);

        remove_replayed(&path).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn torn_final_line_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("collector-torn.jsonl");
        {
            let mut journal = Journal::open(&path).unwrap();
            journal.append(&record("a.py::test_a")).unwrap();
        }
        // Simulate a crash mid-append.
        use std::io::Write as _;
        let mut f = OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(b"{\"test_id\":\"a.py::te").unwrap();

        let records = replay_foreign(&path).unwrap().unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn missing_foreign_journal_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.jsonl");
        assert!(replay_foreign(&path).unwrap().is_none());
    }
}
