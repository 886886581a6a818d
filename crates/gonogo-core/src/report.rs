//! Operation reports -- the ok/warning/error accumulator shared by scan,
//! sync, and collect operations.
//!
//! Item-level problems are accumulated here instead of aborting the
//! operation; the CLI exit code reflects the worst counter.

use serde::{Deserialize, Serialize};

/// Per-item message severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
}

/// One bounded per-item message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMessage {
    pub severity: Severity,
    /// The item the message is about (file path, tracker ref, test ID, ...).
    pub item: String,
    pub detail: String,
}

/// Maximum number of per-item messages retained; counters keep counting
/// past the bound.
pub const MAX_MESSAGES: usize = 100;

/// Accumulates the outcome of one ingestion operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationReport {
    pub ok: u64,
    pub warnings: u64,
    pub errors: u64,

    #[serde(default)]
    pub messages: Vec<ReportMessage>,
}

impl OperationReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one successfully processed item.
    pub fn record_ok(&mut self) {
        self.ok += 1;
    }

    /// Records a warning about an item.
    pub fn warn(&mut self, item: impl Into<String>, detail: impl Into<String>) {
        self.warnings += 1;
        self.push(Severity::Warning, item.into(), detail.into());
    }

    /// Records an item-level error. The operation continues.
    pub fn error(&mut self, item: impl Into<String>, detail: impl Into<String>) {
        self.errors += 1;
        self.push(Severity::Error, item.into(), detail.into());
    }

    fn push(&mut self, severity: Severity, item: String, detail: String) {
        if self.messages.len() < MAX_MESSAGES {
            self.messages.push(ReportMessage {
                severity,
                item,
                detail,
            });
        }
    }

    /// Folds another report into this one.
    pub fn merge(&mut self, other: OperationReport) {
        self.ok += other.ok;
        self.warnings += other.warnings;
        self.errors += other.errors;
        for msg in other.messages {
            if self.messages.len() >= MAX_MESSAGES {
                break;
            }
            self.messages.push(msg);
        }
    }

    /// The worst severity present, if any.
    pub fn worst(&self) -> Option<Severity> {
        if self.errors > 0 {
            Some(Severity::Error)
        } else if self.warnings > 0 {
            Some(Severity::Warning)
        } else {
            None
        }
    }

    /// CLI exit code: 0 success, 1 partial/warnings, 2 hard failure.
    pub fn exit_code(&self) -> i32 {
        match self.worst() {
            None => 0,
            Some(Severity::Warning) => 1,
            Some(Severity::Error) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let mut r = OperationReport::new();
        r.record_ok();
        r.record_ok();
        r.warn("file.py", "unknown annotation");
        r.error("other.py", "parse failure");
        assert_eq!(r.ok, 2);
        assert_eq!(r.warnings, 1);
        assert_eq!(r.errors, 1);
        assert_eq!(r.messages.len(), 2);
    }

    #[test]
    fn worst_and_exit_code() {
        let mut r = OperationReport::new();
        assert_eq!(r.worst(), None);
        assert_eq!(r.exit_code(), 0);
        r.warn("a", "w");
        assert_eq!(r.worst(), Some(Severity::Warning));
        assert_eq!(r.exit_code(), 1);
        r.error("b", "e");
        assert_eq!(r.worst(), Some(Severity::Error));
        assert_eq!(r.exit_code(), 1);
    }

    #[test]
    fn messages_are_bounded() {
        let mut r = OperationReport::new();
        for i in 0..(MAX_MESSAGES + 10) {
            r.warn(format!("item-{i}"), "too many");
        }
        assert_eq!(r.messages.len(), MAX_MESSAGES);
        assert_eq!(r.warnings as usize, MAX_MESSAGES + 10);
    }

    #[test]
    fn merge_folds_counters() {
        let mut a = OperationReport::new();
        a.record_ok();
        let mut b = OperationReport::new();
        b.warn("x", "w");
        b.record_ok();
        a.merge(b);
        assert_eq!(a.ok, 2);
        assert_eq!(a.warnings, 1);
        assert_eq!(a.messages.len(), 1);
    }
}
