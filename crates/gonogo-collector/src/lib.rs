//! Execution Collector: observes the test runner's lifecycle events,
//! buffers outcomes with a write-ahead journal, flushes them to the Store
//! in bounded chunks, and escalates recurring failures to auto-created
//! Defects.
//!
//! The collector never depends on the runner's object model: hosts bind
//! [`ExecutionCollector::on_test_discovered`],
//! [`ExecutionCollector::on_test_outcome`], and
//! [`ExecutionCollector::on_run_complete`] to whatever hook points their
//! runner provides, or replay a results file through them.

pub mod classify;
pub mod collector;
pub mod escalate;
pub mod journal;

pub use classify::{FailureInfo, classify_failure};
pub use collector::{CollectorReport, DefectMirror, ExecutionCollector};
pub use journal::Journal;

/// Errors that abort collector operations.
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error("journal I/O error: {0}")]
    Journal(#[from] std::io::Error),

    /// The journal contains a line that cannot be replayed.
    #[error("corrupted journal {path} at line {line}")]
    CorruptJournal { path: String, line: usize },

    #[error(transparent)]
    Store(#[from] gonogo_store::StoreError),
}

/// Result alias for collector operations.
pub type Result<T> = std::result::Result<T, CollectError>;
