//! Source Scanner: walks a source tree, extracts traceability annotations
//! from test functions, and reconciles Test rows in the Store.
//!
//! The scan is atomic: all discoveries commit in one end-of-scan
//! transaction, so a crash mid-scan leaves the Store unchanged. Individual
//! file parse failures are recorded in the report and never fail the scan.

pub mod parser;
pub mod reconcile;
pub mod walker;

pub use reconcile::{ScanOptions, ScanReport, Scanner};

/// Errors that abort an entire scan (item-level problems go in the report).
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("scan root does not exist: {0}")]
    RootMissing(String),

    #[error("invalid glob pattern {pattern}: {reason}")]
    BadGlob {
        pattern: String,
        reason: String,
    },

    #[error(transparent)]
    Store(#[from] gonogo_store::StoreError),
}

/// Result alias for scan operations.
pub type Result<T> = std::result::Result<T, ScanError>;
