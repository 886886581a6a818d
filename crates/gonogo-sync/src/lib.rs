//! Tracker Synchronizer: reconciles UserStory and Defect rows with an
//! external issue tracker.
//!
//! The tracker is reached through the [`TrackerClient`] trait; the shipped
//! implementation is HTTP (ureq) with exponential backoff. Sync applies
//! one transaction per item and persists the since-token only after a full
//! page commits, so replays are idempotent by tracker reference.

pub mod client;
pub mod mapping;
pub mod sync;

pub use client::{HttpTracker, ItemDraft, TrackerClient, TrackerItem, TrackerPage};
pub use sync::{SyncReport, SyncedEntity, Synchronizer};

/// Errors that abort a sync operation (item-level problems go in the report).
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Transport-level failure after the retry budget was exhausted.
    #[error("tracker unreachable: {0}")]
    Transport(String),

    /// Non-retryable HTTP status from the tracker.
    #[error("tracker returned status {status}")]
    Http { status: u16 },

    /// The per-sync time budget ran out; the since-token was not advanced.
    #[error("sync budget exhausted after {pages} pages")]
    BudgetExhausted { pages: u64 },

    /// The tracker response body did not parse.
    #[error("malformed tracker response: {0}")]
    MalformedResponse(String),

    #[error(transparent)]
    Store(#[from] gonogo_store::StoreError),
}

/// Result alias for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
