//! Storage and Transaction traits -- the public API for persistence.
//!
//! Ingestion components and the query engine depend on these traits rather
//! than on the concrete SQLite implementation so that alternative backends
//! (mocks, proxies) can be substituted.

use chrono::{DateTime, Utc};

use gonogo_core::defect::Defect;
use gonogo_core::dependency::EpicDependency;
use gonogo_core::entity::Capability;
use gonogo_core::enums::{
    DefectSeverity, DefectStatus, DependencyKind, EpicStatus, EventType, FailureCategory,
    StoryStatus,
};
use gonogo_core::epic::Epic;
use gonogo_core::story::UserStory;
use gonogo_core::test::{ExecutionRecord, Test};

use crate::error::Result;
use crate::notify::Subscriber;

// ---------------------------------------------------------------------------
// Typed partial-update structs
// ---------------------------------------------------------------------------

/// Typed partial update for Epics.
///
/// Only `Some` fields are applied. Double-`Option` fields distinguish
/// "leave unchanged" (`None`) from "set to NULL" (`Some(None)`).
#[derive(Debug, Clone, Default)]
pub struct EpicUpdates {
    pub title: Option<String>,
    pub status: Option<EpicStatus>,
    /// Permits a lattice regression; the transition is logged as
    /// `status_overridden` instead of `status_changed`.
    pub admin_override: bool,
    pub capability_id: Option<Option<String>>,
    pub tracker_ref: Option<Option<String>>,
    pub planned_end_at: Option<Option<DateTime<Utc>>>,
    pub roi_value_cents: Option<i64>,
    pub roi_cost_cents: Option<i64>,
    pub adoption_metric: Option<Option<f64>>,
    pub archived: Option<bool>,
}

/// Typed partial update for UserStories.
#[derive(Debug, Clone, Default)]
pub struct StoryUpdates {
    pub title: Option<String>,
    pub story_points: Option<u32>,
    pub status: Option<StoryStatus>,
    pub epic_id: Option<Option<String>>,
    pub orphan_parent: Option<Option<String>>,
    pub assignee: Option<String>,
}

/// Typed partial update for Defects.
#[derive(Debug, Clone, Default)]
pub struct DefectUpdates {
    pub title: Option<String>,
    pub severity: Option<DefectSeverity>,
    pub status: Option<DefectStatus>,
    pub tracker_ref: Option<Option<String>>,
    pub user_story_id: Option<Option<String>>,
    pub archived: Option<bool>,
}

/// Scanner-owned flag updates for a Test row.
#[derive(Debug, Clone, Default)]
pub struct TestFlags {
    pub orphaned: Option<bool>,
    pub potentially_removed: Option<bool>,
    pub uncovered: Option<bool>,
}

/// One audit-trail event row.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub entity_id: String,
    pub event_type: EventType,
    pub actor: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Transaction trait
// ---------------------------------------------------------------------------

/// Operations available inside a store transaction.
///
/// Writes performed here become visible (and are published as change
/// events) only when the surrounding transaction commits.
pub trait Transaction {
    // -- Metadata ------------------------------------------------------------

    /// Allocates the next sequential ID for the given entity kind.
    fn allocate_id(&self, kind: gonogo_core::id::EntityKind) -> Result<String>;

    fn get_meta(&self, key: &str) -> Result<Option<String>>;

    fn set_meta(&self, key: &str, value: &str) -> Result<()>;

    // -- Capabilities --------------------------------------------------------

    fn create_capability(&self, cap: &Capability, actor: &str) -> Result<()>;

    fn capability_exists(&self, id: &str) -> Result<bool>;

    // -- Epics ---------------------------------------------------------------

    fn create_epic(&self, epic: &Epic, actor: &str) -> Result<()>;

    fn get_epic(&self, id: &str) -> Result<Epic>;

    fn epic_exists(&self, id: &str) -> Result<bool>;

    /// Applies partial updates; status changes honor the monotonicity
    /// invariant unless `updates.admin_override` is set.
    fn update_epic(&self, id: &str, updates: &EpicUpdates, actor: &str) -> Result<()>;

    // -- UserStories ---------------------------------------------------------

    fn create_story(&self, story: &UserStory, actor: &str) -> Result<()>;

    fn get_story(&self, id: &str) -> Result<UserStory>;

    fn story_exists(&self, id: &str) -> Result<bool>;

    fn find_story_by_tracker_ref(&self, tracker_ref: &str) -> Result<Option<UserStory>>;

    fn update_story(&self, id: &str, updates: &StoryUpdates, actor: &str) -> Result<()>;

    /// Re-resolves orphan stories claiming the given Epic as parent and
    /// refreshes the uncovered flag of tests referencing it. Returns the
    /// number of stories re-resolved.
    fn reresolve_orphans(&self, epic_id: &str, actor: &str) -> Result<usize>;

    // -- Defects -------------------------------------------------------------

    fn create_defect(&self, defect: &Defect, actor: &str) -> Result<()>;

    fn get_defect(&self, id: &str) -> Result<Defect>;

    fn find_defect_by_tracker_ref(&self, tracker_ref: &str) -> Result<Option<Defect>>;

    /// The open auto-created defect for (test, category), if one exists.
    /// At most one can be open at any time.
    fn find_open_auto_defect(
        &self,
        test_id: &str,
        category: FailureCategory,
    ) -> Result<Option<Defect>>;

    fn update_defect(&self, id: &str, updates: &DefectUpdates, actor: &str) -> Result<()>;

    // -- Tests ---------------------------------------------------------------

    fn create_test(&self, test: &Test) -> Result<()>;

    fn find_test(&self, id: &str) -> Result<Option<Test>>;

    fn list_tests(&self) -> Result<Vec<Test>>;

    /// Merges a scanned test into an existing row: association sets are
    /// unioned, annotation metadata refreshed, orphan flags cleared.
    fn merge_test(&self, test: &Test) -> Result<()>;

    fn set_test_flags(&self, id: &str, flags: &TestFlags) -> Result<()>;

    // -- Executions ----------------------------------------------------------

    /// Records one execution outcome. Returns `false` (and writes nothing)
    /// when the outcome is stale under execution monotonicity.
    fn record_execution(&self, exec: &ExecutionRecord) -> Result<bool>;

    /// The most recent `limit` outcomes for a test, newest first.
    fn list_recent_executions(&self, test_id: &str, limit: u32) -> Result<Vec<ExecutionRecord>>;

    /// Prunes executions beyond the most recent `retain` per test,
    /// folding them into the per-test summary counters. Returns the
    /// number of rows pruned.
    fn prune_executions(&self, retain: u32) -> Result<u64>;

    // -- Dependencies --------------------------------------------------------

    /// Inserts an edge. `blocks` edges are cycle-checked; a cycle-forming
    /// insert fails with [`crate::StoreError::CycleDetected`] and leaves
    /// state unchanged.
    fn add_dependency(&self, dep: &EpicDependency, actor: &str) -> Result<()>;

    fn remove_dependency(
        &self,
        from: &str,
        to: &str,
        kind: DependencyKind,
        actor: &str,
    ) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Storage trait
// ---------------------------------------------------------------------------

/// Primary storage interface.
///
/// Single-shot methods run in their own transaction and publish change
/// events on commit. Multi-step operations use [`Storage::run_in_transaction`].
pub trait Storage: Send + Sync {
    // -- Transactions --------------------------------------------------------

    /// Runs a closure inside one transaction; rolls back if it errors.
    /// Change events are published only after commit.
    fn run_in_transaction(&self, f: &dyn Fn(&dyn Transaction) -> Result<()>) -> Result<()>;

    /// Registers a change-event subscriber.
    fn subscribe(&self, sub: Subscriber);

    // -- Reads ---------------------------------------------------------------

    fn get_capability(&self, id: &str) -> Result<Capability>;
    fn list_capabilities(&self) -> Result<Vec<Capability>>;

    fn get_epic(&self, id: &str) -> Result<Epic>;
    fn list_epics(&self) -> Result<Vec<Epic>>;

    fn get_story(&self, id: &str) -> Result<UserStory>;
    fn list_stories(&self) -> Result<Vec<UserStory>>;
    fn find_story_by_tracker_ref(&self, tracker_ref: &str) -> Result<Option<UserStory>>;

    fn get_defect(&self, id: &str) -> Result<Defect>;
    fn list_defects(&self) -> Result<Vec<Defect>>;

    fn find_test(&self, id: &str) -> Result<Option<Test>>;
    fn list_tests(&self) -> Result<Vec<Test>>;

    /// All dependency edges, optionally restricted to the given kinds.
    fn list_dependencies(&self, kinds: Option<&[DependencyKind]>) -> Result<Vec<EpicDependency>>;

    fn list_recent_executions(&self, test_id: &str, limit: u32) -> Result<Vec<ExecutionRecord>>;

    fn list_events(&self, entity_id: &str) -> Result<Vec<AuditEvent>>;

    fn get_meta(&self, key: &str) -> Result<Option<String>>;

    // -- Single-shot writes --------------------------------------------------

    fn create_capability(&self, cap: &Capability, actor: &str) -> Result<()>;
    fn create_epic(&self, epic: &Epic, actor: &str) -> Result<()>;
    fn update_epic(&self, id: &str, updates: &EpicUpdates, actor: &str) -> Result<()>;
    fn create_story(&self, story: &UserStory, actor: &str) -> Result<()>;
    fn update_story(&self, id: &str, updates: &StoryUpdates, actor: &str) -> Result<()>;
    fn create_defect(&self, defect: &Defect, actor: &str) -> Result<()>;
    fn update_defect(&self, id: &str, updates: &DefectUpdates, actor: &str) -> Result<()>;
    fn add_dependency(&self, dep: &EpicDependency, actor: &str) -> Result<()>;
    fn remove_dependency(
        &self,
        from: &str,
        to: &str,
        kind: DependencyKind,
        actor: &str,
    ) -> Result<()>;
    fn set_meta(&self, key: &str, value: &str) -> Result<()>;
}
