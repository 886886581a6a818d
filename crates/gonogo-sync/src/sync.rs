//! The sync engine: full and incremental reconciliation plus single-item
//! fetch, with per-item transactions and at-least-once token handling.

use std::cell::RefCell;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use gonogo_config::EngineConfig;
use gonogo_core::defect::Defect;
use gonogo_core::epic::Epic;
use gonogo_core::id::{EntityKind, parse_id};
use gonogo_core::report::OperationReport;
use gonogo_core::story::UserStory;
use gonogo_store::traits::{DefectUpdates, EpicUpdates, Storage, StoryUpdates, Transaction};

use crate::client::{ItemDraft, TrackerClient, TrackerItem};
use crate::mapping::{
    MappedKind, classify_ref, extract_capability, extract_parent, extract_points,
    extract_severity, map_defect_status, story_status_to_epic,
};
use crate::{Result, SyncError};

/// Metadata key holding the tracker change cursor.
pub const SINCE_TOKEN_KEY: &str = "sync:since_token";

/// The outcome of one sync operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncReport {
    pub items: u64,
    pub created: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub skipped: u64,
    /// Stories stored with an unresolved parent Epic.
    pub orphans: u64,
    pub pages: u64,
    pub since_token: Option<String>,

    #[serde(flatten)]
    pub report: OperationReport,
}

/// A locally resolved entity returned by [`Synchronizer::sync_entity`].
#[derive(Debug, Clone)]
pub enum SyncedEntity {
    Story(UserStory),
    Defect(Defect),
    Epic(Epic),
}

#[derive(Debug, Default)]
struct ItemOutcome {
    created: bool,
    updated: bool,
    skipped: bool,
    orphan: bool,
    warnings: Vec<String>,
}

/// Reconciles UserStory and Defect rows with the external tracker.
pub struct Synchronizer<'a> {
    store: &'a dyn Storage,
    client: &'a dyn TrackerClient,
    config: &'a EngineConfig,
    actor: String,
}

impl<'a> Synchronizer<'a> {
    pub fn new(
        store: &'a dyn Storage,
        client: &'a dyn TrackerClient,
        config: &'a EngineConfig,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            store,
            client,
            config,
            actor: actor.into(),
        }
    }

    /// Full reconciliation: ignores the stored cursor and pulls everything
    /// matching the configured filters.
    pub fn sync_full(&self) -> Result<SyncReport> {
        self.run(None)
    }

    /// Delta pull from the stored since-token (or from scratch when none
    /// has been persisted yet).
    pub fn sync_incremental(&self) -> Result<SyncReport> {
        let since = self.store.get_meta(SINCE_TOKEN_KEY)?;
        self.run(since)
    }

    /// On-demand single-item fetch, used by the Execution Collector when
    /// linking a freshly created Defect.
    pub fn sync_entity(&self, tracker_ref: &str) -> Result<Option<SyncedEntity>> {
        let Some(item) = self.client.fetch_item(tracker_ref)? else {
            return Ok(None);
        };

        let mut report = SyncReport::default();
        self.apply_item(&item, &mut report)?;

        let entity = match classify_ref(&item.external_id) {
            MappedKind::Story => self
                .store
                .find_story_by_tracker_ref(&item.external_id)?
                .map(SyncedEntity::Story),
            MappedKind::Defect => {
                let defects = self.store.list_defects()?;
                defects
                    .into_iter()
                    .find(|d| d.tracker_ref.as_deref() == Some(item.external_id.as_str()))
                    .map(SyncedEntity::Defect)
            }
            MappedKind::Epic => self.store.get_epic(&item.external_id).ok().map(SyncedEntity::Epic),
            MappedKind::Unknown => None,
        };
        Ok(entity)
    }

    /// Mirrors a locally created Defect to the tracker and links the
    /// returned reference. Callers treat failures as deferrable: the
    /// Defect stays usable locally.
    pub fn mirror_defect(&self, defect: &Defect) -> Result<String> {
        let mut body = String::new();
        if let Some(ref test_id) = defect.test_id {
            body.push_str(&format!("Test: {test_id}\n"));
        }
        if let Some(ref story) = defect.user_story_id {
            body.push_str(&format!("Parent: {story}\n"));
        }
        let draft = ItemDraft {
            title: defect.title.clone(),
            body,
            labels: vec![format!("severity:{}", defect.severity)],
        };

        let created = self.client.create_item(&draft)?;
        self.store.update_defect(
            &defect.id,
            &DefectUpdates {
                tracker_ref: Some(Some(created.external_id.clone())),
                ..Default::default()
            },
            &self.actor,
        )?;
        info!(defect = %defect.id, tracker_ref = %created.external_id, "defect mirrored to tracker");
        Ok(created.external_id)
    }

    // -----------------------------------------------------------------------
    // Pull loop
    // -----------------------------------------------------------------------

    fn run(&self, since: Option<String>) -> Result<SyncReport> {
        let deadline = Instant::now() + Duration::from_millis(self.config.tracker.sync_budget_ms);
        let mut report = SyncReport::default();
        let mut cursor: Option<String> = None;

        loop {
            if Instant::now() > deadline {
                // Committed pages stay committed; the token was only
                // advanced for full pages, so replay picks up the rest.
                return Err(SyncError::BudgetExhausted {
                    pages: report.pages,
                });
            }

            let page = self.client.fetch_page(since.as_deref(), cursor.as_deref())?;
            report.pages += 1;
            debug!(items = page.items.len(), page = report.pages, "tracker page received");

            for item in &page.items {
                report.items += 1;
                self.apply_item(item, &mut report)?;
            }

            // The new cursor is persisted only after every item in the
            // page has committed (at-least-once; items are idempotent by
            // tracker reference).
            if let Some(ref token) = page.since_token {
                self.store.set_meta(SINCE_TOKEN_KEY, token)?;
                report.since_token = Some(token.clone());
            }

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        info!(
            items = report.items,
            created = report.created,
            updated = report.updated,
            errors = report.report.errors,
            "sync complete"
        );
        Ok(report)
    }

    /// Applies one item in its own transaction. Integrity and validation
    /// rejections are item-level report errors; transient store failures
    /// propagate and abort the sync.
    fn apply_item(&self, item: &TrackerItem, report: &mut SyncReport) -> Result<()> {
        let outcome_cell = RefCell::new(ItemOutcome::default());
        let result = self.store.run_in_transaction(&|tx| {
            let outcome = apply_item_tx(tx, self.config, item, &self.actor)?;
            *outcome_cell.borrow_mut() = outcome;
            Ok(())
        });

        match result {
            Ok(()) => {
                let outcome = outcome_cell.into_inner();
                if outcome.created {
                    report.created += 1;
                } else if outcome.updated {
                    report.updated += 1;
                } else if outcome.skipped {
                    report.skipped += 1;
                } else {
                    report.unchanged += 1;
                }
                if outcome.orphan {
                    report.orphans += 1;
                }
                for warning in outcome.warnings {
                    report.report.warn(&item.external_id, warning);
                }
                report.report.record_ok();
                Ok(())
            }
            Err(e) if e.is_integrity() || matches!(e, gonogo_store::StoreError::Validation { .. }) =>
            {
                warn!(item = %item.external_id, error = %e, "item rejected");
                report.report.error(&item.external_id, e.to_string());
                Ok(())
            }
            Err(e) => Err(SyncError::Store(e)),
        }
    }
}

// ---------------------------------------------------------------------------
// Per-item mapping application
// ---------------------------------------------------------------------------

fn apply_item_tx(
    tx: &dyn Transaction,
    config: &EngineConfig,
    item: &TrackerItem,
    actor: &str,
) -> gonogo_store::Result<ItemOutcome> {
    match classify_ref(&item.external_id) {
        MappedKind::Story => apply_story(tx, config, item, actor),
        MappedKind::Defect => apply_defect(tx, item, actor),
        MappedKind::Epic => apply_epic(tx, config, item, actor),
        MappedKind::Unknown => {
            let mut outcome = ItemOutcome {
                skipped: true,
                ..Default::default()
            };
            outcome
                .warnings
                .push("unrecognized external id prefix".to_string());
            Ok(outcome)
        }
    }
}

fn apply_story(
    tx: &dyn Transaction,
    config: &EngineConfig,
    item: &TrackerItem,
    actor: &str,
) -> gonogo_store::Result<ItemOutcome> {
    let mut outcome = ItemOutcome::default();

    let mapped_status = if item.status_label.is_empty() {
        None
    } else {
        let mapped = config.map_status(&item.status_label);
        if mapped.is_none() {
            outcome.warnings.push(format!(
                "unknown status label {:?}; status unchanged",
                item.status_label
            ));
        }
        mapped
    };
    let points = extract_points(&item.labels);
    let parent = extract_parent(&item.body)
        .filter(|p| matches!(parse_id(p), Some((EntityKind::Epic, _))));

    match tx.find_story_by_tracker_ref(&item.external_id)? {
        None => {
            let mut story = UserStory::new(
                item.external_id.clone(),
                item.title.clone(),
                item.external_id.clone(),
            );
            story.story_points = points.unwrap_or(0);
            if let Some(status) = mapped_status {
                story.status = status;
                if status.is_done() {
                    story.done_at = Some(Utc::now());
                }
            }
            if let Some(ref assignee) = item.assignee {
                story.assignee = assignee.clone();
            }
            if let Some(parent) = parent {
                if tx.epic_exists(&parent)? {
                    story.epic_id = Some(parent);
                } else {
                    outcome
                        .warnings
                        .push(format!("parent epic {parent} not ingested yet; stored as orphan"));
                    story.orphan_parent = Some(parent);
                    outcome.orphan = true;
                }
            }
            tx.create_story(&story, actor)?;
            outcome.created = true;
        }
        Some(existing) => {
            let mut updates = StoryUpdates::default();
            let mut changed = false;

            if existing.title != item.title {
                updates.title = Some(item.title.clone());
                changed = true;
            }
            if let Some(points) = points {
                if existing.story_points != points {
                    updates.story_points = Some(points);
                    changed = true;
                }
            }
            if let Some(status) = mapped_status {
                if existing.status != status {
                    updates.status = Some(status);
                    changed = true;
                }
            }
            if let Some(ref assignee) = item.assignee {
                if existing.assignee != *assignee {
                    updates.assignee = Some(assignee.clone());
                    changed = true;
                }
            }
            if let Some(parent) = parent {
                if existing.epic_id.as_deref() != Some(parent.as_str()) {
                    if tx.epic_exists(&parent)? {
                        updates.epic_id = Some(Some(parent));
                        updates.orphan_parent = Some(None);
                        changed = true;
                    } else if existing.orphan_parent.as_deref() != Some(parent.as_str()) {
                        outcome.warnings.push(format!(
                            "parent epic {parent} not ingested yet; stored as orphan"
                        ));
                        updates.epic_id = Some(None);
                        updates.orphan_parent = Some(Some(parent));
                        outcome.orphan = true;
                        changed = true;
                    }
                }
            }

            if changed {
                tx.update_story(&existing.id, &updates, actor)?;
                outcome.updated = true;
            }
        }
    }

    Ok(outcome)
}

fn apply_defect(
    tx: &dyn Transaction,
    item: &TrackerItem,
    actor: &str,
) -> gonogo_store::Result<ItemOutcome> {
    let mut outcome = ItemOutcome::default();

    let mapped_status = if item.status_label.is_empty() {
        None
    } else {
        let mapped = map_defect_status(&item.status_label);
        if mapped.is_none() {
            outcome.warnings.push(format!(
                "unknown status label {:?}; status unchanged",
                item.status_label
            ));
        }
        mapped
    };
    let severity = extract_severity(&item.labels);
    let parent_story = extract_parent(&item.body)
        .filter(|p| matches!(parse_id(p), Some((EntityKind::Story, _))));

    match tx.find_defect_by_tracker_ref(&item.external_id)? {
        None => {
            let mut defect = Defect::new(item.external_id.clone(), item.title.clone());
            defect.tracker_ref = Some(item.external_id.clone());
            if let Some(severity) = severity {
                defect.severity = severity;
            }
            if let Some(status) = mapped_status {
                defect.status = status;
                if !status.is_open() {
                    defect.resolved_at = Some(Utc::now());
                }
            }
            if let Some(story) = parent_story {
                if tx.story_exists(&story)? {
                    defect.user_story_id = Some(story);
                } else {
                    outcome
                        .warnings
                        .push(format!("parent story {story} not ingested yet; link deferred"));
                }
            }
            tx.create_defect(&defect, actor)?;
            outcome.created = true;
        }
        Some(existing) => {
            let mut updates = DefectUpdates::default();
            let mut changed = false;

            if existing.title != item.title {
                updates.title = Some(item.title.clone());
                changed = true;
            }
            if let Some(severity) = severity {
                if existing.severity != severity {
                    updates.severity = Some(severity);
                    changed = true;
                }
            }
            if let Some(status) = mapped_status {
                if existing.status != status {
                    updates.status = Some(status);
                    changed = true;
                }
            }
            if let Some(story) = parent_story {
                if existing.user_story_id.as_deref() != Some(story.as_str()) {
                    if tx.story_exists(&story)? {
                        updates.user_story_id = Some(Some(story));
                        changed = true;
                    } else {
                        outcome.warnings.push(format!(
                            "parent story {story} not ingested yet; link deferred"
                        ));
                    }
                }
            }

            if changed {
                tx.update_defect(&existing.id, &updates, actor)?;
                outcome.updated = true;
            }
        }
    }

    Ok(outcome)
}

/// Epic items mirror status (and capability link) only; the Epic body is
/// authored locally, and an Epic the Store does not know is skipped.
fn apply_epic(
    tx: &dyn Transaction,
    config: &EngineConfig,
    item: &TrackerItem,
    actor: &str,
) -> gonogo_store::Result<ItemOutcome> {
    let mut outcome = ItemOutcome::default();

    if !tx.epic_exists(&item.external_id)? {
        outcome.skipped = true;
        outcome
            .warnings
            .push("epic not authored locally; item skipped".to_string());
        return Ok(outcome);
    }

    let current = tx.get_epic(&item.external_id)?;
    let mut updates = EpicUpdates::default();
    let mut changed = false;

    if let Some(story_status) = config.map_status(&item.status_label) {
        match story_status_to_epic(story_status) {
            Some(epic_status) if epic_status != current.status => {
                if current.status.is_regression_to(epic_status) {
                    // Mirrored statuses never silently regress the lattice.
                    outcome.warnings.push(format!(
                        "tracker label would regress {} -> {}; requires admin override",
                        current.status, epic_status
                    ));
                } else {
                    updates.status = Some(epic_status);
                    changed = true;
                }
            }
            Some(_) => {}
            None => {
                outcome.warnings.push(format!(
                    "status label {:?} has no epic equivalent",
                    item.status_label
                ));
            }
        }
    } else if !item.status_label.is_empty() {
        outcome.warnings.push(format!(
            "unknown status label {:?}; status unchanged",
            item.status_label
        ));
    }

    if let Some(capability) = extract_capability(&item.labels) {
        if current.capability_id.as_deref() != Some(capability.as_str()) {
            if tx.capability_exists(&capability)? {
                updates.capability_id = Some(Some(capability));
                changed = true;
            } else {
                outcome
                    .warnings
                    .push(format!("capability {capability} not known locally; link skipped"));
            }
        }
    }

    if changed {
        tx.update_epic(&item.external_id, &updates, actor)?;
        outcome.updated = true;
    }

    Ok(outcome)
}
