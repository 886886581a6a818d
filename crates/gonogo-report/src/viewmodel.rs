//! View-model shapes -- the engine's external contract.
//!
//! Field names and shapes are versioned with the engine; renderers
//! serialize these to JSON or HTML.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gonogo_core::enums::{
    DefectSeverity, DefectStatus, DependencyKind, EpicStatus, ExecutionStatus, StoryStatus,
    TestPriority,
};

// ---------------------------------------------------------------------------
// Matrix
// ---------------------------------------------------------------------------

/// Completion as a rational: `numerator` done story points out of
/// `denominator` total. `0/0` (empty Epic) stays distinct from `0/N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub numerator: u64,
    pub denominator: u64,
}

impl Completion {
    /// The ratio bounded to [0, 1]; 0 when the denominator is 0.
    pub fn ratio(&self) -> f64 {
        if self.denominator == 0 {
            0.0
        } else {
            (self.numerator as f64 / self.denominator as f64).clamp(0.0, 1.0)
        }
    }
}

/// A linked test with its last-run outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSummary {
    pub test_id: String,
    pub priority: TestPriority,
    pub last_status: Option<ExecutionStatus>,
    pub last_duration_ms: Option<i64>,
}

/// A linked defect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefectSummary {
    pub defect_id: String,
    pub severity: DefectSeverity,
    pub status: DefectStatus,
}

/// One requirements-matrix row: a UserStory with its linked artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixRow {
    pub user_story_id: String,
    pub title: String,
    pub status: StoryStatus,
    pub story_points: u32,
    pub epic_id: Option<String>,
    pub tests: Vec<TestSummary>,
    pub defects: Vec<DefectSummary>,
    /// `true` when the story has zero associated tests (coverage gap).
    pub coverage_flag: bool,
}

/// The full matrix plus the deadline flag.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatrixView {
    pub rows: Vec<MatrixRow>,
    /// Set when the per-query deadline expired before all rows were built.
    pub incomplete: bool,
}

/// Rolled-up Epic aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpicRollup {
    pub epic_id: String,
    pub title: String,
    pub status: EpicStatus,
    pub completion: Completion,
    pub story_count: u64,
    pub defect_count_by_severity: HashMap<DefectSeverity, u64>,
    pub last_updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Dependency graph
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    pub status: EpicStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
    pub kind: DependencyKind,
}

/// The dependency graph with detected cycles (empty for a healthy store;
/// the insert-time check keeps `blocks` acyclic).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DependencyGraphView {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub cycles: Vec<Vec<String>>,
}

/// The longest weighted `blocks` chain leading to a target Epic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticalPath {
    pub target: String,
    pub path: Vec<String>,
    pub total_points: u64,
}

// ---------------------------------------------------------------------------
// Persona dashboards
// ---------------------------------------------------------------------------

/// Per-Epic schedule health for the PM view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpicSchedule {
    pub epic_id: String,
    pub title: String,
    pub status: EpicStatus,
    pub completion: Completion,
    pub planned_end_at: Option<DateTime<Utc>>,
    /// Days late (positive) or early (negative); `None` without a plan.
    pub schedule_variance_days: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberVelocity {
    pub assignee: String,
    /// Story points per week over the rolling window.
    pub points_per_week: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskEntry {
    pub epic_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PmView {
    pub epics: Vec<EpicSchedule>,
    pub velocity: Vec<MemberVelocity>,
    pub risks: Vec<RiskEntry>,
    pub incomplete: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpicRoi {
    pub epic_id: String,
    pub title: String,
    pub completion: Completion,
    /// Configured value / configured cost; `None` without a cost.
    pub roi: Option<f64>,
    pub adoption_metric: Option<f64>,
}

/// Story points delivered in one week of the trend window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub week_start: DateTime<Utc>,
    pub points_done: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoView {
    pub epics: Vec<EpicRoi>,
    pub completion_trend: Vec<TrendPoint>,
    pub incomplete: bool,
}

/// Tests-per-story coverage counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coverage {
    pub covered_stories: u64,
    pub total_stories: u64,
}

/// Last-run pass-rate counters. Skipped and xfail/xpass are excluded from
/// the denominator and reported separately.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassRate {
    pub passed: u64,
    pub failed: u64,
    pub error: u64,
    pub skipped: u64,
    pub xfail: u64,
    pub xpass: u64,
}

impl PassRate {
    pub fn add(&mut self, status: ExecutionStatus) {
        match status {
            ExecutionStatus::Passed => self.passed += 1,
            ExecutionStatus::Failed => self.failed += 1,
            ExecutionStatus::Error => self.error += 1,
            ExecutionStatus::Skipped => self.skipped += 1,
            ExecutionStatus::Xfail => self.xfail += 1,
            ExecutionStatus::Xpass => self.xpass += 1,
        }
    }

    /// passed / (passed + failed + error), or `None` with an empty
    /// denominator.
    pub fn rate(&self) -> Option<f64> {
        let denominator = self.passed + self.failed + self.error;
        if denominator == 0 {
            None
        } else {
            Some(self.passed as f64 / denominator as f64)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpicQa {
    pub epic_id: String,
    pub title: String,
    pub coverage: Coverage,
    pub pass_rate: PassRate,
    /// Open defects per story point; 0 for an Epic without points.
    pub defect_density: f64,
    /// Σ severity-weight x age-weeks over open defects.
    pub tech_debt_score: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QaView {
    pub epics: Vec<EpicQa>,
    /// Stories with zero associated tests, across all epics.
    pub uncovered_stories: Vec<String>,
    pub incomplete: bool,
}
