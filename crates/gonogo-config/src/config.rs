//! Configuration types and loading for the gonogo engine.
//!
//! The main entry point is [`EngineConfig`], which represents the contents
//! of `.gonogo/config.yaml`. Each component receives the config record at
//! construction; there are no global singletons. Configuration is loaded
//! with [`load_config`] and saved with [`save_config`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

use gonogo_core::enums::{DefectSeverity, FailureCategory, StoryStatus};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// The configuration file contained invalid YAML.
    #[error("failed to parse config file: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// The `.gonogo/` directory was not found.
    #[error("no .gonogo directory found (run 'gng init' first)")]
    GonogoDirNotFound,
}

/// A specialized `Result` type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Tracker connection and retry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Base URL of the tracker API.
    #[serde(default)]
    pub base_url: String,

    /// API token (usually injected via environment at load time).
    #[serde(default)]
    pub token: String,

    /// Items per page for paginated pulls.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Tracker-side filters (label queries) applied to every pull.
    #[serde(default)]
    pub filters: Vec<String>,

    /// Retries per page before a sync error is surfaced.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff in milliseconds; doubles per attempt, with jitter.
    #[serde(default = "default_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Per-request deadline in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Overall budget for one sync operation in milliseconds.
    #[serde(default = "default_sync_budget_ms")]
    pub sync_budget_ms: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            token: String::new(),
            page_size: default_page_size(),
            filters: Vec::new(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_backoff_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            sync_budget_ms: default_sync_budget_ms(),
        }
    }
}

fn default_page_size() -> u32 {
    50
}

fn default_max_retries() -> u32 {
    4
}

fn default_backoff_ms() -> u64 {
    250
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_sync_budget_ms() -> u64 {
    120_000
}

/// Source scanner configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Glob patterns for test files.
    #[serde(default = "default_include_globs")]
    pub include: Vec<String>,

    /// Glob patterns excluded from the walk.
    #[serde(default = "default_exclude_globs")]
    pub exclude: Vec<String>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            include: default_include_globs(),
            exclude: default_exclude_globs(),
        }
    }
}

fn default_include_globs() -> Vec<String> {
    vec!["**/test_*.py".to_string(), "**/*_test.py".to_string()]
}

fn default_exclude_globs() -> Vec<String> {
    vec![
        "**/.git/**".to_string(),
        "**/node_modules/**".to_string(),
        "**/__pycache__/**".to_string(),
        "**/.venv/**".to_string(),
    ]
}

/// Execution collector configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Consecutive-failure threshold K for auto-Defect creation.
    #[serde(default = "default_threshold_k")]
    pub defect_threshold_k: u32,

    /// Window size N of recent outcomes examined for recurrence.
    #[serde(default = "default_window_n")]
    pub defect_window_n: u32,

    /// Outcomes per flush transaction.
    #[serde(default = "default_flush_chunk")]
    pub flush_chunk_size: usize,

    /// Buffered outcomes beyond this count are journal-only until restart.
    #[serde(default = "default_high_water")]
    pub high_water_mark: usize,

    /// Directory holding per-process execution journals.
    #[serde(default = "default_journal_dir")]
    pub journal_dir: String,

    /// Executions retained per test before prune-and-summarize.
    #[serde(default = "default_retention")]
    pub retention_executions: u32,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            defect_threshold_k: default_threshold_k(),
            defect_window_n: default_window_n(),
            flush_chunk_size: default_flush_chunk(),
            high_water_mark: default_high_water(),
            journal_dir: default_journal_dir(),
            retention_executions: default_retention(),
        }
    }
}

fn default_threshold_k() -> u32 {
    3
}

fn default_window_n() -> u32 {
    3
}

fn default_flush_chunk() -> usize {
    200
}

fn default_high_water() -> usize {
    10_000
}

fn default_journal_dir() -> String {
    ".gonogo/journal".to_string()
}

fn default_retention() -> u32 {
    50
}

/// Query & report engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Rolling window in weeks for velocity computation.
    #[serde(default = "default_rolling_window")]
    pub rolling_window_weeks: u32,

    /// Severity weights for the technical-debt score.
    #[serde(default = "default_debt_weights")]
    pub debt_weights: HashMap<DefectSeverity, f64>,

    /// Upper bound on cached rollup entries.
    #[serde(default = "default_cache_entries")]
    pub cache_max_entries: usize,

    /// Per-query deadline in milliseconds; expired queries return partial
    /// results flagged incomplete.
    #[serde(default = "default_query_deadline_ms")]
    pub query_deadline_ms: u64,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            rolling_window_weeks: default_rolling_window(),
            debt_weights: default_debt_weights(),
            cache_max_entries: default_cache_entries(),
            query_deadline_ms: default_query_deadline_ms(),
        }
    }
}

fn default_rolling_window() -> u32 {
    4
}

fn default_debt_weights() -> HashMap<DefectSeverity, f64> {
    HashMap::from([
        (DefectSeverity::Critical, 8.0),
        (DefectSeverity::High, 5.0),
        (DefectSeverity::Medium, 2.0),
        (DefectSeverity::Low, 1.0),
    ])
}

fn default_cache_entries() -> usize {
    1024
}

fn default_query_deadline_ms() -> u64 {
    5_000
}

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

/// The full engine configuration passed into each component at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Tracker status label -> canonical story status. Labels are matched
    /// case-insensitively; unknown labels leave status unchanged and are
    /// reported.
    #[serde(default = "default_status_map")]
    pub status_map: HashMap<String, StoryStatus>,

    /// Failure category -> severity for auto-created Defects.
    #[serde(default = "default_severity_map")]
    pub severity_map: HashMap<FailureCategory, DefectSeverity>,

    #[serde(default)]
    pub tracker: TrackerConfig,

    #[serde(default)]
    pub scanner: ScannerConfig,

    #[serde(default)]
    pub collector: CollectorConfig,

    #[serde(default)]
    pub report: ReportConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            status_map: default_status_map(),
            severity_map: default_severity_map(),
            tracker: TrackerConfig::default(),
            scanner: ScannerConfig::default(),
            collector: CollectorConfig::default(),
            report: ReportConfig::default(),
        }
    }
}

fn default_status_map() -> HashMap<String, StoryStatus> {
    HashMap::from([
        ("open".to_string(), StoryStatus::Planned),
        ("backlog".to_string(), StoryStatus::Planned),
        ("todo".to_string(), StoryStatus::Planned),
        ("in progress".to_string(), StoryStatus::InProgress),
        ("in review".to_string(), StoryStatus::InReview),
        ("done".to_string(), StoryStatus::Done),
        ("closed".to_string(), StoryStatus::Done),
        ("blocked".to_string(), StoryStatus::Blocked),
        ("cancelled".to_string(), StoryStatus::Cancelled),
        ("wontfix".to_string(), StoryStatus::Cancelled),
    ])
}

fn default_severity_map() -> HashMap<FailureCategory, DefectSeverity> {
    HashMap::from([
        (FailureCategory::Assertion, DefectSeverity::High),
        (FailureCategory::Timeout, DefectSeverity::Medium),
        (FailureCategory::Resource, DefectSeverity::Medium),
        (FailureCategory::Integration, DefectSeverity::High),
        (FailureCategory::Flaky, DefectSeverity::Low),
    ])
}

impl EngineConfig {
    /// Maps a tracker status label to the canonical status, if configured.
    pub fn map_status(&self, label: &str) -> Option<StoryStatus> {
        self.status_map.get(&label.to_lowercase()).copied()
    }

    /// Severity for an auto-created defect of the given failure category.
    pub fn severity_for(&self, category: FailureCategory) -> DefectSeverity {
        self.severity_map
            .get(&category)
            .copied()
            .unwrap_or(DefectSeverity::Medium)
    }

    /// Technical-debt weight for a severity.
    pub fn debt_weight(&self, severity: DefectSeverity) -> f64 {
        self.report
            .debt_weights
            .get(&severity)
            .copied()
            .unwrap_or(1.0)
    }
}

// ---------------------------------------------------------------------------
// Loading and saving
// ---------------------------------------------------------------------------

/// Load configuration from `config.yaml` inside the given `.gonogo/` directory.
///
/// If the file does not exist, a default [`EngineConfig`] is returned.
pub fn load_config(gonogo_dir: &Path) -> Result<EngineConfig> {
    let config_path = gonogo_dir.join("config.yaml");

    if !config_path.exists() {
        return Ok(EngineConfig::default());
    }

    let content = std::fs::read_to_string(&config_path)?;

    // An empty file is valid and yields default config.
    if content.trim().is_empty() {
        return Ok(EngineConfig::default());
    }

    let config: EngineConfig = serde_yaml::from_str(&content)?;
    Ok(config)
}

/// Save configuration to `config.yaml` inside the given `.gonogo/` directory.
///
/// The directory is created if it does not exist.
pub fn save_config(gonogo_dir: &Path, config: &EngineConfig) -> Result<()> {
    std::fs::create_dir_all(gonogo_dir)?;

    let config_path = gonogo_dir.join("config.yaml");
    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(config_path, yaml)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
