//! Clap argument definitions for `gng`.

use clap::{Args, Parser, Subcommand, ValueEnum};

/// gng -- requirements traceability engine.
#[derive(Debug, Parser)]
#[command(name = "gng", version, about = "Requirements traceability: scan, sync, collect, report")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Global arguments shared by every command.
#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Path to the .gonogo directory (default: walk up from cwd).
    #[arg(long, global = true, env = "GONOGO_DIR")]
    pub dir: Option<String>,

    /// Emit JSON instead of human-readable output.
    #[arg(long, global = true)]
    pub json: bool,

    /// Actor recorded in the audit trail.
    #[arg(long, global = true, env = "GONOGO_ACTOR")]
    pub actor: Option<String>,

    /// Verbose logging to stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output.
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print version information.
    Version,

    /// Initialize a .gonogo directory in the current working directory.
    Init(InitArgs),

    /// Scan a source tree for annotated tests and reconcile the store.
    Scan(ScanArgs),

    /// Synchronize UserStories and Defects with the external tracker.
    Sync(SyncArgs),

    /// Replay a test-runner results file through the execution collector.
    Collect(CollectArgs),

    /// Produce matrix, graph, or dashboard reports.
    Report(ReportArgs),

    /// Administrative operations.
    Admin(AdminArgs),

    /// Export or import the full store as JSONL.
    Data(DataArgs),
}

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Overwrite an existing config file with defaults.
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Root of the source tree to scan.
    #[arg(default_value = ".")]
    pub root: String,

    /// Parse and report only; skip all store writes.
    #[arg(long)]
    pub annotate_only: bool,

    /// Override the configured include globs (repeatable).
    #[arg(long)]
    pub include: Vec<String>,

    /// Override the configured exclude globs (repeatable).
    #[arg(long)]
    pub exclude: Vec<String>,
}

#[derive(Debug, Args)]
pub struct SyncArgs {
    /// Full reconciliation instead of an incremental delta pull.
    #[arg(long)]
    pub full: bool,
}

#[derive(Debug, Args)]
pub struct CollectArgs {
    /// JSONL results file: one {test_id, status, duration_ms,
    /// failure_kind?, failure_message?} object per line.
    #[arg(long)]
    pub input: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    Json,
    Html,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportView {
    Matrix,
    Graph,
    Pm,
    Po,
    Qa,
}

#[derive(Debug, Args)]
pub struct ReportArgs {
    #[arg(long, value_enum, default_value_t = ReportFormat::Json)]
    pub format: ReportFormat,

    #[arg(long, value_enum, default_value_t = ReportView::Matrix)]
    pub view: ReportView,

    /// Restrict the matrix to one Epic.
    #[arg(long)]
    pub epic: Option<String>,

    /// Restrict the matrix to one Capability.
    #[arg(long)]
    pub capability: Option<String>,

    /// Restrict the matrix to stories with a test carrying this tag.
    #[arg(long)]
    pub component: Option<String>,

    /// Restrict the matrix to stories in this status.
    #[arg(long)]
    pub status: Option<String>,

    /// Restrict the matrix to stories with a test of this priority.
    #[arg(long)]
    pub priority: Option<String>,

    /// Compute the critical path to this Epic (graph view).
    #[arg(long)]
    pub target: Option<String>,
}

#[derive(Debug, Args)]
pub struct AdminArgs {
    #[command(subcommand)]
    pub command: AdminCommands,
}

#[derive(Debug, Subcommand)]
pub enum AdminCommands {
    /// Verify the store is reachable and the schema matches.
    HealthCheck,

    /// Create a capability.
    CreateCapability {
        name: String,
        #[arg(long, default_value = "")]
        description: String,
    },

    /// Create an epic.
    CreateEpic {
        title: String,
        #[arg(long)]
        capability: Option<String>,
        #[arg(long)]
        points_value_cents: Option<i64>,
        #[arg(long)]
        points_cost_cents: Option<i64>,
    },

    /// Set an epic's status. Lattice regressions require --force and are
    /// logged as administrative overrides.
    SetStatus {
        epic_id: String,
        status: String,
        #[arg(long)]
        force: bool,
    },

    /// Add a dependency edge between epics.
    DepAdd {
        from: String,
        to: String,
        #[arg(long, default_value = "blocks")]
        kind: String,
        #[arg(long, default_value = "")]
        rationale: String,
    },

    /// Remove a dependency edge.
    DepRemove {
        from: String,
        to: String,
        #[arg(long, default_value = "blocks")]
        kind: String,
    },

    /// Show the audit trail for an entity.
    Events { entity_id: String },
}

#[derive(Debug, Args)]
pub struct DataArgs {
    #[command(subcommand)]
    pub command: DataCommands,
}

#[derive(Debug, Subcommand)]
pub enum DataCommands {
    /// Export the full store as JSONL.
    Export {
        #[arg(long)]
        output: String,
    },

    /// Import a JSONL export into the store.
    Import {
        #[arg(long)]
        input: String,
    },
}
