//! `gng collect` -- replay a runner results file through the execution
//! collector.
//!
//! Works as the CLI harness binding of the collector's lifecycle events:
//! each line is a discovery plus an outcome, and end-of-file is run
//! completion.

use std::fs::File;
use std::io::{BufRead, BufReader};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::warn;

use gonogo_collector::{DefectMirror, ExecutionCollector, FailureInfo};
use gonogo_core::defect::Defect;
use gonogo_core::enums::ExecutionStatus;
use gonogo_sync::{HttpTracker, Synchronizer};

use crate::cli::CollectArgs;
use crate::context::RuntimeContext;
use crate::output;

/// One line of the results file.
#[derive(Debug, Deserialize)]
struct RunnerResult {
    test_id: String,
    status: ExecutionStatus,
    #[serde(default)]
    duration_ms: i64,
    #[serde(default)]
    failure_kind: Option<String>,
    #[serde(default)]
    failure_message: Option<String>,
}

/// Fire-and-forget mirroring through the Synchronizer.
struct MirrorAdapter<'a> {
    sync: Synchronizer<'a>,
}

impl DefectMirror for MirrorAdapter<'_> {
    fn request_mirror(&self, defect: &Defect) {
        if let Err(e) = self.sync.mirror_defect(defect) {
            // The defect stays usable locally; mirroring retries at the
            // next sync.
            warn!(defect = %defect.id, error = %e, "defect mirroring deferred");
        }
    }
}

pub fn run(ctx: &RuntimeContext, args: &CollectArgs) -> Result<i32> {
    let (store, config) = ctx.open()?;

    let client;
    let mirror_adapter;
    let mirror: Option<&dyn DefectMirror> = if config.tracker.base_url.is_empty() {
        None
    } else {
        client = HttpTracker::new(config.tracker.clone());
        mirror_adapter = MirrorAdapter {
            sync: Synchronizer::new(&store, &client, &config, &ctx.actor),
        };
        Some(&mirror_adapter)
    };

    let mut collector = ExecutionCollector::new(&store, &config, mirror)?;
    collector.on_run_start();

    let file = File::open(&args.input)
        .with_context(|| format!("failed to open results file {}", args.input))?;
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let result: RunnerResult = serde_json::from_str(trimmed)
            .with_context(|| format!("malformed results line {}", index + 1))?;

        collector.on_test_discovered(&result.test_id)?;
        let failure = match (&result.failure_kind, &result.failure_message) {
            (Some(kind), Some(message)) => Some(FailureInfo {
                kind: kind.clone(),
                message: message.clone(),
            }),
            (None, Some(message)) => Some(FailureInfo {
                kind: String::new(),
                message: message.clone(),
            }),
            _ => None,
        };
        collector.on_test_outcome(
            &result.test_id,
            result.status,
            result.duration_ms,
            failure.as_ref(),
        )?;
    }

    let report = collector.on_run_complete()?;

    if ctx.json {
        output::print_json(&report)?;
    } else {
        if !ctx.quiet {
            println!(
                "collect: discovered={} flushed={} stale={} auto_defects={}",
                report.discovered, report.flushed, report.stale, report.auto_defects,
            );
        }
        output::print_report_summary(ctx, "collect", &report.report);
    }
    Ok(output::exit_code_for(&report.report))
}
