//! `gng sync` -- reconcile with the external tracker.

use anyhow::Result;

use gonogo_sync::{HttpTracker, Synchronizer};

use crate::cli::SyncArgs;
use crate::context::RuntimeContext;
use crate::output;

pub fn run(ctx: &RuntimeContext, args: &SyncArgs) -> Result<i32> {
    let (store, config) = ctx.open()?;
    if config.tracker.base_url.is_empty() {
        anyhow::bail!("tracker.base_url is not configured (edit .gonogo/config.yaml)");
    }

    let client = HttpTracker::new(config.tracker.clone());
    let sync = Synchronizer::new(&store, &client, &config, &ctx.actor);

    let report = if args.full {
        sync.sync_full()?
    } else {
        sync.sync_incremental()?
    };

    if ctx.json {
        output::print_json(&report)?;
    } else {
        if !ctx.quiet {
            println!(
                "sync: items={} created={} updated={} unchanged={} orphans={} pages={}",
                report.items,
                report.created,
                report.updated,
                report.unchanged,
                report.orphans,
                report.pages,
            );
        }
        output::print_report_summary(ctx, "sync", &report.report);
    }
    Ok(output::exit_code_for(&report.report))
}
