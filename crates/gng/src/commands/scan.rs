//! `gng scan` -- walk a source tree and reconcile Test rows.

use std::path::Path;

use anyhow::Result;

use gonogo_scanner::{ScanOptions, Scanner};

use crate::cli::ScanArgs;
use crate::context::RuntimeContext;
use crate::output;

pub fn run(ctx: &RuntimeContext, args: &ScanArgs) -> Result<i32> {
    let (store, mut config) = ctx.open()?;
    if !args.include.is_empty() {
        config.scanner.include = args.include.clone();
    }
    if !args.exclude.is_empty() {
        config.scanner.exclude = args.exclude.clone();
    }
    let scanner = Scanner::new(&store, &config);
    let options = ScanOptions {
        annotate_only: args.annotate_only,
    };

    let report = scanner.scan(Path::new(&args.root), &options)?;

    if ctx.json {
        output::print_json(&report)?;
    } else {
        if !ctx.quiet {
            println!(
                "scan: discovered={} created={} updated={} unchanged={} orphaned={} reactivated={}",
                report.discovered,
                report.created,
                report.updated,
                report.unchanged,
                report.orphaned,
                report.reactivated,
            );
        }
        output::print_report_summary(ctx, "scan", &report.report);
    }
    Ok(output::exit_code_for(&report.report))
}
