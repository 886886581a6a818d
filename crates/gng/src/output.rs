//! Output helpers: JSON/text rendering and exit-code mapping.

use owo_colors::OwoColorize;
use serde::Serialize;

use gonogo_core::report::{OperationReport, Severity};

use crate::context::RuntimeContext;

/// Prints a serializable value as pretty JSON.
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Prints the counter line and bounded messages of an operation report.
pub fn print_report_summary(ctx: &RuntimeContext, label: &str, report: &OperationReport) {
    if ctx.quiet {
        return;
    }
    let ok = format!("{} ok", report.ok);
    let warnings = format!("{} warnings", report.warnings);
    let errors = format!("{} errors", report.errors);
    println!(
        "{label}: {}, {}, {}",
        ok.green(),
        if report.warnings > 0 {
            warnings.yellow().to_string()
        } else {
            warnings
        },
        if report.errors > 0 {
            errors.red().to_string()
        } else {
            errors
        },
    );

    for message in &report.messages {
        let tag = match message.severity {
            Severity::Warning => "warn".yellow().to_string(),
            Severity::Error => "error".red().to_string(),
        };
        println!("  [{tag}] {}: {}", message.item, message.detail);
    }
}

/// Maps an operation report to the CLI exit code (0/1).
pub fn exit_code_for(report: &OperationReport) -> i32 {
    report.exit_code()
}
