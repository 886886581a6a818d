//! `gng data export` / `gng data import` -- full-store JSONL round trip.

use std::fs::File;
use std::io::{BufReader, BufWriter};

use anyhow::{Context, Result};

use gonogo_core::jsonl::{ExportRecord, read_jsonl, write_jsonl};

use crate::cli::{DataArgs, DataCommands};
use crate::context::RuntimeContext;

pub fn run(ctx: &RuntimeContext, args: &DataArgs) -> Result<i32> {
    match &args.command {
        DataCommands::Export { output } => export(ctx, output),
        DataCommands::Import { input } => import(ctx, input),
    }
}

fn export(ctx: &RuntimeContext, output: &str) -> Result<i32> {
    let (store, _config) = ctx.open()?;
    let records = store.export_records()?;

    let file =
        File::create(output).with_context(|| format!("failed to create {output}"))?;
    let mut writer = BufWriter::new(file);
    write_jsonl(&mut writer, &records)?;

    if ctx.json {
        println!(
            "{}",
            serde_json::json!({"records": records.len(), "output": output})
        );
    } else if !ctx.quiet {
        println!("exported {} records to {output}", records.len());
    }
    Ok(0)
}

fn import(ctx: &RuntimeContext, input: &str) -> Result<i32> {
    let (store, _config) = ctx.open()?;

    let file = File::open(input).with_context(|| format!("failed to open {input}"))?;
    let mut records: Vec<ExportRecord> = Vec::new();
    let mut bad_lines = 0u64;
    for record in read_jsonl(BufReader::new(file)) {
        match record {
            Ok(record) => records.push(record),
            Err(e) => {
                eprintln!("skipping: {e}");
                bad_lines += 1;
            }
        }
    }

    let imported = store.import_records(records, &ctx.actor)?;

    if ctx.json {
        println!(
            "{}",
            serde_json::json!({"imported": imported, "skipped_lines": bad_lines})
        );
    } else if !ctx.quiet {
        println!("imported {imported} records ({bad_lines} lines skipped)");
    }
    Ok(if bad_lines > 0 { 1 } else { 0 })
}
