//! `gng` -- CLI for the gonogo requirements-traceability engine.
//!
//! Parses arguments with clap, resolves the runtime context, and
//! dispatches to command handlers. Exit codes: 0 success, 1
//! partial/warnings, 2 hard failure (Store unreachable or schema
//! mismatch).

mod cli;
mod commands;
mod context;
mod html;
mod output;

use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;

use cli::{Cli, Commands};
use context::RuntimeContext;

/// Tracks whether a Ctrl+C has already been received.
static CTRLC_RECEIVED: AtomicBool = AtomicBool::new(false);

fn main() {
    // First Ctrl+C: exit cleanly. Second: force exit.
    let _ = ctrlc::set_handler(|| {
        if CTRLC_RECEIVED.swap(true, Ordering::SeqCst) {
            std::process::exit(2);
        }
        std::process::exit(0);
    });

    let cli = Cli::parse();
    let ctx = RuntimeContext::from_global_args(&cli.global);

    if ctx.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("gng=debug,gonogo_store=debug,gonogo_scanner=debug,gonogo_sync=debug,gonogo_collector=debug,gonogo_report=debug")
            .with_writer(std::io::stderr)
            .init();
    }

    let result = match cli.command {
        Some(Commands::Version) => commands::version::run(&ctx),
        Some(Commands::Init(args)) => commands::init::run(&ctx, &args),
        Some(Commands::Scan(args)) => commands::scan::run(&ctx, &args),
        Some(Commands::Sync(args)) => commands::sync_cmd::run(&ctx, &args),
        Some(Commands::Collect(args)) => commands::collect::run(&ctx, &args),
        Some(Commands::Report(args)) => commands::report_cmd::run(&ctx, &args),
        Some(Commands::Admin(args)) => commands::admin::run(&ctx, &args),
        Some(Commands::Data(args)) => commands::data::run(&ctx, &args),
        None => {
            use clap::CommandFactory;
            Cli::command().print_help().ok();
            println!();
            Ok(0)
        }
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            if cli.global.json {
                let err_json = serde_json::json!({
                    "error": format!("{:#}", e),
                });
                if let Ok(s) = serde_json::to_string_pretty(&err_json) {
                    eprintln!("{s}");
                }
            } else {
                eprintln!("Error: {:#}", e);
            }
            std::process::exit(2);
        }
    }
}
