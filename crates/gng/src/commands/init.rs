//! `gng init` -- create the .gonogo directory, config, and database.

use anyhow::Result;

use gonogo_config::{EngineConfig, ensure_gonogo_dir, save_config};
use gonogo_store::SqliteStore;

use crate::cli::InitArgs;
use crate::context::{DB_FILE, RuntimeContext};

pub fn run(ctx: &RuntimeContext, args: &InitArgs) -> Result<i32> {
    let base = std::env::current_dir()?;
    let dir = ensure_gonogo_dir(&base)?;

    let config_path = dir.join("config.yaml");
    if !config_path.exists() || args.force {
        save_config(&dir, &EngineConfig::default())?;
    }

    // Opening creates the schema.
    let store = SqliteStore::open(dir.join(DB_FILE))?;
    let version = store.schema_version()?;

    if ctx.json {
        println!(
            "{}",
            serde_json::json!({
                "dir": dir.display().to_string(),
                "schema_version": version,
            })
        );
    } else if !ctx.quiet {
        println!(
            "Initialized gonogo project in {} (schema version {version})",
            dir.display()
        );
    }
    Ok(0)
}
