//! Runtime context for command execution.

use std::env;
use std::path::PathBuf;

use anyhow::Context as _;

use gonogo_config::{EngineConfig, find_gonogo_dir, load_config};
use gonogo_store::SqliteStore;

use crate::cli::GlobalArgs;

/// Database file name inside the `.gonogo/` directory.
pub const DB_FILE: &str = "gonogo.db";

/// Runtime context passed to every command handler.
#[derive(Debug)]
pub struct RuntimeContext {
    /// Explicit `.gonogo` directory, if given.
    pub dir: Option<PathBuf>,

    /// Actor name for the audit trail.
    pub actor: String,

    /// Whether to produce JSON output.
    pub json: bool,

    pub verbose: bool,

    pub quiet: bool,
}

impl RuntimeContext {
    /// Builds a context from parsed global arguments.
    ///
    /// Actor priority: `--actor` flag > `GONOGO_ACTOR` env > `USER` env >
    /// `"unknown"`.
    pub fn from_global_args(global: &GlobalArgs) -> Self {
        Self {
            dir: global.dir.as_ref().map(PathBuf::from),
            actor: resolve_actor(global.actor.as_deref()),
            json: global.json,
            verbose: global.verbose,
            quiet: global.quiet,
        }
    }

    /// Resolves the `.gonogo` directory: explicit flag, else walk up from
    /// the current directory.
    pub fn resolve_dir(&self) -> anyhow::Result<PathBuf> {
        if let Some(ref dir) = self.dir {
            if dir.is_dir() {
                return Ok(dir.clone());
            }
            anyhow::bail!("gonogo directory not found: {}", dir.display());
        }
        let cwd = env::current_dir()?;
        find_gonogo_dir(&cwd).context("no .gonogo directory found (run 'gng init' first)")
    }

    /// Opens the store and loads the engine config. Schema mismatch or an
    /// unreachable store surfaces here, which the caller maps to exit 2.
    pub fn open(&self) -> anyhow::Result<(SqliteStore, EngineConfig)> {
        let dir = self.resolve_dir()?;
        let store = SqliteStore::open(dir.join(DB_FILE))
            .with_context(|| format!("failed to open store in {}", dir.display()))?;
        let mut config = load_config(&dir)?;
        // Journals default next to the database unless configured away.
        if config.collector.journal_dir == gonogo_config::CollectorConfig::default().journal_dir {
            config.collector.journal_dir = dir.join("journal").to_string_lossy().into_owned();
        }
        Ok((store, config))
    }
}

/// Resolves the actor name using the priority chain.
fn resolve_actor(flag_value: Option<&str>) -> String {
    if let Some(actor) = flag_value {
        if !actor.is_empty() {
            return actor.to_string();
        }
    }
    if let Ok(actor) = env::var("GONOGO_ACTOR") {
        if !actor.is_empty() {
            return actor;
        }
    }
    if let Ok(user) = env::var("USER").or_else(|_| env::var("USERNAME")) {
        if !user.is_empty() {
            return user;
        }
    }
    "unknown".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_actor_with_flag() {
        assert_eq!(resolve_actor(Some("alice")), "alice");
    }

    #[test]
    fn resolve_actor_falls_through() {
        assert!(!resolve_actor(Some("")).is_empty());
        assert!(!resolve_actor(None).is_empty());
    }
}
