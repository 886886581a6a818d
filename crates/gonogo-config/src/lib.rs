//! Configuration management for the gonogo traceability engine.

pub mod config;
pub mod gonogo_dir;

pub use config::{
    CollectorConfig, ConfigError, EngineConfig, ReportConfig, Result, ScannerConfig,
    TrackerConfig, load_config, save_config,
};
pub use gonogo_dir::{ensure_gonogo_dir, find_gonogo_dir, find_gonogo_dir_or_error};
