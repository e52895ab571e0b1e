//! Configuration management for Lyri.
//!
//! This module provides:
//! - TOML-based configuration with one section per pipeline concern
//! - Atomic file writes (write to temp, then rename)
//! - Section-level updates (only changed section is modified)
//! - Defaults for every missing key, plus value validation on load
//!
//! # Example
//!
//! ```no_run
//! use lyri_core::config::{ConfigManager, ConfigSection};
//!
//! let mut config = ConfigManager::new(".config/lyri.toml");
//! config.load_or_create().unwrap();
//!
//! println!("Artifacts in: {}", config.settings().paths.output_cache);
//!
//! config.settings_mut().executor.max_concurrent_tasks = 4;
//! config.update_section(ConfigSection::Executor).unwrap();
//! ```

mod manager;
mod settings;

pub use manager::{ConfigError, ConfigManager, ConfigResult};
pub use settings::{
    AlignmentSettings, CompositionSettings, ConfigSection, ExecutorSettings, LoggingSettings,
    PathSettings, SeparationSettings, Settings,
};
