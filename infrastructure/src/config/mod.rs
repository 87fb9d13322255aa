//! Configuration file loading for ward-coordinator
//!
//! This module handles file I/O and merging of configuration from multiple sources.
//! The priority order (highest to lowest):
//!
//! 1. `WARD_*` environment variables
//! 2. `--config <path>` specified file
//! 3. Project root: `./ward.toml` or `./.ward.toml`
//! 4. XDG config: `$XDG_CONFIG_HOME/ward-coordinator/config.toml`
//! 5. Default values

mod file_config;
mod loader;

pub use file_config::{
    ConfigValidationError, DEFAULT_PLANNER_URL, FileConfig, FileLocationConfig,
    FileLoggingConfig, FilePlannerConfig, FileTravelConfig, FileWardConfig,
};
pub use loader::ConfigLoader;
