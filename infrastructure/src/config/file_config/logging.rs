//! Logging configuration from TOML (`[logging]` section)

use serde::{Deserialize, Serialize};

/// Raw logging configuration from TOML
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileLoggingConfig {
    /// Directory for JSONL scenario logs. Disabled when unset.
    pub scenario_log_dir: Option<String>,
    /// File that receives the tracing output in addition to stderr
    pub log_file: Option<String>,
}
