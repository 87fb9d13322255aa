//! Travel configuration from TOML (`[travel]` section)

use serde::{Deserialize, Serialize};

/// Raw travel configuration from TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileTravelConfig {
    /// Walking speed in floor units per time-unit
    pub speed: f64,
    /// Fraction of `speed` used while escorting a patient
    pub escort_pace: f64,
}

impl Default for FileTravelConfig {
    fn default() -> Self {
        Self {
            speed: 2.0,
            escort_pace: 0.75,
        }
    }
}
