//! Raw TOML configuration data types
//!
//! These structs represent the exact structure of the TOML config file.
//! They are deserialized directly and use application types where the
//! shape is identical (`[timing]` is a [`TimingPolicy`]).

mod logging;
mod planner;
mod travel;
mod ward;

pub use logging::FileLoggingConfig;
pub use planner::{DEFAULT_PLANNER_URL, FilePlannerConfig};
pub use travel::FileTravelConfig;
pub use ward::{FileLocationConfig, FileWardConfig, build_registry};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use ward_application::{CoordinatorConfig, TimingPolicy};
use ward_domain::LocationRegistry;

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigValidationError {
    #[error("timing.time_unit_ms cannot be 0")]
    InvalidTimeUnit,

    #[error("timing: {0}")]
    InvalidTiming(String),

    #[error("{field} must be positive (got {value})")]
    InvalidSpeed { field: &'static str, value: f64 },

    #[error("planner.timeout_seconds cannot be 0")]
    InvalidTimeout,

    #[error("location name cannot be empty")]
    EmptyLocationName,

    #[error("ward.{field} names unknown location '{name}'")]
    UnknownLocation { field: &'static str, name: String },
}

/// Complete configuration file structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub timing: TimingPolicy,
    pub planner: FilePlannerConfig,
    pub travel: FileTravelConfig,
    pub logging: FileLoggingConfig,
    pub ward: FileWardConfig,
    pub locations: Vec<FileLocationConfig>,
}

impl FileConfig {
    /// Check the configuration, returning every problem found.
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut issues = Vec::new();

        if self.timing.time_unit_ms == 0 {
            issues.push(ConfigValidationError::InvalidTimeUnit);
        }
        if let Err(message) = self.timing.validate() {
            issues.push(ConfigValidationError::InvalidTiming(message));
        }

        for (field, value) in [
            ("travel.speed", self.travel.speed),
            ("travel.escort_pace", self.travel.escort_pace),
        ] {
            if !(value.is_finite() && value > 0.0) {
                issues.push(ConfigValidationError::InvalidSpeed { field, value });
            }
        }

        if self.planner.timeout_seconds == 0 {
            issues.push(ConfigValidationError::InvalidTimeout);
        }

        if self.locations.iter().any(|l| l.name.trim().is_empty()) {
            issues.push(ConfigValidationError::EmptyLocationName);
        }

        let registry = self.location_registry();
        for (field, name) in [
            ("waiting_area", &self.ward.waiting_area),
            ("exit", &self.ward.exit),
        ] {
            if let Some(name) = name
                && !registry.contains(name)
            {
                issues.push(ConfigValidationError::UnknownLocation {
                    field,
                    name: name.clone(),
                });
            }
        }

        issues
    }

    /// Coordinator settings derived from `[timing]` and `[planner]`.
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        let config = CoordinatorConfig::new(self.timing.clone())
            .with_report_progress(self.planner.report_progress);
        match &self.planner.output_dir {
            Some(dir) => config.with_output_dir(dir.clone()),
            None => config,
        }
    }

    pub fn location_registry(&self) -> LocationRegistry {
        build_registry(&self.ward, &self.locations)
    }
}
