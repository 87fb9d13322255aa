//! Ward layout from TOML (`[ward]` section and `[[locations]]` tables)
//!
//! ```toml
//! [ward]
//! waiting_area = "WAITING"
//! exit = "ENT"
//!
//! [[locations]]
//! name = "XRAY"
//! x = 12.0
//! z = -4.0
//! treatment = 8.0
//! ```
//!
//! Listed locations are merged over the default ward unless
//! `replace_defaults` is set.

use serde::{Deserialize, Serialize};
use ward_domain::{Location, LocationRegistry, Point};

/// Raw ward settings from TOML
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileWardConfig {
    /// Start from an empty layout instead of the default ward
    pub replace_defaults: bool,
    pub waiting_area: Option<String>,
    pub exit: Option<String>,
}

/// One `[[locations]]` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileLocationConfig {
    pub name: String,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub z: f64,
    /// Nominal treatment duration in time-units
    #[serde(default)]
    pub treatment: f64,
    /// Whether the treating agent must stay for the whole treatment
    #[serde(default = "default_presence_required")]
    pub presence_required: bool,
}

fn default_presence_required() -> bool {
    true
}

impl FileLocationConfig {
    pub fn to_location(&self) -> Location {
        let location = Location::new(self.name.trim(), Point::new(self.x, self.z))
            .with_treatment(self.treatment);
        if self.presence_required {
            location
        } else {
            location.isolated()
        }
    }
}

/// Build the registry from the ward settings and location overrides.
pub fn build_registry(ward: &FileWardConfig, locations: &[FileLocationConfig]) -> LocationRegistry {
    let mut registry = if ward.replace_defaults {
        LocationRegistry::new()
    } else {
        LocationRegistry::default_ward()
    };
    for location in locations {
        registry.insert(location.to_location());
    }
    if let Some(name) = &ward.waiting_area {
        registry = registry.with_waiting_area(name.trim());
    }
    if let Some(name) = &ward.exit {
        registry = registry.with_exit(name.trim());
    }
    registry
}
