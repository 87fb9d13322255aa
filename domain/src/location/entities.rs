//! Location entities and the name -> location registry.

use super::{ENTRANCE, ICU, LAB, TREATMENT_BAY, TRIAGE, WAITING_AREA};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A point on the ward floor plan (x/z plane).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub z: f64,
}

impl Point {
    pub fn new(x: f64, z: f64) -> Self {
        Self { x, z }
    }

    /// Euclidean distance to another point.
    pub fn distance_to(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.z - other.z).powi(2)).sqrt()
    }
}

/// A named place agents and patients travel to.
///
/// Immutable after setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    pub arrival_point: Point,
    /// Nominal treatment duration in time-units (0 for non-treatment areas).
    #[serde(default)]
    pub treatment_duration: f64,
    /// Whether the treating agent must stay for the whole treatment.
    ///
    /// `false` marks the isolated-treatment location, where the agent may
    /// leave after the setup interval.
    #[serde(default = "default_presence_required")]
    pub presence_required: bool,
}

fn default_presence_required() -> bool {
    true
}

impl Location {
    pub fn new(name: impl Into<String>, arrival_point: Point) -> Self {
        Self {
            name: name.into(),
            arrival_point,
            treatment_duration: 0.0,
            presence_required: true,
        }
    }

    pub fn with_treatment(mut self, duration: f64) -> Self {
        self.treatment_duration = duration.max(0.0);
        self
    }

    /// Mark this location as allowing the agent to leave after setup.
    pub fn isolated(mut self) -> Self {
        self.presence_required = false;
        self
    }

    pub fn is_isolated(&self) -> bool {
        !self.presence_required
    }
}

/// Lookup table from location name to [`Location`].
///
/// Pure data, shared read-only by the travel adapter and the coordination core.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationRegistry {
    locations: BTreeMap<String, Location>,
    waiting_area: Option<String>,
    exit: Option<String>,
}

impl LocationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The default emergency ward layout.
    pub fn default_ward() -> Self {
        Self::new()
            .with_location(Location::new(ENTRANCE, Point::new(0.0, 0.0)))
            .with_location(Location::new(WAITING_AREA, Point::new(1.0, -2.0)))
            .with_location(Location::new(TRIAGE, Point::new(2.0, 0.0)).with_treatment(5.0))
            .with_location(Location::new(TREATMENT_BAY, Point::new(5.0, 3.0)).with_treatment(15.0))
            .with_location(Location::new(LAB, Point::new(8.0, -2.0)).with_treatment(20.0))
            .with_location(
                Location::new(ICU, Point::new(10.0, 5.0))
                    .with_treatment(45.0)
                    .isolated(),
            )
            .with_waiting_area(WAITING_AREA)
            .with_exit(ENTRANCE)
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.insert(location);
        self
    }

    pub fn with_waiting_area(mut self, name: impl Into<String>) -> Self {
        self.waiting_area = Some(name.into());
        self
    }

    pub fn with_exit(mut self, name: impl Into<String>) -> Self {
        self.exit = Some(name.into());
        self
    }

    pub fn insert(&mut self, location: Location) {
        self.locations.insert(location.name.clone(), location);
    }

    pub fn get(&self, name: &str) -> Option<&Location> {
        self.locations.get(name.trim())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// The configured waiting area, if it resolves to a known location.
    pub fn waiting_area(&self) -> Option<&Location> {
        self.waiting_area.as_deref().and_then(|n| self.get(n))
    }

    /// The configured exit, if it resolves to a known location.
    pub fn exit(&self) -> Option<&Location> {
        self.exit.as_deref().and_then(|n| self.get(n))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Location> {
        self.locations.values()
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }
}
