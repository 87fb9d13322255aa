//! Location domain module
//!
//! The ward's static layout: named locations with an arrival point,
//! a nominal treatment duration and the presence-required flag.

pub mod entities;

pub use entities::{Location, LocationRegistry, Point};

/// Entrance of the ward, also used as the exit.
pub const ENTRANCE: &str = "ENT";
/// Area where patients wait between pathway steps.
pub const WAITING_AREA: &str = "WAITING";
pub const TRIAGE: &str = "TRIAGE";
/// Treatment bay.
pub const TREATMENT_BAY: &str = "TB";
pub const LAB: &str = "LAB";
pub const ICU: &str = "ICU";
