//! Patient value objects
//!
//! - [`PatientId`] - externally assigned, unique per scenario
//! - [`Severity`] - triage category with the ward's default pathway

use crate::core::error::DomainError;
use crate::location::{ICU, LAB, TREATMENT_BAY, TRIAGE};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Unique identifier of a patient, assigned by the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatientId(u32);

impl PatientId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl From<u32> for PatientId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for PatientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Triage category of a patient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Severity {
    #[default]
    Minor,
    Moderate,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Minor => "Minor",
            Severity::Moderate => "Moderate",
            Severity::Critical => "Critical",
        }
    }

    /// Standard pathway through the ward for this category.
    pub fn default_pathway(&self) -> Vec<String> {
        let steps: &[&str] = match self {
            Severity::Critical => &[TRIAGE, TREATMENT_BAY, ICU],
            Severity::Moderate => &[TRIAGE, TREATMENT_BAY, LAB, TREATMENT_BAY],
            Severity::Minor => &[TRIAGE, TREATMENT_BAY],
        };
        steps.iter().map(|s| s.to_string()).collect()
    }

    /// Time-units within which treatment should be complete.
    pub fn default_deadline(&self) -> f64 {
        match self {
            Severity::Critical => 25.0,
            Severity::Moderate => 45.0,
            Severity::Minor => 30.0,
        }
    }

    pub fn requires_doctor(&self) -> bool {
        matches!(self, Severity::Critical)
    }
}

impl FromStr for Severity {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "minor" => Ok(Severity::Minor),
            "moderate" => Ok(Severity::Moderate),
            "critical" => Ok(Severity::Critical),
            other => Err(DomainError::UnknownSeverity(other.to_string())),
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
