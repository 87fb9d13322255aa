//! Domain error types

use crate::patient::{PatientId, PatientState};
use thiserror::Error;

/// Domain-level errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error("Patient {patient}: invalid transition {from} -> {to}")]
    InvalidTransition {
        patient: PatientId,
        from: PatientState,
        to: PatientState,
    },

    #[error("Patient {0} has already left the ward")]
    PatientDone(PatientId),

    #[error("Unknown command action: {0}")]
    UnknownAction(String),

    #[error("Patient id out of range: {0}")]
    InvalidPatientId(i64),

    #[error("Unknown location: {0}")]
    UnknownLocation(String),

    #[error("Unknown severity: {0}")]
    UnknownSeverity(String),
}

impl DomainError {
    /// Check if this error came from a rejected state machine edge
    pub fn is_invalid_transition(&self) -> bool {
        matches!(
            self,
            DomainError::InvalidTransition { .. } | DomainError::PatientDone(_)
        )
    }
}
