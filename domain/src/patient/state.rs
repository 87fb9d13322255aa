//! Patient lifecycle states and their permitted edges.
//!
//! ```text
//! Spawning ──> MovingToWait ──> Waiting ──> Following ──> InTreatment
//!                                  ^  │         │              │
//!                                  │  │         └──> Waiting   │
//!                                  └──┼────────────────────────┘
//!                                     └──> Exiting ──> Done
//! ```
//!
//! `Following -> Waiting` is the release edge (LEAVE, cancellation, stale
//! follow). `Done` has no outgoing edges.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PatientState {
    #[default]
    Spawning,
    MovingToWait,
    Waiting,
    Following,
    InTreatment,
    Exiting,
    Done,
}

impl PatientState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatientState::Spawning => "Spawning",
            PatientState::MovingToWait => "MovingToWait",
            PatientState::Waiting => "Waiting",
            PatientState::Following => "Following",
            PatientState::InTreatment => "InTreatment",
            PatientState::Exiting => "Exiting",
            PatientState::Done => "Done",
        }
    }

    /// Whether `self -> next` is an edge of the lifecycle.
    pub fn can_transition_to(&self, next: PatientState) -> bool {
        use PatientState::*;
        matches!(
            (self, next),
            (Spawning, MovingToWait)
                | (MovingToWait, Waiting)
                | (Waiting, Following)
                | (Waiting, Exiting)
                | (Following, InTreatment)
                | (Following, Waiting)
                | (InTreatment, Waiting)
                | (Exiting, Done)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PatientState::Done)
    }

    /// Whether the patient has started leaving the ward.
    pub fn is_departing(&self) -> bool {
        matches!(self, PatientState::Exiting | PatientState::Done)
    }
}

impl std::fmt::Display for PatientState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
