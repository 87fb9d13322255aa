//! Patient domain module
//!
//! Contains the patient lifecycle state machine, the pathway cursor and
//! the treatment timer, plus the invariant-repair function that keeps
//! them consistent.

pub mod entities;
pub mod state;
pub mod value_objects;

pub use entities::{Patient, Repair, StepCompletion};
pub use state::PatientState;
pub use value_objects::{PatientId, Severity};
