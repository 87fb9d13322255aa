//! Plan domain module
//!
//! Payloads exchanged with the external planner: the scenario plan with its
//! patient descriptors and per-agent command lists, plus the bookkeeping
//! responses (queue status, step acknowledgements, analysis reports).

pub mod entities;

pub use entities::{
    AnalysisReport, Assignment, PatientDescriptor, QueueStatus, QueuedPatient, RoomLayout,
    ScenarioPlan, ScenarioRequest, StepAck,
};
