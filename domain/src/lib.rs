//! Domain layer for ward-coordinator
//!
//! This crate contains the core entities and value objects of the ward.
//! It has no dependencies on the async runtime, infrastructure or
//! presentation concerns.
//!
//! # Core Concepts
//!
//! ## Patients
//!
//! A patient walks a pathway of locations. Its lifecycle is an explicit
//! state machine (`Spawning -> MovingToWait -> Waiting -> Following ->
//! InTreatment -> Waiting -> ... -> Exiting -> Done`) with a treatment timer
//! and a central invariant-repair function.
//!
//! ## Agents and Commands
//!
//! Two agents (nurse and doctor) execute ordered command lists produced by
//! an external planner. Commands keep the planner's literal wire shape.

pub mod agent;
pub mod command;
pub mod core;
pub mod location;
pub mod patient;
pub mod plan;

// Re-export commonly used types
pub use agent::{AgentRole, AgentState};
pub use command::{Command, CommandAction, WireCommand};
pub use core::error::DomainError;
pub use location::{Location, LocationRegistry, Point};
pub use patient::{Patient, PatientId, PatientState, Repair, Severity, StepCompletion};
pub use plan::{
    AnalysisReport, Assignment, PatientDescriptor, QueueStatus, QueuedPatient, RoomLayout,
    ScenarioPlan, ScenarioRequest, StepAck,
};
