//! Application layer for ward-coordinator
//!
//! This crate contains the coordination runtime, port definitions and
//! application configuration. It depends only on the domain layer.

pub mod config;
pub mod ports;
pub mod use_cases;

// Re-export commonly used types
pub use config::{CoordinatorConfig, TimingPolicy};
pub use ports::{
    planner::{PlannerError, PlannerPort},
    progress::{NoScenarioProgress, ScenarioProgress},
    scenario_logger::{NoScenarioLogger, ScenarioLogger, ScenarioRecord},
    travel::{InstantTravel, Pace, TravelError, TravelPort, Traveler},
};
pub use use_cases::agent_executor::{AgentHandle, AgentSnapshot};
pub use use_cases::coordinator::{
    DispatchSummary, ScenarioCoordinator, ScenarioOutcome, ScenarioSnapshot,
};
pub use use_cases::events::{ActionOutcome, ScenarioEvent, ScenarioMessage, StepCause};
pub use use_cases::patient_runtime::{PatientDirectory, PatientView};
