//! Progress notification port
//!
//! Defines the interface for reporting what the coordinator is doing.

use crate::use_cases::coordinator::{DispatchSummary, ScenarioOutcome};
use crate::use_cases::events::{ActionOutcome, StepCause};
use ward_domain::{AgentRole, Command, PatientId, StepCompletion};

/// Callback for progress updates during a scenario
///
/// Implementations live in the presentation layer. Every method has a no-op
/// default so reporters only implement what they display.
pub trait ScenarioProgress: Send + Sync {
    /// Free-form status line (planner failures, resets).
    fn on_status(&self, _message: &str) {}

    /// A plan was accepted and handed to the agents.
    fn on_dispatch(&self, _summary: &DispatchSummary) {}

    /// An agent finished (or abandoned) a command.
    fn on_action_complete(&self, _role: AgentRole, _command: &Command, _outcome: ActionOutcome) {}

    /// A patient moved past a pathway step.
    fn on_step_complete(&self, _patient: PatientId, _completion: &StepCompletion, _cause: StepCause) {
    }

    /// A patient left the ward; `remaining` patients are still active.
    fn on_patient_exit(&self, _patient: PatientId, _remaining: usize) {}

    /// The scenario finished.
    fn on_finalized(&self, _outcome: &ScenarioOutcome) {}
}

/// No-op progress notifier for when progress reporting is not needed
pub struct NoScenarioProgress;

impl ScenarioProgress for NoScenarioProgress {}
