//! Planner port
//!
//! Defines the interface to the external planner that decides which patients
//! arrive and which commands each agent runs.

use async_trait::async_trait;
use thiserror::Error;
use ward_domain::{
    AnalysisReport, PatientId, QueueStatus, RoomLayout, ScenarioPlan, ScenarioRequest, StepAck,
};

/// Errors that can occur while talking to the planner
#[derive(Error, Debug)]
pub enum PlannerError {
    #[error("Planner unreachable: {0}")]
    Unreachable(String),

    #[error("Planner rejected the request: {0}")]
    Rejected(String),

    #[error("Malformed planner response: {0}")]
    Malformed(String),

    #[error("Not supported by this planner: {0}")]
    Unsupported(&'static str),

    #[error("Timeout")]
    Timeout,
}

/// Gateway to the planner
///
/// Only [`plan_scenario`](PlannerPort::plan_scenario) and the two progress
/// notifications are required; the rest default to "not supported" or a
/// harmless empty answer.
#[async_trait]
pub trait PlannerPort: Send + Sync {
    /// Ask for a fresh scenario from a free-text description.
    async fn plan_scenario(&self, request: &ScenarioRequest) -> Result<ScenarioPlan, PlannerError>;

    /// Report that the current step of `patient` was treated.
    async fn mark_step_complete(&self, patient: PatientId) -> Result<StepAck, PlannerError>;

    /// Report that `patient` has left the ward.
    async fn mark_patient_exit(&self, patient: PatientId) -> Result<(), PlannerError>;

    /// Ask for a plan covering the patients the planner still has queued.
    async fn next_plan(&self, _rooms: &[RoomLayout]) -> Result<ScenarioPlan, PlannerError> {
        Err(PlannerError::Unsupported("next_plan"))
    }

    /// The planner's view of its queue.
    async fn queue_status(&self) -> Result<QueueStatus, PlannerError> {
        Ok(QueueStatus::default())
    }

    /// Drop all planner-side state.
    async fn reset(&self) -> Result<(), PlannerError> {
        Ok(())
    }

    /// Export the planner's analysis of the finished scenario.
    async fn save_analysis(&self, _output_dir: Option<&str>) -> Result<AnalysisReport, PlannerError> {
        Ok(AnalysisReport {
            saved: false,
            reason: Some("analysis export not supported".to_string()),
            ..AnalysisReport::default()
        })
    }

    /// Whether the planner is reachable.
    async fn health(&self) -> Result<(), PlannerError> {
        Ok(())
    }
}
