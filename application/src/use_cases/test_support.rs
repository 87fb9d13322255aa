//! Test doubles shared by the use case tests.

use crate::ports::planner::{PlannerError, PlannerPort};
use crate::ports::progress::ScenarioProgress;
use crate::use_cases::coordinator::ScenarioOutcome;
use crate::use_cases::events::StepCause;
use crate::use_cases::shared::lock;
use async_trait::async_trait;
use std::sync::Mutex;
use ward_domain::{
    AnalysisReport, PatientId, QueueStatus, RoomLayout, ScenarioPlan, ScenarioRequest, StepAck,
    StepCompletion,
};

/// Planner that returns canned plans and records every call by name.
#[derive(Default)]
pub struct RecordingPlanner {
    plan: Option<ScenarioPlan>,
    next: Option<ScenarioPlan>,
    failing: bool,
    calls: Mutex<Vec<&'static str>>,
}

impl RecordingPlanner {
    pub fn with_plan(plan: ScenarioPlan) -> Self {
        Self {
            plan: Some(plan),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn with_next_plan(mut self, plan: ScenarioPlan) -> Self {
        self.next = Some(plan);
        self
    }

    pub fn count(&self, call: &str) -> usize {
        lock(&self.calls).iter().filter(|c| **c == call).count()
    }

    fn record(&self, call: &'static str) -> Result<(), PlannerError> {
        lock(&self.calls).push(call);
        if self.failing {
            return Err(PlannerError::Unreachable("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PlannerPort for RecordingPlanner {
    async fn plan_scenario(&self, _request: &ScenarioRequest) -> Result<ScenarioPlan, PlannerError> {
        self.record("plan_scenario")?;
        Ok(self.plan.clone().unwrap_or_default())
    }

    async fn mark_step_complete(&self, _patient: PatientId) -> Result<StepAck, PlannerError> {
        self.record("mark_step_complete")?;
        Ok(StepAck::default())
    }

    async fn mark_patient_exit(&self, _patient: PatientId) -> Result<(), PlannerError> {
        self.record("mark_patient_exit")
    }

    async fn next_plan(&self, _rooms: &[RoomLayout]) -> Result<ScenarioPlan, PlannerError> {
        self.record("next_plan")?;
        self.next
            .clone()
            .ok_or(PlannerError::Rejected("no queued patients".to_string()))
    }

    async fn queue_status(&self) -> Result<QueueStatus, PlannerError> {
        self.record("queue_status")?;
        Ok(QueueStatus::default())
    }

    async fn reset(&self) -> Result<(), PlannerError> {
        self.record("reset")
    }

    async fn save_analysis(&self, _output_dir: Option<&str>) -> Result<AnalysisReport, PlannerError> {
        self.record("save_analysis")?;
        Ok(AnalysisReport {
            saved: true,
            chart_path: Some("analysis/chart.png".to_string()),
            ..AnalysisReport::default()
        })
    }
}

/// Progress observer that keeps what it was told.
#[derive(Default)]
pub struct RecordingProgress {
    statuses: Mutex<Vec<String>>,
    steps: Mutex<Vec<StepCause>>,
    finalized: Mutex<usize>,
}

impl RecordingProgress {
    pub fn statuses(&self) -> Vec<String> {
        lock(&self.statuses).clone()
    }

    pub fn step_causes(&self) -> Vec<StepCause> {
        lock(&self.steps).clone()
    }

    pub fn finalized(&self) -> usize {
        *lock(&self.finalized)
    }
}

impl ScenarioProgress for RecordingProgress {
    fn on_status(&self, message: &str) {
        lock(&self.statuses).push(message.to_string());
    }

    fn on_step_complete(&self, _patient: PatientId, _completion: &StepCompletion, cause: StepCause) {
        lock(&self.steps).push(cause);
    }

    fn on_finalized(&self, _outcome: &ScenarioOutcome) {
        *lock(&self.finalized) += 1;
    }
}
