//! Scenario coordinator: owns both agents and the live patients.
//!
//! The coordinator receives a plan from the planner, spawns the patients it
//! describes, hands each agent its command list and then consumes the event
//! channel fed by agents and patients. A scenario is complete when neither
//! agent is busy and every patient has left; finalization runs once per
//! dispatched plan.
//!
//! Planner notifications (step completion, exits, analysis export) are
//! fire-and-forget: failures are logged and never hold up the agents.

use super::agent_executor::{AgentExecutor, AgentHandle, AgentSnapshot, ExecutorContext};
use super::events::{ActionOutcome, EventSink, ScenarioEvent, ScenarioMessage};
use super::patient_runtime::{PatientCell, PatientDirectory, PatientEnv, PatientView};
use crate::config::CoordinatorConfig;
use crate::ports::planner::{PlannerError, PlannerPort};
use crate::ports::progress::{NoScenarioProgress, ScenarioProgress};
use crate::ports::scenario_logger::{NoScenarioLogger, ScenarioLogger, ScenarioRecord};
use crate::ports::travel::TravelPort;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use ward_domain::{
    AgentRole, AnalysisReport, CommandAction, LocationRegistry, PatientId, QueueStatus,
    RoomLayout, ScenarioPlan, ScenarioRequest,
};

/// What was handed to the agents.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchSummary {
    pub scenario: u64,
    pub patients: usize,
    pub nurse_commands: usize,
    pub doctor_commands: usize,
    pub expected_reward: Option<f64>,
    pub strategy: Option<String>,
}

/// Tallies for a finished scenario.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioOutcome {
    pub scenario: u64,
    pub patients_admitted: usize,
    pub patients_exited: usize,
    pub steps_completed: usize,
    /// Steps finished by a safety net or a waiting timeout.
    pub forced_steps: usize,
    pub actions: usize,
    pub abandoned_actions: usize,
    /// Scenario duration in simulation units.
    pub elapsed_units: f64,
}

/// Point-in-time view of the whole ward.
#[derive(Debug, Clone)]
pub struct ScenarioSnapshot {
    pub scenario: u64,
    pub finalized: bool,
    pub agents: Vec<AgentSnapshot>,
    pub patients: Vec<PatientView>,
}

struct ScenarioTally {
    admitted: usize,
    exited: usize,
    steps: usize,
    forced_steps: usize,
    actions: usize,
    abandoned: usize,
    started_at: Instant,
}

impl ScenarioTally {
    fn new() -> Self {
        Self {
            admitted: 0,
            exited: 0,
            steps: 0,
            forced_steps: 0,
            actions: 0,
            abandoned: 0,
            started_at: Instant::now(),
        }
    }
}

/// How a plan is installed.
enum PlanMode {
    /// Drop every live patient and start over.
    Replace,
    /// Keep live patients and the scenario; only admit descriptors not seen yet.
    Continue,
}

pub struct ScenarioCoordinator {
    planner: Arc<dyn PlannerPort>,
    config: CoordinatorConfig,
    registry: Arc<LocationRegistry>,
    patient_env: PatientEnv,
    directory: PatientDirectory,
    nurse: AgentHandle,
    doctor: AgentHandle,
    executors: Vec<JoinHandle<()>>,
    events: EventSink,
    inbox: mpsc::UnboundedReceiver<ScenarioMessage>,
    scenario_tag: Arc<AtomicU64>,
    scenario_token: CancellationToken,
    root: CancellationToken,
    finalized: bool,
    last_outcome: Option<ScenarioOutcome>,
    tally: ScenarioTally,
    analysis: Option<JoinHandle<Option<AnalysisReport>>>,
    progress: Arc<dyn ScenarioProgress>,
    logger: Arc<dyn ScenarioLogger>,
}

impl ScenarioCoordinator {
    /// Create the coordinator and start both agent executors.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        planner: Arc<dyn PlannerPort>,
        travel: Arc<dyn TravelPort>,
        registry: LocationRegistry,
        config: CoordinatorConfig,
    ) -> Self {
        let (tx, inbox) = mpsc::unbounded_channel();
        let scenario_tag = Arc::new(AtomicU64::new(0));
        let events = EventSink::new(tx, scenario_tag.clone());
        let timing = Arc::new(config.timing.clone());
        let registry = Arc::new(registry);
        let directory = PatientDirectory::new();
        let root = CancellationToken::new();

        let ctx = ExecutorContext {
            timing: timing.clone(),
            travel: travel.clone(),
            registry: registry.clone(),
            directory: directory.clone(),
            events: events.clone(),
        };
        let (nurse, nurse_task) = AgentExecutor::spawn(AgentRole::Nurse, ctx.clone(), &root);
        let (doctor, doctor_task) = AgentExecutor::spawn(AgentRole::Doctor, ctx, &root);

        Self {
            planner,
            config,
            patient_env: PatientEnv {
                timing,
                travel,
                registry: registry.clone(),
                events: events.pinned(),
            },
            registry,
            directory,
            nurse,
            doctor,
            executors: vec![nurse_task, doctor_task],
            events,
            inbox,
            scenario_tag,
            scenario_token: root.child_token(),
            root,
            // nothing to finalize before the first plan
            finalized: true,
            last_outcome: None,
            tally: ScenarioTally::new(),
            analysis: None,
            progress: Arc::new(NoScenarioProgress),
            logger: Arc::new(NoScenarioLogger),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ScenarioProgress>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn ScenarioLogger>) -> Self {
        self.logger = logger;
        self
    }

    // ==================== Accessors ====================

    pub fn scenario(&self) -> u64 {
        self.scenario_tag.load(Ordering::SeqCst)
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn agent(&self, role: AgentRole) -> &AgentHandle {
        match role {
            AgentRole::Nurse => &self.nurse,
            AgentRole::Doctor => &self.doctor,
        }
    }

    pub fn directory(&self) -> &PatientDirectory {
        &self.directory
    }

    pub fn registry(&self) -> &LocationRegistry {
        &self.registry
    }

    pub fn snapshot(&self) -> ScenarioSnapshot {
        ScenarioSnapshot {
            scenario: self.scenario(),
            finalized: self.finalized,
            agents: vec![self.nurse.snapshot(), self.doctor.snapshot()],
            patients: self.directory.views(),
        }
    }

    // ==================== Planner round-trips ====================

    /// Ask the planner for a scenario and dispatch it.
    ///
    /// On planner failure a status message is reported and nothing changes.
    pub async fn start_scenario(
        &mut self,
        description: &str,
    ) -> Result<DispatchSummary, PlannerError> {
        let request = ScenarioRequest::new(description).with_rooms(&self.registry);
        info!(description, "Requesting scenario plan");
        match self.planner.plan_scenario(&request).await {
            Ok(plan) => Ok(self.dispatch(plan)),
            Err(e) => Err(self.planner_failed("plan_scenario", e)),
        }
    }

    /// Ask the planner for a plan covering its queued patients.
    ///
    /// Live patients are kept; agents get the new command lists.
    pub async fn request_next_plan(&mut self) -> Result<DispatchSummary, PlannerError> {
        let rooms = RoomLayout::from_registry(&self.registry);
        match self.planner.next_plan(&rooms).await {
            Ok(plan) => Ok(self.install(plan, PlanMode::Continue)),
            Err(e) => Err(self.planner_failed("next_plan", e)),
        }
    }

    pub async fn queue_status(&self) -> Result<QueueStatus, PlannerError> {
        self.planner.queue_status().await
    }

    fn planner_failed(&self, operation: &'static str, error: PlannerError) -> PlannerError {
        warn!(operation, error = %error, "Planner request failed");
        self.progress
            .on_status(&format!("Planner unavailable: {}", error));
        self.logger.log(ScenarioRecord::new(
            "planner_error",
            self.scenario(),
            json!({ "operation": operation, "error": error.to_string() }),
        ));
        error
    }

    // ==================== Dispatch ====================

    /// Replace whatever is running with `plan`.
    pub fn dispatch(&mut self, plan: ScenarioPlan) -> DispatchSummary {
        self.install(plan, PlanMode::Replace)
    }

    fn install(&mut self, plan: ScenarioPlan, mode: PlanMode) -> DispatchSummary {
        self.nurse.clear_queue();
        self.doctor.clear_queue();

        let scenario = match mode {
            PlanMode::Replace => {
                let cleared = self.directory.clear();
                if cleared > 0 {
                    debug!(cleared, "Cleared previous patients");
                }
                self.scenario_token.cancel();
                self.scenario_token = self.root.child_token();
                let scenario = self.scenario_tag.fetch_add(1, Ordering::SeqCst) + 1;
                self.patient_env.events = self.events.pinned();
                self.tally = ScenarioTally::new();
                scenario
            }
            // live patients report under the current scenario
            PlanMode::Continue => self.scenario(),
        };

        for descriptor in &plan.patients {
            let duplicate = self.directory.contains(descriptor.id);
            if duplicate {
                if matches!(mode, PlanMode::Continue) {
                    continue;
                }
                warn!(patient = %descriptor.id, "Duplicate patient id in plan; replacing");
            }
            let cell = PatientCell::spawn(
                descriptor.to_patient(),
                &self.patient_env,
                &self.scenario_token,
            );
            self.directory.insert(cell);
            if !duplicate {
                self.tally.admitted += 1;
            }
        }

        self.nurse.enqueue_all(plan.nurse_plan.iter().cloned());
        self.doctor.enqueue_all(plan.doctor_plan.iter().cloned());

        self.finalized = false;
        self.last_outcome = None;

        let summary = DispatchSummary {
            scenario,
            patients: self.directory.len(),
            nurse_commands: plan.nurse_plan.len(),
            doctor_commands: plan.doctor_plan.len(),
            expected_reward: plan.expected_reward,
            strategy: plan.assignment.as_ref().map(|a| a.strategy.clone()),
        };
        info!(
            scenario,
            patients = summary.patients,
            nurse_commands = summary.nurse_commands,
            doctor_commands = summary.doctor_commands,
            "Plan dispatched"
        );
        self.logger.log(ScenarioRecord::new(
            "plan_dispatched",
            scenario,
            json!({
                "patients": plan.patients,
                "nurse_plan": plan.nurse_plan,
                "doctor_plan": plan.doctor_plan,
                "expected_reward": plan.expected_reward,
            }),
        ));
        self.progress.on_dispatch(&summary);

        self.check_completion();
        summary
    }

    /// Cancel everything and tell the planner to forget the scenario.
    pub async fn reset(&mut self) {
        self.nurse.clear_queue();
        self.doctor.clear_queue();
        self.directory.clear();
        self.scenario_token.cancel();
        self.scenario_token = self.root.child_token();
        self.scenario_tag.fetch_add(1, Ordering::SeqCst);
        self.finalized = true;
        self.last_outcome = None;

        if let Err(e) = self.planner.reset().await {
            warn!(error = %e, "Planner reset failed");
        }
        self.logger
            .log(ScenarioRecord::new("scenario_reset", self.scenario(), json!({})));
        self.progress.on_status("Scenario reset");
    }

    // ==================== Events ====================

    /// Process one event. Returns the outcome if it completed the scenario.
    pub fn handle(&mut self, message: ScenarioMessage) -> Option<ScenarioOutcome> {
        if message.scenario != self.scenario() {
            debug!(scenario = message.scenario, "Ignoring event from a previous scenario");
            return None;
        }

        match message.event {
            ScenarioEvent::ActionComplete {
                role,
                command,
                outcome,
            } => {
                self.tally.actions += 1;
                if outcome == ActionOutcome::Abandoned {
                    self.tally.abandoned += 1;
                }
                self.logger.log(ScenarioRecord::new(
                    "action_complete",
                    message.scenario,
                    json!({
                        "agent": role,
                        "command": command,
                        "outcome": outcome.as_str(),
                    }),
                ));
                self.progress.on_action_complete(role, &command, outcome);

                if command.action == CommandAction::Treat
                    && outcome == ActionOutcome::Completed
                    && let Some(patient) = command.patient_id
                {
                    self.notify_step_complete(patient);
                }
            }
            ScenarioEvent::StepComplete {
                patient,
                completion,
                cause,
            } => {
                self.tally.steps += 1;
                if cause.is_forced() {
                    self.tally.forced_steps += 1;
                }
                self.logger.log(ScenarioRecord::new(
                    "step_complete",
                    message.scenario,
                    json!({
                        "patient": patient,
                        "completed_step": completion.completed_step,
                        "exiting": completion.exiting,
                        "cause": cause.as_str(),
                    }),
                ));
                self.progress.on_step_complete(patient, &completion, cause);
            }
            ScenarioEvent::PatientExited { patient } => {
                if self.directory.remove(patient).is_some() {
                    self.tally.exited += 1;
                }
                let remaining = self.directory.len();
                info!(patient = %patient, remaining, "Patient exited");
                self.logger.log(ScenarioRecord::new(
                    "patient_exit",
                    message.scenario,
                    json!({ "patient": patient, "remaining": remaining }),
                ));
                self.progress.on_patient_exit(patient, remaining);
                self.notify_exit(patient);
            }
        }

        self.check_completion()
    }

    /// Process events until the scenario completes.
    ///
    /// Returns immediately with the stored outcome if it already has.
    pub async fn run_until_finalized(&mut self) -> Option<ScenarioOutcome> {
        if self.finalized {
            return self.last_outcome.clone();
        }
        if let Some(outcome) = self.check_completion() {
            return Some(outcome);
        }
        while let Some(message) = self.inbox.recv().await {
            if let Some(outcome) = self.handle(message) {
                return Some(outcome);
            }
        }
        None
    }

    /// Wait for the next event without processing it.
    pub async fn next_message(&mut self) -> Option<ScenarioMessage> {
        self.inbox.recv().await
    }

    fn check_completion(&mut self) -> Option<ScenarioOutcome> {
        if self.finalized
            || self.nurse.is_busy()
            || self.doctor.is_busy()
            || !self.directory.is_empty()
        {
            return None;
        }
        Some(self.finalize())
    }

    fn finalize(&mut self) -> ScenarioOutcome {
        self.finalized = true;
        let outcome = ScenarioOutcome {
            scenario: self.scenario(),
            patients_admitted: self.tally.admitted,
            patients_exited: self.tally.exited,
            steps_completed: self.tally.steps,
            forced_steps: self.tally.forced_steps,
            actions: self.tally.actions,
            abandoned_actions: self.tally.abandoned,
            elapsed_units: self
                .config
                .timing
                .to_sim_units(self.tally.started_at.elapsed()),
        };
        info!(
            scenario = outcome.scenario,
            exited = outcome.patients_exited,
            steps = outcome.steps_completed,
            elapsed = outcome.elapsed_units,
            "Scenario complete"
        );
        self.logger.log(ScenarioRecord::new(
            "scenario_complete",
            outcome.scenario,
            json!({
                "patients_admitted": outcome.patients_admitted,
                "patients_exited": outcome.patients_exited,
                "steps_completed": outcome.steps_completed,
                "forced_steps": outcome.forced_steps,
                "actions": outcome.actions,
                "abandoned_actions": outcome.abandoned_actions,
                "elapsed_units": outcome.elapsed_units,
            }),
        ));
        self.progress.on_finalized(&outcome);
        self.export_analysis();
        self.last_outcome = Some(outcome.clone());
        outcome
    }

    // ==================== Planner notifications ====================

    fn notify_step_complete(&self, patient: PatientId) {
        if !self.config.report_progress {
            return;
        }
        let planner = self.planner.clone();
        tokio::spawn(async move {
            match planner.mark_step_complete(patient).await {
                Ok(ack) => debug!(patient = %patient, complete = ack.patient_complete, "Step acknowledged"),
                Err(e) => warn!(patient = %patient, error = %e, "Could not report step completion"),
            }
        });
    }

    fn notify_exit(&self, patient: PatientId) {
        if !self.config.report_progress {
            return;
        }
        let planner = self.planner.clone();
        tokio::spawn(async move {
            if let Err(e) = planner.mark_patient_exit(patient).await {
                warn!(patient = %patient, error = %e, "Could not report patient exit");
            }
        });
    }

    fn export_analysis(&mut self) {
        let planner = self.planner.clone();
        let output_dir = self.config.output_dir.clone();
        let logger = self.logger.clone();
        let scenario = self.scenario();
        self.analysis = Some(tokio::spawn(async move {
            match planner.save_analysis(output_dir.as_deref()).await {
                Ok(report) => {
                    if report.saved {
                        info!(chart = ?report.chart_path, data = ?report.data_path, "Analysis saved");
                    } else {
                        debug!(reason = ?report.reason, "Analysis not saved");
                    }
                    logger.log(ScenarioRecord::new("analysis_saved", scenario, json!(report)));
                    Some(report)
                }
                Err(e) => {
                    warn!(error = %e, "Analysis export failed");
                    None
                }
            }
        }));
    }

    /// Wait for the analysis export started by the last finalization.
    pub async fn analysis_report(&mut self) -> Option<AnalysisReport> {
        let task = self.analysis.take()?;
        task.await.ok().flatten()
    }

    /// Stop both agents and every patient, then wait for the executors.
    pub async fn shutdown(mut self) {
        self.nurse.shutdown();
        self.doctor.shutdown();
        self.directory.clear();
        self.root.cancel();
        for task in self.executors.drain(..) {
            let _ = task.await;
        }
    }
}

impl Drop for ScenarioCoordinator {
    fn drop(&mut self) {
        self.root.cancel();
    }
}
