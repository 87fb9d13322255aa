//! Agent executor: one task per agent running its command queue in order.
//!
//! The [`AgentHandle`] is the synchronous face used by the coordinator
//! (enqueue, clear, busy checks); the [`AgentExecutor`] task pops commands
//! one at a time and runs each inside a `select!` against the current
//! generation's cancellation token.
//!
//! [`AgentHandle::clear_queue`] drops queued commands, cancels the running
//! one, bumps the generation and returns the agent to `Idle`. Any patient
//! the agent was holding goes back to waiting; a running treatment is left
//! to its own timers.
//!
//! Lock order: patient cell, then agent status. The agent never locks a
//! patient while holding its own status lock.

use super::arbitration::{ArbitrationError, EscortArbiter};
use super::events::{ActionOutcome, EventSink, ScenarioEvent};
use super::patient_runtime::{PatientCell, PatientDirectory, TreatRefusal};
use super::shared::lock;
use crate::config::TimingPolicy;
use crate::ports::travel::{Pace, TravelError, TravelPort, Traveler};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use ward_domain::{AgentRole, AgentState, Command, CommandAction, Location, LocationRegistry, PatientId};

/// Point-in-time view of an agent.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentSnapshot {
    pub role: AgentRole,
    pub state: AgentState,
    pub location: Option<String>,
    pub holding: Option<PatientId>,
    pub current_command: Option<Command>,
    pub queued: usize,
}

impl AgentSnapshot {
    pub fn is_busy(&self) -> bool {
        self.current_command.is_some() || self.queued > 0
    }
}

struct QueueState {
    commands: VecDeque<Command>,
    /// The command being executed.
    running: Option<Command>,
    token: CancellationToken,
}

struct PatientHold {
    id: PatientId,
    cell: Weak<PatientCell>,
}

struct AgentStatus {
    state: AgentState,
    location: Option<String>,
    holding: Option<PatientHold>,
    generation: u64,
}

struct AgentShared {
    role: AgentRole,
    queue: Mutex<QueueState>,
    status: Mutex<AgentStatus>,
    wake: Notify,
    directory: PatientDirectory,
    shutdown: CancellationToken,
}

impl AgentShared {
    fn generation(&self) -> u64 {
        lock(&self.status).generation
    }

    /// Update the visible state unless the command's generation is stale.
    fn set_state(&self, generation: u64, state: AgentState) {
        let mut status = lock(&self.status);
        if status.generation == generation {
            status.state = state;
        }
    }

    fn set_location(&self, generation: u64, location: &str) {
        let mut status = lock(&self.status);
        if status.generation == generation {
            status.location = Some(location.to_string());
        }
    }

    fn location(&self) -> Option<String> {
        lock(&self.status).location.clone()
    }

    /// Record a hold on `cell`. Called from inside the patient lock.
    fn commit_hold(&self, generation: u64, cell: &Arc<PatientCell>) -> bool {
        let mut status = lock(&self.status);
        if status.generation != generation {
            return false;
        }
        status.holding = Some(PatientHold {
            id: cell.id(),
            cell: Arc::downgrade(cell),
        });
        true
    }

    /// Take the current hold if it matches `filter`, then release the patient.
    fn release_hold(&self, generation: Option<u64>, filter: impl FnOnce(PatientId) -> bool) {
        let hold = {
            let mut status = lock(&self.status);
            if generation.is_some_and(|g| g != status.generation) {
                return;
            }
            if status.holding.as_ref().is_some_and(|h| filter(h.id)) {
                status.holding.take()
            } else {
                None
            }
        };
        if let Some(hold) = hold
            && let Some(cell) = hold.cell.upgrade()
            && cell.release(self.role)
        {
            debug!(agent = %self.role, patient = %hold.id, "Released patient");
        }
    }

    fn clear_queue(&self) {
        let (dropped, old_token) = {
            let mut queue = lock(&self.queue);
            let dropped = queue.commands.len();
            queue.commands.clear();
            // the running command is abandoned along with the queue
            queue.running = None;
            (
                dropped,
                std::mem::replace(&mut queue.token, CancellationToken::new()),
            )
        };
        old_token.cancel();

        {
            let mut status = lock(&self.status);
            status.generation += 1;
            status.state = AgentState::Idle;
        }
        self.release_hold(None, |_| true);
        for cell in self.directory.held_by(self.role) {
            cell.release(self.role);
        }
        debug!(agent = %self.role, dropped, "Queue cleared");
    }
}

/// Cheap, cloneable handle to an agent.
#[derive(Clone)]
pub struct AgentHandle {
    shared: Arc<AgentShared>,
}

impl AgentHandle {
    pub fn role(&self) -> AgentRole {
        self.shared.role
    }

    /// Append a command to the queue.
    pub fn enqueue(&self, command: Command) {
        lock(&self.shared.queue).commands.push_back(command);
        self.shared.wake.notify_one();
    }

    pub fn enqueue_all(&self, commands: impl IntoIterator<Item = Command>) {
        lock(&self.shared.queue).commands.extend(commands);
        self.shared.wake.notify_one();
    }

    /// Drop every queued command and cancel the running one.
    ///
    /// Takes effect synchronously: once this returns, nothing from the old
    /// queue will change the agent's state or claim a patient.
    pub fn clear_queue(&self) {
        self.shared.clear_queue();
    }

    /// Whether a command is running or waiting in the queue.
    pub fn is_busy(&self) -> bool {
        let queue = lock(&self.shared.queue);
        queue.running.is_some() || !queue.commands.is_empty()
    }

    pub fn queue_len(&self) -> usize {
        lock(&self.shared.queue).commands.len()
    }

    pub fn state(&self) -> AgentState {
        lock(&self.shared.status).state
    }

    /// The patient the agent is currently holding.
    pub fn holding(&self) -> Option<PatientId> {
        lock(&self.shared.status).holding.as_ref().map(|h| h.id)
    }

    pub fn location(&self) -> Option<String> {
        self.shared.location()
    }

    pub fn snapshot(&self) -> AgentSnapshot {
        let (current_command, queued) = {
            let queue = lock(&self.shared.queue);
            (queue.running.clone(), queue.commands.len())
        };
        let status = lock(&self.shared.status);
        AgentSnapshot {
            role: self.shared.role,
            state: status.state,
            location: status.location.clone(),
            holding: status.holding.as_ref().map(|h| h.id),
            current_command,
            queued,
        }
    }

    /// Cancel everything and stop the executor task.
    pub fn shutdown(&self) {
        self.shared.clear_queue();
        self.shared.shutdown.cancel();
    }
}

/// Collaborators shared by both agents.
#[derive(Clone)]
pub struct ExecutorContext {
    pub timing: Arc<TimingPolicy>,
    pub travel: Arc<dyn TravelPort>,
    pub registry: Arc<LocationRegistry>,
    pub directory: PatientDirectory,
    pub events: EventSink,
}

pub struct AgentExecutor {
    shared: Arc<AgentShared>,
    ctx: ExecutorContext,
}

impl AgentExecutor {
    /// Start the executor task for `role`.
    ///
    /// The agent starts idle at the registry's exit (the ward entrance).
    pub fn spawn(
        role: AgentRole,
        ctx: ExecutorContext,
        shutdown: &CancellationToken,
    ) -> (AgentHandle, JoinHandle<()>) {
        let shared = Arc::new(AgentShared {
            role,
            queue: Mutex::new(QueueState {
                commands: VecDeque::new(),
                running: None,
                token: CancellationToken::new(),
            }),
            status: Mutex::new(AgentStatus {
                state: AgentState::Idle,
                location: ctx.registry.exit().map(|l| l.name.clone()),
                holding: None,
                generation: 0,
            }),
            wake: Notify::new(),
            directory: ctx.directory.clone(),
            shutdown: shutdown.child_token(),
        });
        let handle = AgentHandle {
            shared: shared.clone(),
        };
        let task = tokio::spawn(AgentExecutor { shared, ctx }.run());
        (handle, task)
    }

    fn role(&self) -> AgentRole {
        self.shared.role
    }

    async fn run(self) {
        debug!(agent = %self.role(), "Executor started");
        loop {
            let wake = self.shared.wake.notified();
            tokio::pin!(wake);
            wake.as_mut().enable();

            let next = {
                let mut queue = lock(&self.shared.queue);
                match queue.commands.pop_front() {
                    Some(command) => {
                        queue.running = Some(command.clone());
                        Some((command, queue.token.clone()))
                    }
                    None => None,
                }
            };

            let Some((command, token)) = next else {
                tokio::select! {
                    biased;
                    _ = self.shared.shutdown.cancelled() => break,
                    _ = &mut wake => {}
                }
                continue;
            };

            let generation = self.shared.generation();
            debug!(agent = %self.role(), command = %command.describe(), "Executing");
            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => None,
                outcome = self.execute(&command, generation) => Some(outcome),
            };

            match outcome {
                Some(outcome) => self.finish(command, outcome, generation),
                None => {
                    debug!(agent = %self.role(), command = %command.describe(), "Cancelled");
                }
            }
        }
        debug!(agent = %self.role(), "Executor stopped");
    }

    /// Wrap up a command that ran to the end.
    fn finish(&self, command: Command, outcome: ActionOutcome, generation: u64) {
        if self.shared.generation() != generation {
            // cleared while finishing; the new queue owns the agent now
            return;
        }
        let drained = lock(&self.shared.queue).commands.is_empty();
        if drained {
            // an idle agent does not keep anyone waiting behind it
            self.shared.release_hold(Some(generation), |_| true);
        }
        self.shared.set_state(generation, AgentState::Idle);
        lock(&self.shared.queue).running = None;

        info!(
            agent = %self.role(),
            command = %command.describe(),
            outcome = outcome.as_str(),
            "Action complete"
        );
        self.ctx.events.emit(ScenarioEvent::ActionComplete {
            role: self.role(),
            command,
            outcome,
        });
    }

    async fn execute(&self, command: &Command, generation: u64) -> ActionOutcome {
        match command.action {
            CommandAction::Move => self.run_move(command, generation).await,
            CommandAction::Escort => self.run_escort(command, generation).await,
            CommandAction::Treat => self.run_treat(command, generation).await,
            CommandAction::Leave => self.run_leave(command, generation),
            CommandAction::Wait => self.run_wait(command, generation).await,
        }
    }

    fn resolve_target(&self, command: &Command) -> Option<Location> {
        let Some(target) = command.target() else {
            warn!(agent = %self.role(), command = %command.describe(), "Command has no target");
            return None;
        };
        let location = self.ctx.registry.get(target).cloned();
        if location.is_none() {
            warn!(agent = %self.role(), target, "Unknown location; skipping command");
        }
        location
    }

    fn resolve_patient(&self, command: &Command) -> Option<Arc<PatientCell>> {
        let Some(id) = command.patient_id else {
            warn!(agent = %self.role(), command = %command.describe(), "Command has no patient");
            return None;
        };
        let cell = self.ctx.directory.get(id);
        if cell.is_none() {
            warn!(agent = %self.role(), patient = %id, "Patient no longer exists; skipping command");
        }
        cell
    }

    async fn travel(
        &self,
        generation: u64,
        destination: &Location,
        pace: Pace,
    ) -> Result<(), TravelError> {
        if self.shared.location().as_deref() == Some(destination.name.as_str()) {
            return Ok(());
        }
        self.ctx
            .travel
            .travel_to(Traveler::Agent(self.role()), destination, pace)
            .await?;
        self.shared.set_location(generation, &destination.name);
        Ok(())
    }

    // ==================== Commands ====================

    async fn run_move(&self, command: &Command, generation: u64) -> ActionOutcome {
        let Some(destination) = self.resolve_target(command) else {
            return ActionOutcome::Skipped;
        };
        self.shared.set_state(generation, AgentState::Moving);
        match self.travel(generation, &destination, Pace::Normal).await {
            Ok(()) => ActionOutcome::Completed,
            Err(e) => {
                warn!(agent = %self.role(), error = %e, "Move failed");
                ActionOutcome::Abandoned
            }
        }
    }

    async fn run_escort(&self, command: &Command, generation: u64) -> ActionOutcome {
        let Some(destination) = self.resolve_target(command) else {
            return ActionOutcome::Skipped;
        };
        let Some(cell) = self.resolve_patient(command) else {
            return ActionOutcome::Skipped;
        };
        let role = self.role();
        let patient = cell.id();

        // claiming a new patient lets go of the previous one
        self.shared
            .release_hold(Some(generation), |held| held != patient);
        self.shared.set_state(generation, AgentState::Escorting);

        let arbiter = EscortArbiter::new(&self.ctx.timing);
        let claim = arbiter
            .acquire(&cell, role, || self.shared.commit_hold(generation, &cell))
            .await;
        if let Err(e) = claim {
            warn!(agent = %role, patient = %patient, error = %e, "Escort abandoned");
            return match e {
                ArbitrationError::TimedOut(_) => ActionOutcome::Abandoned,
                ArbitrationError::Unavailable | ArbitrationError::Revoked => ActionOutcome::Skipped,
            };
        }

        // walk to the patient, then lead it to the destination
        let pickup = cell
            .location()
            .and_then(|name| self.ctx.registry.get(&name).cloned());
        let mut trip = Ok(());
        if let Some(pickup) = &pickup {
            trip = self.travel(generation, pickup, Pace::Normal).await;
        }
        if trip.is_ok() {
            trip = self.travel(generation, &destination, Pace::Escort).await;
        }
        if let Err(e) = trip {
            warn!(agent = %role, patient = %patient, error = %e, "Escort travel failed");
            self.shared.release_hold(Some(generation), |held| held == patient);
            return ActionOutcome::Abandoned;
        }

        if !cell.arrive_with(role, &destination.name) {
            warn!(agent = %role, patient = %patient, "Patient stopped following during escort");
            self.shared.release_hold(Some(generation), |held| held == patient);
            return ActionOutcome::Abandoned;
        }
        info!(agent = %role, patient = %patient, destination = %destination.name, "Escorted patient");
        ActionOutcome::Completed
    }

    async fn run_treat(&self, command: &Command, generation: u64) -> ActionOutcome {
        let Some(cell) = self.resolve_patient(command) else {
            return ActionOutcome::Skipped;
        };
        let role = self.role();
        let patient = cell.id();
        let timing = &self.ctx.timing;

        let site = cell
            .location()
            .or_else(|| command.target.clone())
            .and_then(|name| self.ctx.registry.get(&name).cloned());
        let nominal = timing.treatment_duration(
            site.as_ref().map(|l| l.treatment_duration),
            command_units(role, command),
        );
        let isolated = site.as_ref().is_some_and(|l| l.is_isolated());
        let stay = timing.agent_stay(nominal, isolated);

        match cell.begin_treatment(role, nominal, isolated) {
            Ok(_) => {
                self.shared.set_state(generation, AgentState::Treating);
                tokio::time::sleep(timing.sim(stay)).await;
                // the hold ends with the agent's part of the treatment
                self.shared.release_hold(Some(generation), |held| held == patient);
                ActionOutcome::Completed
            }
            Err(TreatRefusal::InTreatment { epoch, remaining }) => {
                info!(agent = %role, patient = %patient, "Joining treatment in progress");
                self.shared.set_state(generation, AgentState::Treating);
                cell.wait_treatment_end(epoch, timing.sim(stay.min(remaining)))
                    .await;
                ActionOutcome::Assisted
            }
            Err(refusal) => {
                warn!(agent = %role, patient = %patient, ?refusal, "Patient not ready for treatment; skipping");
                ActionOutcome::Skipped
            }
        }
    }

    fn run_leave(&self, command: &Command, generation: u64) -> ActionOutcome {
        let Some(cell) = self.resolve_patient(command) else {
            return ActionOutcome::Skipped;
        };
        let patient = cell.id();
        self.shared
            .release_hold(Some(generation), |held| held == patient);
        // a hold recorded under an older generation is released too
        cell.release(self.role());
        ActionOutcome::Completed
    }

    async fn run_wait(&self, command: &Command, generation: u64) -> ActionOutcome {
        self.shared.set_state(generation, AgentState::Waiting);
        let units = command_units(self.role(), command).unwrap_or(0.0);
        tokio::time::sleep(self.ctx.timing.sim(units)).await;
        ActionOutcome::Completed
    }
}

/// The command's duration, dropping values that cannot be a length of time.
fn command_units(role: AgentRole, command: &Command) -> Option<f64> {
    let units = command.duration?;
    if units > 0.0 {
        Some(units)
    } else {
        warn!(agent = %role, units, command = %command.describe(), "Ignoring non-positive duration");
        None
    }
}
