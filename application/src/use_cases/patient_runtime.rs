//! Patient runtime: one shared cell and one lifecycle task per patient.
//!
//! A [`PatientCell`] owns the [`Patient`] entity behind a mutex together
//! with the agent currently holding it. All mutations go through
//! [`PatientCell::mutate`], which runs invariant repair under the lock and
//! then wakes everyone waiting on the cell. The lock is never held across
//! an `.await`.
//!
//! Background work per patient:
//!
//! - the lifecycle task walks the patient to the waiting area, supervises
//!   the waiting-step timeouts and walks it out once the pathway is done
//! - every treatment starts a countdown plus a generic watchdog at twice
//!   the nominal duration, and for isolated locations a backup at
//!   `nominal + grace`; all of them carry the treatment epoch and become
//!   no-ops once it has moved on

use super::events::{EventSink, ScenarioEvent, StepCause};
use super::shared::{lock, read, write};
use crate::config::TimingPolicy;
use crate::ports::travel::{Pace, TravelPort, Traveler};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use ward_domain::{
    AgentRole, Location, LocationRegistry, Patient, PatientId, PatientState, Repair,
    StepCompletion,
};

/// Point-in-time copy of a patient and its holder.
#[derive(Debug, Clone)]
pub struct PatientView {
    pub patient: Patient,
    pub held_by: Option<AgentRole>,
}

/// Result of [`PatientCell::try_claim`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The patient now follows the claimant.
    Claimed,
    /// The claimant already held the following patient.
    AlreadyHeld,
    /// Someone or something else has the patient right now.
    Contended(Contention),
    /// The patient is leaving or gone.
    Unavailable,
    /// The claimant's commit hook refused (its command was cancelled).
    Revoked,
}

/// Why a claim could not be granted yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Contention {
    HeldByOther(AgentRole),
    InTreatment,
    /// Still spawning or walking to the waiting area.
    NotReady,
}

/// Why [`PatientCell::begin_treatment`] refused.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TreatRefusal {
    /// A treatment is already running.
    InTreatment { epoch: u64, remaining: f64 },
    /// The patient is not following the requesting agent.
    NotFollowing(PatientState),
    Departed,
}

struct PatientSlot {
    patient: Patient,
    held_by: Option<AgentRole>,
    /// When the patient last started waiting for its current step.
    waiting_since: Instant,
    #[cfg(test)]
    countdown_halted: bool,
    #[cfg(test)]
    claim_attempts: usize,
}

/// The parts of a slot that waiters react to.
#[derive(PartialEq)]
struct SlotMark {
    state: PatientState,
    step: usize,
    held_by: Option<AgentRole>,
    follow_target: Option<AgentRole>,
    location: Option<String>,
    epoch: u64,
}

impl SlotMark {
    fn of(slot: &PatientSlot) -> Self {
        Self {
            state: slot.patient.state(),
            step: slot.patient.current_step(),
            held_by: slot.held_by,
            follow_target: slot.patient.follow_target(),
            location: slot.patient.location().map(str::to_string),
            epoch: slot.patient.treatment_epoch(),
        }
    }
}

/// Everything a patient's background tasks need.
#[derive(Clone)]
pub struct PatientEnv {
    pub timing: Arc<TimingPolicy>,
    pub travel: Arc<dyn TravelPort>,
    pub registry: Arc<LocationRegistry>,
    pub events: EventSink,
}

pub struct PatientCell {
    id: PatientId,
    slot: Mutex<PatientSlot>,
    changed: Notify,
    events: EventSink,
    timing: Arc<TimingPolicy>,
    shutdown: CancellationToken,
}

impl PatientCell {
    fn new(patient: Patient, env: &PatientEnv, shutdown: CancellationToken) -> Self {
        Self {
            id: patient.id,
            slot: Mutex::new(PatientSlot {
                patient,
                held_by: None,
                waiting_since: Instant::now(),
                #[cfg(test)]
                countdown_halted: false,
                #[cfg(test)]
                claim_attempts: 0,
            }),
            changed: Notify::new(),
            events: env.events.clone(),
            timing: env.timing.clone(),
            shutdown,
        }
    }

    /// Create the cell and start its lifecycle task.
    ///
    /// The cell's background work stops when `parent` is cancelled or the
    /// cell is removed from its [`PatientDirectory`].
    pub fn spawn(patient: Patient, env: &PatientEnv, parent: &CancellationToken) -> Arc<Self> {
        let cell = Arc::new(Self::new(patient, env, parent.child_token()));
        tokio::spawn(cell.clone().run_lifecycle(env.clone()));
        cell
    }

    pub fn id(&self) -> PatientId {
        self.id
    }

    pub fn view(&self) -> PatientView {
        let slot = lock(&self.slot);
        PatientView {
            patient: slot.patient.clone(),
            held_by: slot.held_by,
        }
    }

    pub fn state(&self) -> PatientState {
        lock(&self.slot).patient.state()
    }

    pub fn held_by(&self) -> Option<AgentRole> {
        lock(&self.slot).held_by
    }

    pub fn location(&self) -> Option<String> {
        lock(&self.slot).patient.location().map(str::to_string)
    }

    pub(crate) fn changed(&self) -> &Notify {
        &self.changed
    }

    pub(crate) fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Run `f` under the patient lock, then repair invariants and wake waiters.
    ///
    /// Waiters are only woken when something they can observe changed; a
    /// refused claim or a countdown tick leaves them asleep.
    fn mutate<R>(&self, f: impl FnOnce(&mut PatientSlot) -> R) -> R {
        let (result, repairs, changed) = {
            let mut slot = lock(&self.slot);
            let before = SlotMark::of(&slot);
            let result = f(&mut slot);
            let repairs = slot.patient.repair();
            let after = SlotMark::of(&slot);
            if after.state == PatientState::Waiting
                && (before.state, before.step) != (after.state, after.step)
            {
                slot.waiting_since = Instant::now();
            }
            (result, repairs, before != after)
        };
        let repaired = !repairs.is_empty();
        for repair in repairs {
            self.report_repair(repair);
        }
        if changed || repaired {
            self.changed.notify_waiters();
        }
        result
    }

    fn report_repair(&self, repair: Repair) {
        match repair {
            Repair::ForcedCompletion(completion) => {
                warn!(patient = %self.id, step = completion.completed_step, "Expired treatment completed by repair");
                self.emit_step(completion, StepCause::Repair);
            }
            Repair::ForcedExit => {
                warn!(patient = %self.id, "Pathway exhausted while waiting; exiting");
            }
            Repair::ClearedStaleTimer { remaining } => {
                warn!(patient = %self.id, remaining, "Cleared stale treatment timer");
            }
            Repair::ClearedFollowTarget(agent) => {
                debug!(patient = %self.id, agent = %agent, "Cleared stale follow target");
            }
        }
    }

    fn emit_step(&self, completion: StepCompletion, cause: StepCause) {
        self.events.emit(ScenarioEvent::StepComplete {
            patient: self.id,
            completion,
            cause,
        });
    }

    // ==================== Agent-facing operations ====================

    /// Try to make the patient follow `role`.
    ///
    /// `commit` runs under the patient lock right before the patient is
    /// taken; returning `false` aborts without touching the patient. The
    /// caller records its hold there, so "agent holds P" never becomes
    /// visible without "P held by agent".
    pub fn try_claim(&self, role: AgentRole, commit: impl FnOnce() -> bool) -> ClaimOutcome {
        self.mutate(|slot| {
            #[cfg(test)]
            {
                slot.claim_attempts += 1;
            }
            let state = slot.patient.state();
            if state.is_departing() {
                return ClaimOutcome::Unavailable;
            }
            // the treating agent keeps its hold for its stay; treatment wins
            if state == PatientState::InTreatment {
                return ClaimOutcome::Contended(Contention::InTreatment);
            }
            if let Some(holder) = slot.held_by
                && holder != role
            {
                return ClaimOutcome::Contended(Contention::HeldByOther(holder));
            }
            match state {
                PatientState::Spawning | PatientState::MovingToWait => {
                    ClaimOutcome::Contended(Contention::NotReady)
                }
                PatientState::Following
                    if slot.held_by == Some(role)
                        && slot.patient.follow_target() == Some(role) =>
                {
                    if commit() {
                        ClaimOutcome::AlreadyHeld
                    } else {
                        ClaimOutcome::Revoked
                    }
                }
                _ => {
                    if !commit() {
                        return ClaimOutcome::Revoked;
                    }
                    if slot.patient.stop_following() {
                        debug!(patient = %self.id, "Released stale follow before claim");
                    }
                    match slot.patient.begin_follow(role) {
                        Ok(()) => {
                            slot.held_by = Some(role);
                            ClaimOutcome::Claimed
                        }
                        Err(e) => {
                            warn!(patient = %self.id, error = %e, "Claim rejected by lifecycle");
                            ClaimOutcome::Unavailable
                        }
                    }
                }
            }
        })
    }

    /// Drop `role`'s hold; a patient following `role` goes back to waiting.
    ///
    /// Treatment is never touched. Returns whether anything changed.
    pub fn release(&self, role: AgentRole) -> bool {
        self.mutate(|slot| {
            let mut changed = false;
            if slot.held_by == Some(role) {
                slot.held_by = None;
                changed = true;
            }
            if slot.patient.state() == PatientState::Following
                && slot.patient.follow_target() == Some(role)
            {
                changed |= slot.patient.stop_following();
            }
            changed
        })
    }

    /// Record that the patient arrived at `location` behind `role`.
    ///
    /// Returns `false` if it stopped following `role` on the way.
    pub fn arrive_with(&self, role: AgentRole, location: &str) -> bool {
        self.mutate(|slot| {
            if slot.patient.state() != PatientState::Following
                || slot.patient.follow_target() != Some(role)
            {
                return false;
            }
            slot.patient.set_location(location).is_ok()
        })
    }

    /// Start treating the patient following `role` and arm its timers.
    pub fn begin_treatment(
        self: &Arc<Self>,
        role: AgentRole,
        nominal: f64,
        isolated: bool,
    ) -> Result<u64, TreatRefusal> {
        let epoch = self.mutate(|slot| {
            let state = slot.patient.state();
            match state {
                PatientState::InTreatment => Err(TreatRefusal::InTreatment {
                    epoch: slot.patient.treatment_epoch(),
                    remaining: slot.patient.treatment_remaining(),
                }),
                _ if state.is_departing() => Err(TreatRefusal::Departed),
                PatientState::Following if slot.patient.follow_target() == Some(role) => slot
                    .patient
                    .begin_treatment(nominal, isolated)
                    .map_err(|_| TreatRefusal::NotFollowing(state)),
                _ => Err(TreatRefusal::NotFollowing(state)),
            }
        })?;

        info!(patient = %self.id, agent = %role, nominal, isolated, epoch, "Treatment started");
        self.arm_treatment_timers(epoch, nominal, isolated);
        Ok(epoch)
    }

    /// Wait until treatment `epoch` is over or `limit` has passed.
    pub async fn wait_treatment_end(&self, epoch: u64, limit: Duration) {
        let deadline = Instant::now() + limit;
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let slot = lock(&self.slot);
                if slot.patient.state() != PatientState::InTreatment
                    || slot.patient.treatment_epoch() != epoch
                {
                    return;
                }
            }
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return,
                _ = tokio::time::sleep_until(deadline) => return,
                _ = &mut notified => {}
            }
        }
    }

    // ==================== Treatment timers ====================

    fn arm_treatment_timers(self: &Arc<Self>, epoch: u64, nominal: f64, isolated: bool) {
        tokio::spawn(self.clone().run_countdown(epoch));

        let watchdog = self.timing.sim(nominal * self.timing.generic_timeout_factor);
        tokio::spawn(self.clone().run_safety_net(epoch, watchdog, StepCause::Watchdog));

        if isolated {
            let backup = self.timing.sim(nominal + self.timing.isolated_backup_grace);
            tokio::spawn(self.clone().run_safety_net(epoch, backup, StepCause::IsolatedBackup));
        }
    }

    async fn run_countdown(self: Arc<Self>, epoch: u64) {
        let tick = self.timing.treatment_tick;
        let period = self.timing.sim(tick).max(Duration::from_micros(1));
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return,
                _ = interval.tick() => {}
            }

            #[cfg(test)]
            if lock(&self.slot).countdown_halted {
                return;
            }

            let step = self.mutate(|slot| {
                if slot.patient.state() != PatientState::InTreatment
                    || slot.patient.treatment_epoch() != epoch
                {
                    return Err(());
                }
                Ok(slot.patient.advance_treatment(epoch, tick))
            });
            match step {
                Ok(None) => continue,
                Ok(Some(completion)) => {
                    info!(patient = %self.id, step = completion.completed_step, "Treatment complete");
                    self.emit_step(completion, StepCause::Treatment);
                    return;
                }
                Err(()) => return,
            }
        }
    }

    async fn run_safety_net(self: Arc<Self>, epoch: u64, after: Duration, cause: StepCause) {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return,
            _ = tokio::time::sleep(after) => {}
        }
        let forced = self.mutate(|slot| slot.patient.force_complete_treatment(epoch));
        if let Some(completion) = forced {
            warn!(
                patient = %self.id,
                step = completion.completed_step,
                cause = cause.as_str(),
                "Treatment timer stalled; forcing completion"
            );
            self.emit_step(completion, cause);
        }
    }

    /// Stop the countdown so only the safety nets can finish the treatment.
    #[cfg(test)]
    pub(crate) fn halt_countdown(&self) {
        lock(&self.slot).countdown_halted = true;
    }

    #[cfg(test)]
    pub(crate) fn claim_attempts(&self) -> usize {
        lock(&self.slot).claim_attempts
    }

    // ==================== Lifecycle ====================

    async fn run_lifecycle(self: Arc<Self>, env: PatientEnv) {
        let entrance = env.registry.exit().map(|l| l.name.clone());
        if let Err(e) = self.mutate(|slot| slot.patient.place(entrance.as_deref())) {
            warn!(patient = %self.id, error = %e, "Could not place patient");
            return;
        }

        let waiting = env.registry.waiting_area().cloned();
        if let Some(area) = &waiting
            && !self.travel(&env, area).await
        {
            return;
        }
        let arrived = self.mutate(|slot| {
            slot.patient
                .arrive_at_waiting(waiting.as_ref().map(|l| l.name.as_str()))
        });
        match arrived {
            Ok(state) => debug!(patient = %self.id, state = %state, "Arrived at waiting area"),
            Err(e) => {
                warn!(patient = %self.id, error = %e, "Could not reach waiting area");
                return;
            }
        }

        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let (state, deadline) = {
                let slot = lock(&self.slot);
                let bound = self.timing.waiting_timeout(slot.patient.is_final_step());
                (slot.patient.state(), slot.waiting_since + bound)
            };
            match state {
                PatientState::Done => return,
                PatientState::Exiting => break,
                PatientState::Waiting => tokio::select! {
                    biased;
                    _ = self.shutdown.cancelled() => return,
                    _ = &mut notified => {}
                    _ = tokio::time::sleep_until(deadline) => self.on_waiting_timeout(),
                },
                _ => tokio::select! {
                    biased;
                    _ = self.shutdown.cancelled() => return,
                    _ = &mut notified => {}
                },
            }
        }

        self.depart(&env).await;
    }

    fn on_waiting_timeout(&self) {
        enum Timeout {
            NotDue,
            Skipped(StepCompletion),
            ForcedOut(usize),
        }

        let outcome = self.mutate(|slot| {
            if slot.patient.state() != PatientState::Waiting {
                return Timeout::NotDue;
            }
            let final_step = slot.patient.is_final_step();
            if Instant::now() < slot.waiting_since + self.timing.waiting_timeout(final_step) {
                return Timeout::NotDue;
            }
            let step = slot.patient.current_step();
            if final_step {
                match slot.patient.force_exit() {
                    Ok(()) => Timeout::ForcedOut(step),
                    Err(_) => Timeout::NotDue,
                }
            } else {
                match slot.patient.advance_waiting_step() {
                    Ok(completion) => Timeout::Skipped(completion),
                    Err(_) => Timeout::NotDue,
                }
            }
        });

        match outcome {
            Timeout::NotDue => {}
            Timeout::Skipped(completion) => {
                warn!(patient = %self.id, step = completion.completed_step, "Waited too long; skipping step");
                self.emit_step(completion, StepCause::WaitingTimeout);
            }
            Timeout::ForcedOut(step) => {
                warn!(patient = %self.id, step, "Waited too long at final step; exiting");
            }
        }
    }

    async fn depart(&self, env: &PatientEnv) {
        let exit = env.registry.exit().cloned();
        if let Some(exit) = &exit
            && !self.travel(env, exit).await
        {
            return;
        }
        match self.mutate(|slot| slot.patient.finish(exit.as_ref().map(|l| l.name.as_str()))) {
            Ok(()) => {
                info!(patient = %self.id, "Patient left the ward");
                self.events
                    .emit(ScenarioEvent::PatientExited { patient: self.id });
            }
            Err(e) => warn!(patient = %self.id, error = %e, "Could not finish patient"),
        }
    }

    /// Walk the patient on its own. Travel failures fall back to arriving
    /// directly; returns `false` only when the cell is shut down.
    async fn travel(&self, env: &PatientEnv, destination: &Location) -> bool {
        let trip = env
            .travel
            .travel_to(Traveler::Patient(self.id), destination, Pace::Normal);
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => false,
            result = trip => {
                if let Err(e) = result {
                    warn!(patient = %self.id, destination = %destination.name, error = %e, "Travel failed; placing directly");
                }
                true
            }
        }
    }
}

/// The set of live patients, keyed by id.
#[derive(Clone, Default)]
pub struct PatientDirectory {
    cells: Arc<RwLock<HashMap<PatientId, Arc<PatientCell>>>>,
}

impl PatientDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, cell: Arc<PatientCell>) {
        if let Some(previous) = write(&self.cells).insert(cell.id(), cell) {
            previous.shutdown.cancel();
        }
    }

    pub fn get(&self, id: PatientId) -> Option<Arc<PatientCell>> {
        read(&self.cells).get(&id).cloned()
    }

    pub fn contains(&self, id: PatientId) -> bool {
        read(&self.cells).contains_key(&id)
    }

    /// Remove a patient and stop its background work.
    pub fn remove(&self, id: PatientId) -> Option<Arc<PatientCell>> {
        let cell = write(&self.cells).remove(&id)?;
        cell.shutdown.cancel();
        Some(cell)
    }

    /// Remove every patient, stopping their background work.
    pub fn clear(&self) -> usize {
        let drained: Vec<_> = write(&self.cells).drain().collect();
        for (_, cell) in &drained {
            cell.shutdown.cancel();
        }
        drained.len()
    }

    pub fn len(&self) -> usize {
        read(&self.cells).len()
    }

    pub fn is_empty(&self) -> bool {
        read(&self.cells).is_empty()
    }

    /// Patients currently held by `role`.
    pub fn held_by(&self, role: AgentRole) -> Vec<Arc<PatientCell>> {
        read(&self.cells)
            .values()
            .filter(|cell| cell.held_by() == Some(role))
            .cloned()
            .collect()
    }

    /// Views of all live patients, ordered by id.
    pub fn views(&self) -> Vec<PatientView> {
        let cells: Vec<_> = read(&self.cells).values().cloned().collect();
        let mut views: Vec<_> = cells.iter().map(|cell| cell.view()).collect();
        views.sort_by_key(|v| v.patient.id);
        views
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::travel::InstantTravel;
    use crate::use_cases::events::ScenarioMessage;
    use std::sync::atomic::AtomicU64;
    use tokio::sync::mpsc;
    use ward_domain::Severity;

    struct Harness {
        env: PatientEnv,
        rx: mpsc::UnboundedReceiver<ScenarioMessage>,
        root: CancellationToken,
    }

    impl Harness {
        fn new(timing: TimingPolicy) -> Self {
            let (tx, rx) = mpsc::unbounded_channel();
            Self {
                env: PatientEnv {
                    timing: Arc::new(timing),
                    travel: Arc::new(InstantTravel),
                    registry: Arc::new(LocationRegistry::default_ward()),
                    events: EventSink::new(tx, Arc::new(AtomicU64::new(1))),
                },
                rx,
                root: CancellationToken::new(),
            }
        }

        fn spawn(&self, id: u32, pathway: &[&str]) -> Arc<PatientCell> {
            let patient = Patient::new(
                PatientId::new(id),
                Severity::Minor,
                pathway.iter().map(|s| s.to_string()).collect(),
            );
            PatientCell::spawn(patient, &self.env, &self.root)
        }

        fn events(&mut self) -> Vec<ScenarioEvent> {
            let mut out = Vec::new();
            while let Ok(msg) = self.rx.try_recv() {
                out.push(msg.event);
            }
            out
        }
    }

    async fn advance(seconds: f64) {
        tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
    }

    fn treat(cell: &Arc<PatientCell>, nominal: f64, isolated: bool) -> u64 {
        assert_eq!(cell.try_claim(AgentRole::Nurse, || true), ClaimOutcome::Claimed);
        cell.begin_treatment(AgentRole::Nurse, nominal, isolated)
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_patient_walks_to_waiting_area() {
        let h = Harness::new(TimingPolicy::default());
        let cell = h.spawn(1, &["TRIAGE"]);
        advance(0.1).await;
        assert_eq!(cell.state(), PatientState::Waiting);
        assert_eq!(cell.location().as_deref(), Some("WAITING"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_pathway_exits_immediately() {
        let mut h = Harness::new(TimingPolicy::default());
        let cell = h.spawn(1, &[]);
        advance(0.1).await;
        assert_eq!(cell.state(), PatientState::Done);
        assert_eq!(
            h.events(),
            vec![ScenarioEvent::PatientExited {
                patient: PatientId::new(1)
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiting_timeouts_skip_then_force_exit() {
        let mut h = Harness::new(TimingPolicy::default());
        let cell = h.spawn(1, &["TRIAGE", "TB"]);

        advance(59.9).await;
        assert_eq!(cell.view().patient.current_step(), 0);

        advance(0.2).await;
        assert_eq!(cell.view().patient.current_step(), 1);
        assert_eq!(cell.state(), PatientState::Waiting);

        // final step: 10 units
        advance(9.8).await;
        assert_eq!(cell.state(), PatientState::Waiting);
        advance(0.2).await;
        assert_eq!(cell.state(), PatientState::Done);

        let events = h.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[0],
            ScenarioEvent::StepComplete {
                cause: StepCause::WaitingTimeout,
                ..
            }
        ));
        assert!(matches!(events[1], ScenarioEvent::PatientExited { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiting_timeout_ignores_speed() {
        let h = Harness::new(TimingPolicy::default().with_speed(10.0));
        let cell = h.spawn(1, &["TRIAGE"]);
        advance(9.9).await;
        assert_eq!(cell.state(), PatientState::Waiting);
        advance(0.2).await;
        assert_eq!(cell.state(), PatientState::Done);
    }

    #[tokio::test(start_paused = true)]
    async fn test_treatment_completes_after_nominal_duration() {
        let mut h = Harness::new(TimingPolicy::default());
        let cell = h.spawn(1, &["TRIAGE", "TB"]);
        advance(0.1).await;

        treat(&cell, 5.0, false);
        assert_eq!(cell.state(), PatientState::InTreatment);

        advance(4.8).await;
        assert_eq!(cell.state(), PatientState::InTreatment);
        advance(0.3).await;
        let view = cell.view();
        assert_eq!(view.patient.state(), PatientState::Waiting);
        assert_eq!(view.patient.current_step(), 1);

        let events = h.events();
        assert_eq!(
            events,
            vec![ScenarioEvent::StepComplete {
                patient: PatientId::new(1),
                completion: StepCompletion {
                    completed_step: 0,
                    current_step: 1,
                    exiting: false
                },
                cause: StepCause::Treatment,
            }]
        );

        // the watchdog for the finished epoch is a no-op
        advance(5.0).await;
        assert_eq!(cell.view().patient.current_step(), 1);
        assert!(h.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_countdown_finished_by_watchdog() {
        let mut h = Harness::new(TimingPolicy::default());
        let cell = h.spawn(1, &["TRIAGE", "TB"]);
        advance(0.1).await;

        treat(&cell, 5.0, false);
        cell.halt_countdown();

        advance(9.8).await;
        assert_eq!(cell.state(), PatientState::InTreatment);
        advance(0.3).await;
        assert_eq!(cell.state(), PatientState::Waiting);
        assert_eq!(cell.view().patient.current_step(), 1);
        assert!(matches!(
            h.events().as_slice(),
            [ScenarioEvent::StepComplete {
                cause: StepCause::Watchdog,
                ..
            }]
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_isolated_backup_fires_before_watchdog() {
        let mut h = Harness::new(TimingPolicy::default());
        let cell = h.spawn(1, &["ICU"]);
        advance(0.1).await;

        treat(&cell, 10.0, true);
        cell.halt_countdown();

        advance(10.8).await;
        assert_eq!(cell.state(), PatientState::InTreatment);
        advance(0.3).await;
        assert!(cell.state().is_departing());
        let events = h.events();
        assert!(matches!(
            events[0],
            ScenarioEvent::StepComplete {
                cause: StepCause::IsolatedBackup,
                completion: StepCompletion { exiting: true, .. },
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_waiting_timeout_during_treatment() {
        let h = Harness::new(TimingPolicy::default());
        let cell = h.spawn(1, &["ICU"]);
        advance(0.1).await;
        treat(&cell, 45.0, true);

        // final-step bound is 10, but the patient is in treatment
        advance(30.0).await;
        assert_eq!(cell.state(), PatientState::InTreatment);
        advance(16.0).await;
        assert!(cell.state().is_departing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_claim_contention() {
        let h = Harness::new(TimingPolicy::default());
        let cell = h.spawn(1, &["TRIAGE", "TB"]);
        assert_eq!(
            cell.try_claim(AgentRole::Nurse, || true),
            ClaimOutcome::Contended(Contention::NotReady)
        );
        advance(0.1).await;

        assert_eq!(cell.try_claim(AgentRole::Nurse, || false), ClaimOutcome::Revoked);
        assert_eq!(cell.state(), PatientState::Waiting);

        assert_eq!(cell.try_claim(AgentRole::Nurse, || true), ClaimOutcome::Claimed);
        assert_eq!(cell.try_claim(AgentRole::Nurse, || true), ClaimOutcome::AlreadyHeld);
        assert_eq!(
            cell.try_claim(AgentRole::Doctor, || true),
            ClaimOutcome::Contended(Contention::HeldByOther(AgentRole::Nurse))
        );

        assert!(cell.release(AgentRole::Nurse));
        assert_eq!(cell.state(), PatientState::Waiting);
        assert_eq!(cell.held_by(), None);
        assert_eq!(cell.try_claim(AgentRole::Doctor, || true), ClaimOutcome::Claimed);
        assert_eq!(cell.view().patient.follow_target(), Some(AgentRole::Doctor));
    }

    #[tokio::test(start_paused = true)]
    async fn test_treatment_outranks_the_treating_agents_hold() {
        let h = Harness::new(TimingPolicy::default());
        let cell = h.spawn(1, &["TRIAGE", "TB"]);
        advance(0.1).await;
        treat(&cell, 40.0, false);
        assert_eq!(cell.held_by(), Some(AgentRole::Nurse));

        assert_eq!(
            cell.try_claim(AgentRole::Doctor, || true),
            ClaimOutcome::Contended(Contention::InTreatment)
        );
        assert_eq!(
            cell.try_claim(AgentRole::Nurse, || true),
            ClaimOutcome::Contended(Contention::InTreatment)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_refused_claim_does_not_wake_waiters() {
        let h = Harness::new(TimingPolicy::default());
        let cell = h.spawn(1, &["TRIAGE", "TB"]);
        advance(0.1).await;
        assert_eq!(cell.try_claim(AgentRole::Nurse, || true), ClaimOutcome::Claimed);

        let notified = cell.changed().notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        assert!(matches!(
            cell.try_claim(AgentRole::Doctor, || true),
            ClaimOutcome::Contended(_)
        ));
        assert!(
            tokio::time::timeout(Duration::from_millis(10), notified.as_mut())
                .await
                .is_err()
        );

        // a real change still wakes them
        cell.release(AgentRole::Nurse);
        assert!(
            tokio::time::timeout(Duration::from_millis(10), notified.as_mut())
                .await
                .is_ok()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_treatment_duration_does_not_panic() {
        let h = Harness::new(TimingPolicy::default());
        let cell = h.spawn(1, &["TRIAGE", "TB"]);
        advance(0.1).await;
        treat(&cell, 1e300, true);
        advance(10.0).await;
        assert_eq!(cell.state(), PatientState::InTreatment);
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_leaves_treatment_alone() {
        let h = Harness::new(TimingPolicy::default());
        let cell = h.spawn(1, &["TRIAGE", "TB"]);
        advance(0.1).await;
        treat(&cell, 5.0, false);

        assert!(cell.release(AgentRole::Nurse));
        assert_eq!(cell.state(), PatientState::InTreatment);
        assert!(!cell.release(AgentRole::Doctor));
    }

    #[tokio::test(start_paused = true)]
    async fn test_treat_refusals() {
        let h = Harness::new(TimingPolicy::default());
        let cell = h.spawn(1, &["TRIAGE", "TB"]);
        advance(0.1).await;

        assert_eq!(
            cell.begin_treatment(AgentRole::Nurse, 5.0, false),
            Err(TreatRefusal::NotFollowing(PatientState::Waiting))
        );
        let epoch = treat(&cell, 5.0, false);
        assert!(matches!(
            cell.begin_treatment(AgentRole::Doctor, 5.0, false),
            Err(TreatRefusal::InTreatment { epoch: e, .. }) if e == epoch
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exit_event_fires_once_and_done_is_unclaimable() {
        let mut h = Harness::new(TimingPolicy::default());
        let cell = h.spawn(1, &["TRIAGE"]);
        advance(0.1).await;
        treat(&cell, 5.0, false);
        advance(30.0).await;

        assert_eq!(cell.state(), PatientState::Done);
        let exits = h
            .events()
            .into_iter()
            .filter(|e| matches!(e, ScenarioEvent::PatientExited { .. }))
            .count();
        assert_eq!(exits, 1);
        assert_eq!(cell.try_claim(AgentRole::Nurse, || true), ClaimOutcome::Unavailable);
    }

    #[tokio::test(start_paused = true)]
    async fn test_directory_remove_stops_background_work() {
        let mut h = Harness::new(TimingPolicy::default());
        let directory = PatientDirectory::new();
        let cell = h.spawn(1, &["TRIAGE"]);
        directory.insert(cell.clone());
        advance(0.1).await;
        h.events();

        assert!(directory.remove(PatientId::new(1)).is_some());
        assert!(directory.is_empty());
        advance(30.0).await;
        assert_eq!(cell.state(), PatientState::Waiting);
        assert!(h.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_directory_views_sorted_and_held_by() {
        let h = Harness::new(TimingPolicy::default());
        let directory = PatientDirectory::new();
        for id in [3, 1, 2] {
            directory.insert(h.spawn(id, &["TRIAGE"]));
        }
        advance(0.1).await;

        let ids: Vec<u32> = directory
            .views()
            .iter()
            .map(|v| v.patient.id.value())
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);

        let cell = directory.get(PatientId::new(2)).unwrap();
        cell.try_claim(AgentRole::Doctor, || true);
        assert_eq!(directory.held_by(AgentRole::Doctor).len(), 1);
        assert!(directory.held_by(AgentRole::Nurse).is_empty());
        assert_eq!(directory.clear(), 3);
    }
}
