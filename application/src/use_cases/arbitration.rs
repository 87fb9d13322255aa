//! Escort arbitration: which agent gets to walk a patient.
//!
//! An agent may only take a patient that is not held by the other agent and
//! is waiting (or stuck following someone who no longer holds it). While
//! the patient is busy the claimant waits on the patient's change signal
//! with an explicit deadline per kind of contention:
//!
//! | Contention                                  | Bound                                |
//! |---------------------------------------------|--------------------------------------|
//! | held by the other agent, or not yet waiting | `poll_interval * follow_attempts`    |
//! | in treatment                                | `poll_interval * treatment_attempts` |
//!
//! Each bound starts when its kind of contention is first seen, so the total
//! wait never exceeds the sum of both. A patient that is leaving, gone or
//! removed aborts the claim immediately.

use super::patient_runtime::{ClaimOutcome, Contention, PatientCell};
use crate::config::TimingPolicy;
use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;
use ward_domain::AgentRole;

/// Why an escort could not take its patient.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArbitrationError {
    #[error("patient still busy after waiting ({0:?})")]
    TimedOut(Contention),

    #[error("patient is leaving or gone")]
    Unavailable,

    #[error("claim revoked")]
    Revoked,
}

pub struct EscortArbiter<'a> {
    timing: &'a TimingPolicy,
}

impl<'a> EscortArbiter<'a> {
    pub fn new(timing: &'a TimingPolicy) -> Self {
        Self { timing }
    }

    /// Take `patient` for `role`, waiting out contention within the bounds.
    ///
    /// `commit` is called under the patient lock at the moment of the claim;
    /// see [`PatientCell::try_claim`].
    pub async fn acquire(
        &self,
        patient: &PatientCell,
        role: AgentRole,
        mut commit: impl FnMut() -> bool,
    ) -> Result<ClaimOutcome, ArbitrationError> {
        let mut follow_deadline: Option<Instant> = None;
        let mut treatment_deadline: Option<Instant> = None;

        loop {
            let notified = patient.changed().notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let contention = match patient.try_claim(role, &mut commit) {
                outcome @ (ClaimOutcome::Claimed | ClaimOutcome::AlreadyHeld) => {
                    return Ok(outcome);
                }
                ClaimOutcome::Unavailable => return Err(ArbitrationError::Unavailable),
                ClaimOutcome::Revoked => return Err(ArbitrationError::Revoked),
                ClaimOutcome::Contended(contention) => contention,
            };

            let deadline = match contention {
                Contention::InTreatment => *treatment_deadline
                    .get_or_insert_with(|| Instant::now() + self.timing.escort_treatment_bound()),
                Contention::HeldByOther(_) | Contention::NotReady => *follow_deadline
                    .get_or_insert_with(|| Instant::now() + self.timing.escort_follow_bound()),
            };
            if Instant::now() >= deadline {
                return Err(ArbitrationError::TimedOut(contention));
            }

            debug!(patient = %patient.id(), agent = %role, ?contention, "Waiting for patient");
            tokio::select! {
                biased;
                _ = patient.shutdown_token().cancelled() => return Err(ArbitrationError::Unavailable),
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(deadline) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::travel::InstantTravel;
    use crate::use_cases::events::{EventSink, ScenarioMessage};
    use crate::use_cases::patient_runtime::PatientEnv;
    use std::sync::Arc;
    use std::sync::atomic::AtomicU64;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;
    use ward_domain::{LocationRegistry, Patient, PatientId, PatientState, Severity};

    struct Spawned {
        cell: Arc<PatientCell>,
        root: CancellationToken,
        _events: mpsc::UnboundedReceiver<ScenarioMessage>,
    }

    fn spawn_patient(pathway: &[&str]) -> Spawned {
        spawn_patient_with(TimingPolicy::default(), pathway)
    }

    fn spawn_patient_with(timing: TimingPolicy, pathway: &[&str]) -> Spawned {
        let (tx, rx) = mpsc::unbounded_channel();
        let env = PatientEnv {
            timing: Arc::new(timing),
            travel: Arc::new(InstantTravel),
            registry: Arc::new(LocationRegistry::default_ward()),
            events: EventSink::new(tx, Arc::new(AtomicU64::new(1))),
        };
        let root = CancellationToken::new();
        let patient = Patient::new(
            PatientId::new(1),
            Severity::Moderate,
            pathway.iter().map(|s| s.to_string()).collect(),
        );
        Spawned {
            cell: PatientCell::spawn(patient, &env, &root),
            root,
            _events: rx,
        }
    }

    async fn advance(seconds: f64) {
        tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_free_patient_claimed_immediately() {
        let spawned = spawn_patient(&["TRIAGE", "TB"]);
        let cell = spawned.cell.clone();
        advance(0.1).await;
        let timing = TimingPolicy::default();
        let outcome = EscortArbiter::new(&timing)
            .acquire(&cell, AgentRole::Nurse, || true)
            .await;
        assert_eq!(outcome, Ok(ClaimOutcome::Claimed));
        assert_eq!(cell.held_by(), Some(AgentRole::Nurse));
    }

    #[tokio::test(start_paused = true)]
    async fn test_claim_waits_for_spawning_patient() {
        let spawned = spawn_patient(&["TRIAGE", "TB"]);
        let cell = spawned.cell.clone();
        let timing = TimingPolicy::default();
        let outcome = EscortArbiter::new(&timing)
            .acquire(&cell, AgentRole::Doctor, || true)
            .await;
        assert_eq!(outcome, Ok(ClaimOutcome::Claimed));
        assert_eq!(cell.state(), PatientState::Following);
    }

    #[tokio::test(start_paused = true)]
    async fn test_held_patient_times_out_after_follow_bound() {
        let spawned = spawn_patient(&["TRIAGE", "TB"]);
        let cell = spawned.cell.clone();
        advance(0.1).await;
        assert_eq!(cell.try_claim(AgentRole::Nurse, || true), ClaimOutcome::Claimed);

        let timing = TimingPolicy::default();
        let start = Instant::now();
        let outcome = EscortArbiter::new(&timing)
            .acquire(&cell, AgentRole::Doctor, || true)
            .await;

        assert_eq!(
            outcome,
            Err(ArbitrationError::TimedOut(Contention::HeldByOther(AgentRole::Nurse)))
        );
        assert_eq!(start.elapsed(), Duration::from_secs(30));
        assert_eq!(cell.held_by(), Some(AgentRole::Nurse));
    }

    #[tokio::test]
    async fn test_contended_wait_sleeps_between_checks() {
        let timing = TimingPolicy::default().with_time_unit(Duration::from_millis(20));
        let spawned = spawn_patient_with(timing.clone(), &["TRIAGE", "TB"]);
        let cell = spawned.cell.clone();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(cell.try_claim(AgentRole::Nurse, || true), ClaimOutcome::Claimed);

        let attempts_before = cell.claim_attempts();
        let start = std::time::Instant::now();
        let outcome = EscortArbiter::new(&timing)
            .acquire(&cell, AgentRole::Doctor, || true)
            .await;

        assert_eq!(
            outcome,
            Err(ArbitrationError::TimedOut(Contention::HeldByOther(AgentRole::Nurse)))
        );
        assert!(start.elapsed() >= Duration::from_millis(600));
        // one check on entry, one when the deadline passes
        let attempts = cell.claim_attempts() - attempts_before;
        assert!(attempts <= 3, "claim retried {attempts} times while held");
    }

    #[tokio::test(start_paused = true)]
    async fn test_treatment_gets_the_longer_bound() {
        let spawned = spawn_patient(&["TRIAGE", "TB"]);
        let cell = spawned.cell.clone();
        advance(0.1).await;
        cell.try_claim(AgentRole::Nurse, || true);
        let epoch = cell.begin_treatment(AgentRole::Nurse, 40.0, false).unwrap();

        // the nurse keeps its hold for the whole stay, like a treating agent
        let nurse_side = cell.clone();
        tokio::spawn(async move {
            nurse_side
                .wait_treatment_end(epoch, Duration::from_secs(100))
                .await;
            nurse_side.release(AgentRole::Nurse);
        });

        let timing = TimingPolicy::default();
        let start = Instant::now();
        let outcome = EscortArbiter::new(&timing)
            .acquire(&cell, AgentRole::Doctor, || true)
            .await;
        assert_eq!(outcome, Ok(ClaimOutcome::Claimed));
        let waited = start.elapsed();
        assert!(waited >= Duration::from_secs(39) && waited <= Duration::from_secs(41));
        assert_eq!(cell.view().patient.current_step(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_treatment_bound_expires_while_still_treating() {
        let spawned = spawn_patient(&["TRIAGE", "TB"]);
        let cell = spawned.cell.clone();
        advance(0.1).await;
        cell.try_claim(AgentRole::Nurse, || true);
        cell.begin_treatment(AgentRole::Nurse, 80.0, false).unwrap();

        let timing = TimingPolicy::default();
        let start = Instant::now();
        let outcome = EscortArbiter::new(&timing)
            .acquire(&cell, AgentRole::Doctor, || true)
            .await;
        assert_eq!(outcome, Err(ArbitrationError::TimedOut(Contention::InTreatment)));
        assert_eq!(start.elapsed(), Duration::from_secs(60));
        assert_eq!(cell.state(), PatientState::InTreatment);
    }

    #[tokio::test(start_paused = true)]
    async fn test_claim_proceeds_once_other_agent_releases() {
        let spawned = spawn_patient(&["TRIAGE", "TB"]);
        let cell = spawned.cell.clone();
        advance(0.1).await;
        cell.try_claim(AgentRole::Nurse, || true);

        let releaser = cell.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            releaser.release(AgentRole::Nurse);
        });

        let timing = TimingPolicy::default();
        let start = Instant::now();
        let outcome = EscortArbiter::new(&timing)
            .acquire(&cell, AgentRole::Doctor, || true)
            .await;
        assert_eq!(outcome, Ok(ClaimOutcome::Claimed));
        assert_eq!(start.elapsed(), Duration::from_secs(3));
        assert_eq!(cell.view().patient.follow_target(), Some(AgentRole::Doctor));
    }

    #[tokio::test(start_paused = true)]
    async fn test_claim_waits_out_treatment() {
        let spawned = spawn_patient(&["TRIAGE", "TB"]);
        let cell = spawned.cell.clone();
        advance(0.1).await;
        cell.try_claim(AgentRole::Nurse, || true);
        cell.begin_treatment(AgentRole::Nurse, 5.0, false).unwrap();
        cell.release(AgentRole::Nurse);

        let timing = TimingPolicy::default();
        let outcome = EscortArbiter::new(&timing)
            .acquire(&cell, AgentRole::Doctor, || true)
            .await;
        assert_eq!(outcome, Ok(ClaimOutcome::Claimed));
        assert_eq!(cell.view().patient.current_step(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_removed_patient_aborts_wait() {
        let spawned = spawn_patient(&["TRIAGE", "TB"]);
        let cell = spawned.cell.clone();
        let root = spawned.root.clone();
        advance(0.1).await;
        cell.try_claim(AgentRole::Nurse, || true);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            root.cancel();
        });

        let timing = TimingPolicy::default();
        let start = Instant::now();
        let outcome = EscortArbiter::new(&timing)
            .acquire(&cell, AgentRole::Doctor, || true)
            .await;
        assert_eq!(outcome, Err(ArbitrationError::Unavailable));
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_revoked_claim_leaves_patient_untouched() {
        let spawned = spawn_patient(&["TRIAGE", "TB"]);
        let cell = spawned.cell.clone();
        advance(0.1).await;
        let timing = TimingPolicy::default();
        let outcome = EscortArbiter::new(&timing)
            .acquire(&cell, AgentRole::Nurse, || false)
            .await;
        assert_eq!(outcome, Err(ArbitrationError::Revoked));
        assert_eq!(cell.state(), PatientState::Waiting);
        assert_eq!(cell.held_by(), None);
    }
}
