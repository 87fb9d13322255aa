//! Patient entity: lifecycle, pathway cursor and treatment timer.
//!
//! Every mutation goes through a method that checks the lifecycle edge
//! (see [`PatientState::can_transition_to`]). Once the patient is `Done`,
//! every mutator fails with [`DomainError::PatientDone`].

use super::state::PatientState;
use super::value_objects::{PatientId, Severity};
use crate::agent::AgentRole;
use crate::core::error::DomainError;
use serde::{Deserialize, Serialize};

/// Remaining time below this is treated as zero.
const TIMER_EPSILON: f64 = 1e-9;

/// Result of finishing one pathway step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepCompletion {
    /// Index of the step that was just completed.
    pub completed_step: usize,
    /// Cursor after the completion.
    pub current_step: usize,
    /// Whether the pathway is exhausted and the patient is now exiting.
    pub exiting: bool,
}

/// A correction applied by [`Patient::repair`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Repair {
    /// A timer value was left behind outside of treatment.
    ClearedStaleTimer { remaining: f64 },
    /// Treatment had no time left but never completed.
    ForcedCompletion(StepCompletion),
    /// The pathway was exhausted while the patient was still waiting.
    ForcedExit,
    /// A follow target was set while the patient was not following.
    ClearedFollowTarget(AgentRole),
}

/// A patient moving through the ward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: PatientId,
    pub severity: Severity,
    pub description: String,
    /// Time-units within which the pathway should be complete.
    pub deadline: f64,
    pub requires_doctor: bool,
    pathway: Vec<String>,
    current_step: usize,
    state: PatientState,
    treatment_remaining: f64,
    treatment_nominal: f64,
    isolated_treatment: bool,
    /// Incremented every time a treatment starts; timers carry the epoch
    /// they were started for and become no-ops once it moves on.
    treatment_epoch: u64,
    follow_target: Option<AgentRole>,
    location: Option<String>,
}

impl Patient {
    pub fn new(id: PatientId, severity: Severity, pathway: Vec<String>) -> Self {
        Self {
            id,
            severity,
            description: String::new(),
            deadline: severity.default_deadline(),
            requires_doctor: severity.requires_doctor(),
            pathway,
            current_step: 0,
            state: PatientState::Spawning,
            treatment_remaining: 0.0,
            treatment_nominal: 0.0,
            isolated_treatment: false,
            treatment_epoch: 0,
            follow_target: None,
            location: None,
        }
    }

    /// Patient with the standard pathway for its severity.
    pub fn from_severity(id: PatientId, severity: Severity) -> Self {
        Self::new(id, severity, severity.default_pathway())
    }

    pub fn with_deadline(mut self, deadline: f64) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_requires_doctor(mut self, requires_doctor: bool) -> Self {
        self.requires_doctor = requires_doctor;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    // ==================== Accessors ====================

    pub fn state(&self) -> PatientState {
        self.state
    }

    pub fn pathway(&self) -> &[String] {
        &self.pathway
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn steps_remaining(&self) -> usize {
        self.pathway.len().saturating_sub(self.current_step)
    }

    /// Whether the patient is waiting for the last step of its pathway.
    pub fn is_final_step(&self) -> bool {
        self.current_step + 1 >= self.pathway.len()
    }

    pub fn is_pathway_complete(&self) -> bool {
        self.current_step >= self.pathway.len()
    }

    /// The location of the step the patient is waiting for.
    pub fn next_location(&self) -> Option<&str> {
        self.pathway.get(self.current_step).map(String::as_str)
    }

    pub fn treatment_remaining(&self) -> f64 {
        self.treatment_remaining
    }

    pub fn treatment_nominal(&self) -> f64 {
        self.treatment_nominal
    }

    pub fn is_isolated_treatment(&self) -> bool {
        self.isolated_treatment
    }

    pub fn treatment_epoch(&self) -> u64 {
        self.treatment_epoch
    }

    pub fn follow_target(&self) -> Option<AgentRole> {
        self.follow_target
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    // ==================== Transitions ====================

    fn ensure_alive(&self) -> Result<(), DomainError> {
        if self.state.is_terminal() {
            return Err(DomainError::PatientDone(self.id));
        }
        Ok(())
    }

    fn transition(&mut self, to: PatientState) -> Result<(), DomainError> {
        self.ensure_alive()?;
        if !self.state.can_transition_to(to) {
            return Err(DomainError::InvalidTransition {
                patient: self.id,
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }

    /// `Spawning -> MovingToWait`
    pub fn place(&mut self, location: Option<&str>) -> Result<(), DomainError> {
        self.transition(PatientState::MovingToWait)?;
        self.location = location.map(str::to_string);
        Ok(())
    }

    /// `MovingToWait -> Waiting`, continuing to `Exiting` for an empty pathway.
    pub fn arrive_at_waiting(&mut self, location: Option<&str>) -> Result<PatientState, DomainError> {
        self.transition(PatientState::Waiting)?;
        if let Some(location) = location {
            self.location = Some(location.to_string());
        }
        if self.is_pathway_complete() {
            self.transition(PatientState::Exiting)?;
        }
        Ok(self.state)
    }

    /// `Waiting -> Following` behind `agent`.
    pub fn begin_follow(&mut self, agent: AgentRole) -> Result<(), DomainError> {
        self.transition(PatientState::Following)?;
        self.follow_target = Some(agent);
        Ok(())
    }

    /// `Following -> Waiting`. Returns whether the patient was following.
    ///
    /// Outside of `Following` only a stray follow target is cleared.
    pub fn stop_following(&mut self) -> bool {
        if self.state == PatientState::Following {
            self.state = PatientState::Waiting;
            self.follow_target = None;
            true
        } else {
            self.follow_target = None;
            false
        }
    }

    /// Record that the patient has reached `location`.
    pub fn set_location(&mut self, location: impl Into<String>) -> Result<(), DomainError> {
        self.ensure_alive()?;
        self.location = Some(location.into());
        Ok(())
    }

    /// `Following -> InTreatment`. Releases the escort and returns the new
    /// treatment epoch.
    pub fn begin_treatment(&mut self, nominal: f64, isolated: bool) -> Result<u64, DomainError> {
        self.transition(PatientState::InTreatment)?;
        self.follow_target = None;
        self.treatment_nominal = nominal.max(0.0);
        self.treatment_remaining = self.treatment_nominal;
        self.isolated_treatment = isolated;
        self.treatment_epoch += 1;
        Ok(self.treatment_epoch)
    }

    /// Count the treatment timer down by `elapsed` time-units.
    ///
    /// Returns the step completion once the timer reaches zero. Stale epochs
    /// and patients no longer in treatment are ignored.
    pub fn advance_treatment(&mut self, epoch: u64, elapsed: f64) -> Option<StepCompletion> {
        if self.state != PatientState::InTreatment || epoch != self.treatment_epoch {
            return None;
        }
        self.treatment_remaining = (self.treatment_remaining - elapsed.max(0.0)).max(0.0);
        if self.treatment_remaining <= TIMER_EPSILON {
            return Some(self.complete_treatment());
        }
        None
    }

    /// Force the treatment of `epoch` to completion regardless of the timer.
    pub fn force_complete_treatment(&mut self, epoch: u64) -> Option<StepCompletion> {
        if self.state != PatientState::InTreatment || epoch != self.treatment_epoch {
            return None;
        }
        Some(self.complete_treatment())
    }

    /// `InTreatment -> Waiting` with the cursor moved past the finished step,
    /// then `Waiting -> Exiting` if the pathway is exhausted.
    fn complete_treatment(&mut self) -> StepCompletion {
        self.treatment_remaining = 0.0;
        self.isolated_treatment = false;
        self.state = PatientState::Waiting;
        self.finish_step()
    }

    fn finish_step(&mut self) -> StepCompletion {
        let completed_step = self.current_step;
        self.current_step = (self.current_step + 1).min(self.pathway.len());
        let exiting = self.is_pathway_complete();
        if exiting {
            self.state = PatientState::Exiting;
        }
        StepCompletion {
            completed_step,
            current_step: self.current_step,
            exiting,
        }
    }

    /// Skip the step a waiting patient has been stuck on.
    pub fn advance_waiting_step(&mut self) -> Result<StepCompletion, DomainError> {
        self.ensure_alive()?;
        if self.state != PatientState::Waiting {
            return Err(DomainError::InvalidTransition {
                patient: self.id,
                from: self.state,
                to: PatientState::Waiting,
            });
        }
        Ok(self.finish_step())
    }

    /// `Waiting -> Exiting`, abandoning whatever is left of the pathway.
    pub fn force_exit(&mut self) -> Result<(), DomainError> {
        self.transition(PatientState::Exiting)?;
        self.current_step = self.pathway.len();
        Ok(())
    }

    /// `Exiting -> Done`
    pub fn finish(&mut self, exit: Option<&str>) -> Result<(), DomainError> {
        self.transition(PatientState::Done)?;
        if let Some(exit) = exit {
            self.location = Some(exit.to_string());
        }
        self.follow_target = None;
        Ok(())
    }

    // ==================== Invariant repair ====================

    /// Restore the invariants between state, timer, cursor and follow target.
    ///
    /// Returns the corrections applied (empty when already consistent).
    pub fn repair(&mut self) -> Vec<Repair> {
        let mut repairs = Vec::new();
        if self.state.is_terminal() {
            return repairs;
        }

        if self.state != PatientState::InTreatment && self.treatment_remaining > 0.0 {
            repairs.push(Repair::ClearedStaleTimer {
                remaining: self.treatment_remaining,
            });
            self.treatment_remaining = 0.0;
            self.isolated_treatment = false;
        }

        if self.state == PatientState::InTreatment && self.treatment_remaining <= TIMER_EPSILON {
            repairs.push(Repair::ForcedCompletion(self.complete_treatment()));
        }

        if self.state == PatientState::Waiting && self.is_pathway_complete() {
            self.state = PatientState::Exiting;
            repairs.push(Repair::ForcedExit);
        }

        if self.state != PatientState::Following
            && let Some(agent) = self.follow_target.take()
        {
            repairs.push(Repair::ClearedFollowTarget(agent));
        }

        repairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn waiting_patient(pathway: &[&str]) -> Patient {
        let mut p = Patient::new(
            PatientId::new(1),
            Severity::Minor,
            pathway.iter().map(|s| s.to_string()).collect(),
        );
        p.place(Some("ENT")).unwrap();
        p.arrive_at_waiting(Some("WAITING")).unwrap();
        p
    }

    fn treat(p: &mut Patient, nominal: f64) -> u64 {
        p.begin_follow(AgentRole::Nurse).unwrap();
        p.begin_treatment(nominal, false).unwrap()
    }

    #[test]
    fn test_new_patient_defaults() {
        let p = Patient::from_severity(PatientId::new(9), Severity::Critical);
        assert_eq!(p.state(), PatientState::Spawning);
        assert_eq!(p.current_step(), 0);
        assert_eq!(p.deadline, 25.0);
        assert!(p.requires_doctor);
        assert_eq!(p.next_location(), Some("TRIAGE"));
    }

    #[test]
    fn test_full_lifecycle() {
        let mut p = waiting_patient(&["TRIAGE", "TB"]);
        assert_eq!(p.state(), PatientState::Waiting);
        assert_eq!(p.location(), Some("WAITING"));

        let epoch = treat(&mut p, 5.0);
        assert_eq!(p.state(), PatientState::InTreatment);
        assert!(p.follow_target().is_none());

        assert!(p.advance_treatment(epoch, 3.0).is_none());
        let done = p.advance_treatment(epoch, 2.0).unwrap();
        assert_eq!(done.completed_step, 0);
        assert_eq!(done.current_step, 1);
        assert!(!done.exiting);
        assert_eq!(p.state(), PatientState::Waiting);

        let epoch = treat(&mut p, 15.0);
        let done = p.force_complete_treatment(epoch).unwrap();
        assert!(done.exiting);
        assert_eq!(p.state(), PatientState::Exiting);
        assert_eq!(p.current_step(), 2);

        p.finish(Some("ENT")).unwrap();
        assert_eq!(p.state(), PatientState::Done);
    }

    #[test]
    fn test_done_rejects_every_mutation() {
        let mut p = waiting_patient(&[]);
        assert_eq!(p.state(), PatientState::Exiting);
        p.finish(None).unwrap();

        assert!(matches!(p.finish(None), Err(DomainError::PatientDone(_))));
        assert!(p.begin_follow(AgentRole::Doctor).is_err());
        assert!(p.set_location("TB").is_err());
        assert!(p.advance_waiting_step().is_err());
        assert!(p.repair().is_empty());
        assert_eq!(p.state(), PatientState::Done);
    }

    #[test]
    fn test_invalid_edges_rejected() {
        let mut p = waiting_patient(&["TRIAGE"]);
        let err = p.begin_treatment(5.0, false).unwrap_err();
        assert!(err.is_invalid_transition());
        assert!(p.finish(None).is_err());
        assert_eq!(p.state(), PatientState::Waiting);
    }

    #[test]
    fn test_stale_epoch_is_ignored() {
        let mut p = waiting_patient(&["TRIAGE", "TB", "LAB"]);
        let first = treat(&mut p, 5.0);
        p.force_complete_treatment(first).unwrap();
        let second = treat(&mut p, 15.0);
        assert_ne!(first, second);

        assert!(p.force_complete_treatment(first).is_none());
        assert!(p.advance_treatment(first, 100.0).is_none());
        assert_eq!(p.state(), PatientState::InTreatment);
        assert_eq!(p.current_step(), 1);
    }

    #[test]
    fn test_step_cursor_is_monotonic_and_bounded() {
        let mut p = waiting_patient(&["TRIAGE", "TB"]);
        let mut last = p.current_step();
        p.advance_waiting_step().unwrap();
        assert!(p.current_step() >= last);
        last = p.current_step();
        let done = p.advance_waiting_step().unwrap();
        assert!(done.exiting);
        assert!(p.current_step() >= last);
        assert_eq!(p.current_step(), p.pathway().len());
        assert!(p.advance_waiting_step().is_err());
        assert_eq!(p.current_step(), 2);
    }

    #[test]
    fn test_force_exit_exhausts_pathway() {
        let mut p = waiting_patient(&["TRIAGE", "TB", "ICU"]);
        p.force_exit().unwrap();
        assert_eq!(p.state(), PatientState::Exiting);
        assert_eq!(p.current_step(), 3);
        assert_eq!(p.steps_remaining(), 0);
    }

    #[test]
    fn test_stop_following_releases() {
        let mut p = waiting_patient(&["TRIAGE"]);
        p.begin_follow(AgentRole::Doctor).unwrap();
        assert_eq!(p.follow_target(), Some(AgentRole::Doctor));
        assert!(p.stop_following());
        assert_eq!(p.state(), PatientState::Waiting);
        assert!(!p.stop_following());
    }

    #[test]
    fn test_repair_clears_stale_timer() {
        let mut p = waiting_patient(&["TRIAGE", "TB"]);
        p.treatment_remaining = 4.0;
        let repairs = p.repair();
        assert_eq!(repairs, vec![Repair::ClearedStaleTimer { remaining: 4.0 }]);
        assert_eq!(p.treatment_remaining(), 0.0);
        assert!(p.repair().is_empty());
    }

    #[test]
    fn test_repair_completes_stuck_treatment() {
        let mut p = waiting_patient(&["TRIAGE", "TB"]);
        treat(&mut p, 5.0);
        p.treatment_remaining = 0.0;
        let repairs = p.repair();
        assert!(matches!(repairs[0], Repair::ForcedCompletion(_)));
        assert_eq!(p.state(), PatientState::Waiting);
        assert_eq!(p.current_step(), 1);
    }

    #[test]
    fn test_repair_clears_stray_follow_target() {
        let mut p = waiting_patient(&["TRIAGE"]);
        p.follow_target = Some(AgentRole::Nurse);
        assert_eq!(
            p.repair(),
            vec![Repair::ClearedFollowTarget(AgentRole::Nurse)]
        );
    }

    #[test]
    fn test_zero_duration_treatment_completes_on_first_tick() {
        let mut p = waiting_patient(&["TRIAGE", "TB"]);
        let epoch = treat(&mut p, 0.0);
        assert!(p.advance_treatment(epoch, 0.0).is_some());
    }
}
