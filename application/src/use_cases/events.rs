//! Events flowing from agents and patients back to the coordinator.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use ward_domain::{AgentRole, Command, PatientId, StepCompletion};

/// How a command ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The command did what it asked for.
    Completed,
    /// TREAT joined a treatment the other agent had already started.
    Assisted,
    /// Preconditions did not hold; nothing was done.
    Skipped,
    /// Started but gave up (contention timeout, travel failure).
    Abandoned,
}

impl ActionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionOutcome::Completed => "completed",
            ActionOutcome::Assisted => "assisted",
            ActionOutcome::Skipped => "skipped",
            ActionOutcome::Abandoned => "abandoned",
        }
    }
}

/// What moved a patient past a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepCause {
    /// The treatment countdown reached zero.
    Treatment,
    /// The generic watchdog fired at twice the nominal duration.
    Watchdog,
    /// The isolated-location backup fired.
    IsolatedBackup,
    /// The patient waited too long and the step was skipped.
    WaitingTimeout,
    /// Invariant repair found an expired treatment.
    Repair,
}

impl StepCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepCause::Treatment => "treatment",
            StepCause::Watchdog => "watchdog",
            StepCause::IsolatedBackup => "isolated_backup",
            StepCause::WaitingTimeout => "waiting_timeout",
            StepCause::Repair => "repair",
        }
    }

    /// Whether a safety net rather than the normal path produced the step.
    pub fn is_forced(&self) -> bool {
        !matches!(self, StepCause::Treatment)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScenarioEvent {
    ActionComplete {
        role: AgentRole,
        command: Command,
        outcome: ActionOutcome,
    },
    StepComplete {
        patient: PatientId,
        completion: StepCompletion,
        cause: StepCause,
    },
    PatientExited {
        patient: PatientId,
    },
}

/// An event tagged with the scenario it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioMessage {
    pub scenario: u64,
    pub event: ScenarioEvent,
}

/// Sending half of the coordinator's event channel.
///
/// The scenario tag is shared with the coordinator so long-lived agents
/// always report under the current scenario; patients get a
/// [`pinned`](EventSink::pinned) copy so late events from a replaced
/// scenario are recognisable.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<ScenarioMessage>,
    scenario: Arc<AtomicU64>,
}

impl EventSink {
    pub fn new(tx: mpsc::UnboundedSender<ScenarioMessage>, scenario: Arc<AtomicU64>) -> Self {
        Self { tx, scenario }
    }

    /// A sink fixed to the scenario that is current right now.
    pub fn pinned(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            scenario: Arc::new(AtomicU64::new(self.scenario())),
        }
    }

    pub fn scenario(&self) -> u64 {
        self.scenario.load(Ordering::SeqCst)
    }

    /// Send an event; a closed channel means the coordinator is gone.
    pub fn emit(&self, event: ScenarioEvent) {
        let _ = self.tx.send(ScenarioMessage {
            scenario: self.scenario(),
            event,
        });
    }
}
