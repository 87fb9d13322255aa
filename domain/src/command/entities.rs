//! Command entities

use super::wire::WireCommand;
use crate::core::error::DomainError;
use crate::patient::PatientId;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// What an agent is asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandAction {
    /// Walk to a location.
    Move,
    /// Pick up a patient and bring them to a location.
    Escort,
    /// Treat a patient at their current location.
    Treat,
    /// Release a patient without travelling.
    Leave,
    /// Idle for a fixed duration.
    Wait,
}

impl CommandAction {
    /// The action string used on the planner wire.
    pub fn as_wire(&self) -> &'static str {
        match self {
            CommandAction::Move => "MOVE",
            CommandAction::Escort => "ESCORT",
            CommandAction::Treat => "TREAT",
            CommandAction::Leave => "LEAVE_PATIENT",
            CommandAction::Wait => "WAIT",
        }
    }

    /// Whether the action refers to a patient that must still exist.
    pub fn targets_patient(&self) -> bool {
        matches!(
            self,
            CommandAction::Escort | CommandAction::Treat | CommandAction::Leave
        )
    }
}

impl FromStr for CommandAction {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MOVE" => Ok(CommandAction::Move),
            "ESCORT" => Ok(CommandAction::Escort),
            "TREAT" => Ok(CommandAction::Treat),
            "LEAVE_PATIENT" | "LEAVE" => Ok(CommandAction::Leave),
            "WAIT" => Ok(CommandAction::Wait),
            other => Err(DomainError::UnknownAction(other.to_string())),
        }
    }
}

impl std::fmt::Display for CommandAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_wire())
    }
}

/// A single queued instruction for one agent.
///
/// Only structural well-formedness is checked on construction; missing
/// targets or patients are detected (and the command abandoned) when the
/// agent executes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireCommand", into = "WireCommand")]
pub struct Command {
    pub action: CommandAction,
    pub target: Option<String>,
    pub patient_id: Option<PatientId>,
    /// Duration in time-units.
    pub duration: Option<f64>,
}

impl Command {
    fn bare(action: CommandAction) -> Self {
        Self {
            action,
            target: None,
            patient_id: None,
            duration: None,
        }
    }

    pub fn move_to(target: impl Into<String>) -> Self {
        Self {
            target: Some(target.into()),
            ..Self::bare(CommandAction::Move)
        }
    }

    pub fn escort(patient: PatientId, target: impl Into<String>) -> Self {
        Self {
            target: Some(target.into()),
            patient_id: Some(patient),
            ..Self::bare(CommandAction::Escort)
        }
    }

    pub fn treat(patient: PatientId, target: impl Into<String>, duration: f64) -> Self {
        Self {
            target: Some(target.into()),
            patient_id: Some(patient),
            duration: (duration > 0.0).then_some(duration),
            ..Self::bare(CommandAction::Treat)
        }
    }

    pub fn leave(patient: PatientId) -> Self {
        Self {
            patient_id: Some(patient),
            ..Self::bare(CommandAction::Leave)
        }
    }

    pub fn wait(duration: f64) -> Self {
        Self {
            duration: (duration > 0.0).then_some(duration),
            ..Self::bare(CommandAction::Wait)
        }
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    /// Short human-readable description for logs.
    pub fn describe(&self) -> String {
        let mut out = self.action.as_wire().to_string();
        if let Some(patient) = self.patient_id {
            out.push_str(&format!(" P{}", patient));
        }
        if let Some(target) = &self.target {
            out.push_str(&format!(" -> {}", target));
        }
        if let Some(duration) = self.duration {
            out.push_str(&format!(" ({}u)", duration));
        }
        out
    }
}

impl TryFrom<WireCommand> for Command {
    type Error = DomainError;

    fn try_from(wire: WireCommand) -> Result<Self, Self::Error> {
        let action = wire.action.parse()?;
        let target = Some(wire.target).filter(|t| !t.is_empty());
        // every negative id is the "no patient" marker
        let patient_id = match wire.patient_id {
            id if id < 0 => None,
            id => Some(PatientId::new(
                u32::try_from(id).map_err(|_| DomainError::InvalidPatientId(id))?,
            )),
        };
        // kept verbatim; the runtime treats non-positive values as absent
        let duration = (wire.duration != 0.0).then_some(wire.duration);
        Ok(Self {
            action,
            target,
            patient_id,
            duration,
        })
    }
}

impl From<Command> for WireCommand {
    fn from(cmd: Command) -> Self {
        Self {
            action: cmd.action.as_wire().to_string(),
            target: cmd.target.unwrap_or_default(),
            patient_id: cmd.patient_id.map(|p| i64::from(p.value())).unwrap_or(-1),
            duration: cmd.duration.unwrap_or(0.0),
        }
    }
}
