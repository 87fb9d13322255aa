//! Agent value objects
//!
//! # Identity
//! - [`AgentRole`] - which of the two agents (exactly one instance per role)
//!
//! # Execution
//! - [`AgentState`] - what the agent's executor is doing right now

use serde::{Deserialize, Serialize};

/// Role of a mobile worker agent.
///
/// Exactly one agent per role exists for a scenario's lifetime, so the role
/// doubles as the agent's identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    Nurse,
    Doctor,
}

impl AgentRole {
    pub const ALL: [AgentRole; 2] = [AgentRole::Nurse, AgentRole::Doctor];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Nurse => "nurse",
            AgentRole::Doctor => "doctor",
        }
    }

    /// The other agent.
    pub fn other(&self) -> AgentRole {
        match self {
            AgentRole::Nurse => AgentRole::Doctor,
            AgentRole::Doctor => AgentRole::Nurse,
        }
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Executor state of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AgentState {
    #[default]
    Idle,
    Moving,
    Escorting,
    Treating,
    Waiting,
}

impl AgentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentState::Idle => "idle",
            AgentState::Moving => "moving",
            AgentState::Escorting => "escorting",
            AgentState::Treating => "treating",
            AgentState::Waiting => "waiting",
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, AgentState::Idle)
    }
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
