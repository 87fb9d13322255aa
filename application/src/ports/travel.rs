//! Travel port
//!
//! Movement of agents and patients between locations. The application layer
//! only needs to know when a traveller has arrived; how the trip is carried
//! out (simulated delay, a real navigation system, a game engine) is an
//! adapter concern.
//!
//! Trips are cancelled by dropping the returned future.

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;
use ward_domain::{AgentRole, Location, PatientId};

/// Who is travelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Traveler {
    Agent(AgentRole),
    Patient(PatientId),
}

impl fmt::Display for Traveler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Traveler::Agent(role) => write!(f, "{}", role),
            Traveler::Patient(id) => write!(f, "patient {}", id),
        }
    }
}

/// Walking pace. Escorted trips move at the patient's speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pace {
    #[default]
    Normal,
    Escort,
}

#[derive(Error, Debug)]
pub enum TravelError {
    #[error("No route for {traveler} to {destination}")]
    NoRoute {
        traveler: Traveler,
        destination: String,
    },

    #[error("Travel failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait TravelPort: Send + Sync {
    /// Resolve once `traveler` has reached `destination`.
    async fn travel_to(
        &self,
        traveler: Traveler,
        destination: &Location,
        pace: Pace,
    ) -> Result<(), TravelError>;
}

/// Travel that arrives immediately.
pub struct InstantTravel;

#[async_trait]
impl TravelPort for InstantTravel {
    async fn travel_to(
        &self,
        _traveler: Traveler,
        _destination: &Location,
        _pace: Pace,
    ) -> Result<(), TravelError> {
        Ok(())
    }
}
