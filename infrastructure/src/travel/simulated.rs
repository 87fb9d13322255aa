//! Straight-line travel simulated with timers.
//!
//! Each traveller walks the euclidean distance from its last known position
//! at `speed` floor units per time-unit (slower while escorting). Travellers
//! seen for the first time start at the configured origin. A trip that is
//! cancelled part-way leaves the traveller at its previous position.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::trace;
use ward_application::{Pace, TimingPolicy, TravelError, TravelPort, Traveler};
use ward_domain::{Location, Point};

pub struct SimulatedTravel {
    timing: TimingPolicy,
    origin: Point,
    speed: f64,
    escort_pace: f64,
    positions: Mutex<HashMap<Traveler, Point>>,
}

impl SimulatedTravel {
    pub fn new(timing: TimingPolicy, origin: Point) -> Self {
        Self {
            timing,
            origin,
            speed: 2.0,
            escort_pace: 0.75,
            positions: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_escort_pace(mut self, pace: f64) -> Self {
        self.escort_pace = pace;
        self
    }

    pub fn position_of(&self, traveler: Traveler) -> Point {
        self.positions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&traveler)
            .copied()
            .unwrap_or(self.origin)
    }

    fn place(&self, traveler: Traveler, point: Point) {
        self.positions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(traveler, point);
    }

    /// Simulation units needed to cover `distance` at `pace`.
    fn trip_units(&self, distance: f64, pace: Pace) -> Result<f64, TravelError> {
        let factor = match pace {
            Pace::Normal => 1.0,
            Pace::Escort => self.escort_pace,
        };
        let speed = self.speed * factor;
        if !(speed.is_finite() && speed > 0.0) {
            return Err(TravelError::Failed(format!("invalid travel speed {}", speed)));
        }
        Ok(distance / speed)
    }
}

#[async_trait]
impl TravelPort for SimulatedTravel {
    async fn travel_to(
        &self,
        traveler: Traveler,
        destination: &Location,
        pace: Pace,
    ) -> Result<(), TravelError> {
        let from = self.position_of(traveler);
        let to = destination.arrival_point;
        let units = self.trip_units(from.distance_to(&to), pace)?;
        trace!(%traveler, to = %destination.name, units, "Travelling");

        tokio::time::sleep(self.timing.sim(units)).await;
        self.place(traveler, to);
        Ok(())
    }
}
