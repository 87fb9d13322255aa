//! Timing policy: every interval, bound and factor used by the runtime.
//!
//! Two clocks are in play:
//!
//! - **simulation units** (travel, treatment, escort arbitration) are
//!   scaled by [`TimingPolicy::speed`]
//! - **real units** (the waiting-step timeouts) are never scaled, so a
//!   sped-up scenario still gives stuck patients the same wall-clock grace
//!
//! One unit is [`TimingPolicy::time_unit`] long.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Longest interval any conversion yields (30 days), so deadlines built
/// from wire durations stay representable.
pub const MAX_DURATION: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Runtime timing parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingPolicy {
    /// Length of one time-unit in milliseconds.
    pub time_unit_ms: u64,
    /// Simulation speed multiplier. Values `<= 0` are treated as `1`.
    pub speed: f64,
    /// Interval between escort arbitration checks (sim units).
    pub escort_poll_interval: f64,
    /// Checks allowed while the patient is held by the other agent.
    pub escort_follow_attempts: u32,
    /// Checks allowed while the patient is in treatment.
    pub escort_treatment_attempts: u32,
    /// How long an agent stays at a location that does not require presence.
    pub isolated_setup: f64,
    /// Watchdog fires at `nominal * generic_timeout_factor`.
    pub generic_timeout_factor: f64,
    /// Isolated backup fires at `nominal + isolated_backup_grace`.
    pub isolated_backup_grace: f64,
    /// Waiting timeout at a non-final step (real units).
    pub waiting_step_timeout: f64,
    /// Waiting timeout at the final step (real units).
    pub final_step_timeout: f64,
    /// Treatment countdown granularity (sim units).
    pub treatment_tick: f64,
    /// Treatment length when neither the location nor the command gives one.
    pub default_treatment: f64,
}

impl Default for TimingPolicy {
    fn default() -> Self {
        Self {
            time_unit_ms: 1000,
            speed: 1.0,
            escort_poll_interval: 0.5,
            escort_follow_attempts: 60,
            escort_treatment_attempts: 120,
            isolated_setup: 5.0,
            generic_timeout_factor: 2.0,
            isolated_backup_grace: 1.0,
            waiting_step_timeout: 60.0,
            final_step_timeout: 10.0,
            treatment_tick: 0.25,
            default_treatment: 10.0,
        }
    }
}

impl TimingPolicy {
    // ==================== Builder Methods ====================

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_time_unit(mut self, unit: Duration) -> Self {
        self.time_unit_ms = unit.as_millis().max(1) as u64;
        self
    }

    // ==================== Conversions ====================

    pub fn time_unit(&self) -> Duration {
        Duration::from_millis(self.time_unit_ms.max(1))
    }

    fn effective_speed(&self) -> f64 {
        if self.speed.is_finite() && self.speed > 0.0 {
            self.speed
        } else {
            1.0
        }
    }

    /// Duration of `units` simulation time-units at the current speed.
    pub fn sim(&self, units: f64) -> Duration {
        self.units(units / self.effective_speed())
    }

    /// Duration of `units` real time-units (speed ignored).
    pub fn real(&self, units: f64) -> Duration {
        self.units(units)
    }

    /// Negative and NaN counts give zero; anything past [`MAX_DURATION`] is capped.
    fn units(&self, units: f64) -> Duration {
        if units.is_nan() || units <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(self.time_unit().as_secs_f64() * units)
            .map_or(MAX_DURATION, |d| d.min(MAX_DURATION))
    }

    /// Convert an elapsed wall duration back to simulation units.
    pub fn to_sim_units(&self, elapsed: Duration) -> f64 {
        elapsed.as_secs_f64() / self.time_unit().as_secs_f64() * self.effective_speed()
    }

    /// Total time an escort waits for another agent to let go.
    pub fn escort_follow_bound(&self) -> Duration {
        self.sim(self.escort_poll_interval * f64::from(self.escort_follow_attempts))
    }

    /// Total time an escort waits for a treatment in progress.
    pub fn escort_treatment_bound(&self) -> Duration {
        self.sim(self.escort_poll_interval * f64::from(self.escort_treatment_attempts))
    }

    /// Waiting-step timeout for a patient at the final step or not.
    pub fn waiting_timeout(&self, final_step: bool) -> Duration {
        if final_step {
            self.real(self.final_step_timeout)
        } else {
            self.real(self.waiting_step_timeout)
        }
    }

    /// How long the treating agent stays for a treatment of `nominal` units.
    pub fn agent_stay(&self, nominal: f64, isolated: bool) -> f64 {
        if isolated {
            self.isolated_setup.min(nominal)
        } else {
            nominal
        }
    }

    /// Pick the nominal treatment duration: location, then command, then default.
    pub fn treatment_duration(&self, location: Option<f64>, command: Option<f64>) -> f64 {
        location
            .filter(|d| *d > 0.0)
            .or(command.filter(|d| *d > 0.0))
            .unwrap_or(self.default_treatment)
    }

    /// Validate the policy, returning a description of the first problem.
    pub fn validate(&self) -> Result<(), String> {
        let positive = [
            ("escort_poll_interval", self.escort_poll_interval),
            ("treatment_tick", self.treatment_tick),
            ("generic_timeout_factor", self.generic_timeout_factor),
            ("default_treatment", self.default_treatment),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(format!("{name} must be positive (got {value})"));
            }
        }
        let non_negative = [
            ("isolated_setup", self.isolated_setup),
            ("isolated_backup_grace", self.isolated_backup_grace),
            ("waiting_step_timeout", self.waiting_step_timeout),
            ("final_step_timeout", self.final_step_timeout),
        ];
        for (name, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(format!("{name} must not be negative (got {value})"));
            }
        }
        if !(self.speed.is_finite() && self.speed > 0.0) {
            return Err(format!("speed must be positive (got {})", self.speed));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bounds() {
        let timing = TimingPolicy::default();
        assert_eq!(timing.escort_follow_bound(), Duration::from_secs(30));
        assert_eq!(timing.escort_treatment_bound(), Duration::from_secs(60));
        assert_eq!(timing.waiting_timeout(false), Duration::from_secs(60));
        assert_eq!(timing.waiting_timeout(true), Duration::from_secs(10));
    }

    #[test]
    fn test_speed_scales_sim_but_not_real() {
        let timing = TimingPolicy::default().with_speed(4.0);
        assert_eq!(timing.sim(8.0), Duration::from_secs(2));
        assert_eq!(timing.real(8.0), Duration::from_secs(8));
        assert_eq!(timing.waiting_timeout(true), Duration::from_secs(10));
        assert!((timing.to_sim_units(Duration::from_secs(2)) - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_speed_falls_back_to_one() {
        let timing = TimingPolicy::default().with_speed(0.0);
        assert_eq!(timing.sim(3.0), Duration::from_secs(3));
        assert!(timing.validate().is_err());
    }

    #[test]
    fn test_out_of_range_units_are_clamped() {
        let timing = TimingPolicy::default();
        assert_eq!(timing.sim(1e300), MAX_DURATION);
        assert_eq!(timing.sim(f64::INFINITY), MAX_DURATION);
        assert_eq!(timing.real(f64::MAX), MAX_DURATION);
        assert_eq!(timing.sim(f64::NAN), Duration::ZERO);
        assert_eq!(timing.sim(-5.0), Duration::ZERO);
        assert_eq!(timing.sim(3.0), Duration::from_secs(3));
    }

    #[test]
    fn test_treatment_duration_precedence() {
        let timing = TimingPolicy::default();
        assert_eq!(timing.treatment_duration(Some(5.0), Some(7.0)), 5.0);
        assert_eq!(timing.treatment_duration(Some(0.0), Some(7.0)), 7.0);
        assert_eq!(timing.treatment_duration(None, None), 10.0);
    }

    #[test]
    fn test_agent_stay_for_isolated_location() {
        let timing = TimingPolicy::default();
        assert_eq!(timing.agent_stay(45.0, true), 5.0);
        assert_eq!(timing.agent_stay(3.0, true), 3.0);
        assert_eq!(timing.agent_stay(45.0, false), 45.0);
    }

    #[test]
    fn test_validate_rejects_zero_tick() {
        let timing = TimingPolicy {
            treatment_tick: 0.0,
            ..TimingPolicy::default()
        };
        let err = timing.validate().unwrap_err();
        assert!(err.contains("treatment_tick"));
        assert!(TimingPolicy::default().validate().is_ok());
    }
}
