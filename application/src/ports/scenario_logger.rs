//! Port for structured scenario logging.
//!
//! Defines the [`ScenarioLogger`] trait for recording what happened during a
//! scenario (plans received, commands finished, steps completed, exits) to a
//! machine-readable log.
//!
//! This is separate from `tracing`-based operation logs: tracing handles
//! human-readable diagnostics, while this port captures the scenario record
//! (JSONL in the infrastructure adapter).

use serde_json::Value;

/// A structured scenario event for logging.
pub struct ScenarioRecord {
    /// Event type identifier (e.g., "plan_dispatched", "action_complete").
    pub event_type: &'static str,
    /// Scenario tag the event belongs to.
    pub scenario: u64,
    /// JSON payload with event-specific data.
    pub payload: Value,
}

impl ScenarioRecord {
    pub fn new(event_type: &'static str, scenario: u64, payload: Value) -> Self {
        Self {
            event_type,
            scenario,
            payload,
        }
    }
}

/// Port for logging scenario events.
///
/// `log` is synchronous and non-fallible; adapters swallow write failures.
pub trait ScenarioLogger: Send + Sync {
    fn log(&self, record: ScenarioRecord);
}

/// No-op implementation for tests and when logging is disabled.
pub struct NoScenarioLogger;

impl ScenarioLogger for NoScenarioLogger {
    fn log(&self, _record: ScenarioRecord) {}
}
