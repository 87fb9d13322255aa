//! Coordinator configuration.

use super::timing::TimingPolicy;
use serde::{Deserialize, Serialize};

/// Static parameters for a [`ScenarioCoordinator`](crate::use_cases::coordinator::ScenarioCoordinator).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub timing: TimingPolicy,
    /// Directory handed to the planner when it exports its analysis.
    pub output_dir: Option<String>,
    /// Notify the planner of step completions and exits.
    pub report_progress: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self::new(TimingPolicy::default())
    }
}

impl CoordinatorConfig {
    pub fn new(timing: TimingPolicy) -> Self {
        Self {
            timing,
            output_dir: None,
            report_progress: true,
        }
    }

    pub fn with_output_dir(mut self, dir: impl Into<String>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn with_report_progress(mut self, enabled: bool) -> Self {
        self.report_progress = enabled;
        self
    }
}
