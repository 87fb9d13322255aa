//! Planner configuration from TOML (`[planner]` section)

use serde::{Deserialize, Serialize};

/// Default address of the planning service.
pub const DEFAULT_PLANNER_URL: &str = "http://127.0.0.1:5000";

/// Raw planner configuration from TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilePlannerConfig {
    /// Base URL of the HTTP planner
    pub url: String,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// Directory the planner writes its analysis export to
    pub output_dir: Option<String>,
    /// Read plans from this JSON file instead of the HTTP planner
    pub plan_file: Option<String>,
    /// Notify the planner of step completions and patient exits
    pub report_progress: bool,
}

impl Default for FilePlannerConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_PLANNER_URL.to_string(),
            timeout_seconds: 30,
            output_dir: None,
            plan_file: None,
            report_progress: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_planner_section_deserialize() {
        let toml_str = r#"
[planner]
url = "http://planner.local:8080"
plan_file = "plans/two_patients.json"
report_progress = false
"#;
        let config: super::super::FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.planner.url, "http://planner.local:8080");
        assert_eq!(
            config.planner.plan_file.as_deref(),
            Some("plans/two_patients.json")
        );
        assert!(!config.planner.report_progress);
        assert_eq!(config.planner.timeout_seconds, 30);
    }
}
