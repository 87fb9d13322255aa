//! Planner backed by a JSON plan on disk.
//!
//! The file holds a planner response (`patients`, `nurse_plan`,
//! `doctor_plan`, ...). It is re-read on every request so it can be edited
//! between runs. Step and exit notifications are tallied locally and
//! written out by [`save_analysis`](PlannerPort::save_analysis).

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};
use ward_application::{PlannerError, PlannerPort};
use ward_domain::{
    AnalysisReport, PatientId, QueueStatus, RoomLayout, ScenarioPlan, ScenarioRequest, StepAck,
};

#[derive(Debug, Default, Serialize)]
struct Tally {
    plans_served: usize,
    steps: BTreeMap<PatientId, usize>,
    exited: Vec<PatientId>,
}

pub struct FilePlanner {
    path: PathBuf,
    tally: Mutex<Tally>,
}

impl FilePlanner {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            tally: Mutex::new(Tally::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_plan(&self) -> Result<ScenarioPlan, PlannerError> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| PlannerError::Unreachable(format!("{}: {}", self.path.display(), e)))?;
        let plan: ScenarioPlan = serde_json::from_str(&text)
            .map_err(|e| PlannerError::Malformed(format!("{}: {}", self.path.display(), e)))?;
        self.with_tally(|t| t.plans_served += 1);
        Ok(plan)
    }

    fn with_tally<R>(&self, f: impl FnOnce(&mut Tally) -> R) -> R {
        let mut guard = self
            .tally
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }
}

#[async_trait]
impl PlannerPort for FilePlanner {
    async fn plan_scenario(&self, request: &ScenarioRequest) -> Result<ScenarioPlan, PlannerError> {
        info!(
            file = %self.path.display(),
            description = %request.description,
            "Serving plan from file"
        );
        self.read_plan().await
    }

    async fn mark_step_complete(&self, patient: PatientId) -> Result<StepAck, PlannerError> {
        let steps = self.with_tally(|t| {
            let steps = t.steps.entry(patient).or_default();
            *steps += 1;
            *steps
        });
        debug!(%patient, steps, "Step recorded");
        Ok(StepAck::default())
    }

    async fn mark_patient_exit(&self, patient: PatientId) -> Result<(), PlannerError> {
        debug!(%patient, "Exit recorded");
        self.with_tally(|t| t.exited.push(patient));
        Ok(())
    }

    async fn next_plan(&self, _rooms: &[RoomLayout]) -> Result<ScenarioPlan, PlannerError> {
        self.read_plan().await
    }

    async fn queue_status(&self) -> Result<QueueStatus, PlannerError> {
        Ok(QueueStatus::default())
    }

    async fn reset(&self) -> Result<(), PlannerError> {
        self.with_tally(|t| *t = Tally::default());
        Ok(())
    }

    async fn save_analysis(&self, output_dir: Option<&str>) -> Result<AnalysisReport, PlannerError> {
        let Some(dir) = output_dir else {
            return Ok(AnalysisReport {
                saved: false,
                reason: Some("no output directory configured".to_string()),
                ..AnalysisReport::default()
            });
        };

        let json = self
            .with_tally(|t| serde_json::to_string_pretty(&*t))
            .map_err(|e| PlannerError::Malformed(e.to_string()))?;
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let path = Path::new(dir).join(format!("ward_analysis_{}.json", stamp));

        let written = async {
            tokio::fs::create_dir_all(dir).await?;
            tokio::fs::write(&path, json).await
        }
        .await;

        Ok(match written {
            Ok(()) => {
                info!(path = %path.display(), "Analysis saved");
                AnalysisReport {
                    saved: true,
                    data_path: Some(path.display().to_string()),
                    ..AnalysisReport::default()
                }
            }
            Err(e) => AnalysisReport {
                saved: false,
                reason: Some(e.to_string()),
                ..AnalysisReport::default()
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ward_domain::CommandAction;

    const PLAN: &str = r#"{
        "success": true,
        "patients": [
            {"id": 1, "type": "Minor", "pathway": ["TRIAGE", "TB"]},
            {"id": 2, "type": "Minor", "pathway": ["TRIAGE", "TB"]}
        ],
        "nurse_plan": {"commands": [
            {"action": "ESCORT", "target": "TRIAGE", "patient_id": 1, "duration": 0},
            {"action": "TREAT", "target": "TRIAGE", "patient_id": 1, "duration": 5}
        ]},
        "doctor_plan": {"commands": [
            {"action": "ESCORT", "target": "TRIAGE", "patient_id": 2, "duration": 0},
            {"action": "TREAT", "target": "TRIAGE", "patient_id": 2, "duration": 5}
        ]}
    }"#;

    fn write_plan(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("plan.json");
        std::fs::write(&path, PLAN).unwrap();
        path
    }

    #[tokio::test]
    async fn test_plan_read_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let planner = FilePlanner::new(write_plan(&dir));

        let plan = planner
            .plan_scenario(&ScenarioRequest::new("two minor patients"))
            .await
            .unwrap();
        assert_eq!(plan.patients.len(), 2);
        assert_eq!(plan.nurse_plan[1].action, CommandAction::Treat);
        assert_eq!(plan.doctor_plan[0].patient_id, Some(PatientId::new(2)));
    }

    #[tokio::test]
    async fn test_missing_file_is_unreachable() {
        let dir = tempfile::tempdir().unwrap();
        let planner = FilePlanner::new(dir.path().join("missing.json"));
        let result = planner.plan_scenario(&ScenarioRequest::new("x")).await;
        assert!(matches!(result, Err(PlannerError::Unreachable(_))));
    }

    #[tokio::test]
    async fn test_invalid_json_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.json");
        std::fs::write(&path, r#"{"nurse_plan": [{"action": "FLY"}]}"#).unwrap();
        let planner = FilePlanner::new(path);
        let result = planner.plan_scenario(&ScenarioRequest::new("x")).await;
        assert!(matches!(result, Err(PlannerError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_save_analysis_writes_tally() {
        let dir = tempfile::tempdir().unwrap();
        let planner = FilePlanner::new(write_plan(&dir));
        planner.plan_scenario(&ScenarioRequest::new("x")).await.unwrap();
        planner.mark_step_complete(PatientId::new(1)).await.unwrap();
        planner.mark_step_complete(PatientId::new(1)).await.unwrap();
        planner.mark_patient_exit(PatientId::new(1)).await.unwrap();

        let out = dir.path().join("reports");
        let report = planner
            .save_analysis(Some(out.to_str().unwrap()))
            .await
            .unwrap();
        assert!(report.saved);

        let saved: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(report.data_path.unwrap()).unwrap())
                .unwrap();
        assert_eq!(saved["plans_served"], 1);
        assert_eq!(saved["steps"]["1"], 2);
        assert_eq!(saved["exited"], serde_json::json!([1]));
    }

    #[tokio::test]
    async fn test_save_analysis_without_dir_is_not_saved() {
        let dir = tempfile::tempdir().unwrap();
        let planner = FilePlanner::new(write_plan(&dir));
        let report = planner.save_analysis(None).await.unwrap();
        assert!(!report.saved);
        assert!(report.reason.is_some());
    }

    #[tokio::test]
    async fn test_reset_clears_tally() {
        let dir = tempfile::tempdir().unwrap();
        let planner = FilePlanner::new(write_plan(&dir));
        planner.mark_step_complete(PatientId::new(3)).await.unwrap();
        planner.reset().await.unwrap();
        assert!(planner.with_tally(|t| t.steps.is_empty()));
    }
}
