//! HTTP client for the planning service.
//!
//! Every endpoint answers JSON. A body with `"success": false` is a
//! rejection whatever the HTTP status; a missing `success` field counts as
//! success (`/get_plan` and `/save_analysis` return bare payloads).

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;
use ward_application::{PlannerError, PlannerPort};
use ward_domain::{
    AnalysisReport, PatientId, QueueStatus, RoomLayout, ScenarioPlan, ScenarioRequest, StepAck,
};

pub struct HttpPlanner {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPlanner {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, PlannerError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ward-coordinator/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PlannerError::Unreachable(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T, PlannerError> {
        debug!(endpoint = path, "POST planner");
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;
        read_body(response).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, PlannerError> {
        debug!(endpoint = path, "GET planner");
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(transport_error)?;
        read_body(response).await
    }
}

fn transport_error(error: reqwest::Error) -> PlannerError {
    if error.is_timeout() {
        PlannerError::Timeout
    } else {
        PlannerError::Unreachable(error.to_string())
    }
}

async fn read_body<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, PlannerError> {
    let status = response.status();
    let text = response.text().await.map_err(transport_error)?;
    let value: Value = match serde_json::from_str(&text) {
        Ok(value) => value,
        Err(_) if !status.is_success() => {
            return Err(PlannerError::Rejected(format!(
                "HTTP {} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }
        Err(e) => return Err(PlannerError::Malformed(e.to_string())),
    };
    decode_envelope(value, status.is_success())
}

/// Turn a planner response body into `T`, honouring the `success` flag.
pub(crate) fn decode_envelope<T: DeserializeOwned>(
    value: Value,
    http_ok: bool,
) -> Result<T, PlannerError> {
    let succeeded = value
        .get("success")
        .and_then(Value::as_bool)
        .unwrap_or(http_ok);
    if !succeeded {
        let reason = value
            .get("error")
            .or_else(|| value.get("reason"))
            .and_then(Value::as_str)
            .unwrap_or("no reason given");
        return Err(PlannerError::Rejected(reason.to_string()));
    }
    serde_json::from_value(value).map_err(|e| PlannerError::Malformed(e.to_string()))
}

#[derive(serde::Deserialize)]
struct QueueStatusEnvelope {
    #[serde(default)]
    queue_status: QueueStatus,
}

#[async_trait]
impl PlannerPort for HttpPlanner {
    async fn plan_scenario(&self, request: &ScenarioRequest) -> Result<ScenarioPlan, PlannerError> {
        let body = serde_json::to_value(request).map_err(|e| PlannerError::Malformed(e.to_string()))?;
        self.post("process_scenario", &body).await
    }

    async fn mark_step_complete(&self, patient: PatientId) -> Result<StepAck, PlannerError> {
        self.post("complete_step", &json!({ "patient_id": patient }))
            .await
    }

    async fn mark_patient_exit(&self, patient: PatientId) -> Result<(), PlannerError> {
        let _: Value = self
            .post("patient_exit", &json!({ "patient_id": patient }))
            .await?;
        Ok(())
    }

    async fn next_plan(&self, rooms: &[RoomLayout]) -> Result<ScenarioPlan, PlannerError> {
        self.post("get_plan", &json!({ "rooms": rooms })).await
    }

    async fn queue_status(&self) -> Result<QueueStatus, PlannerError> {
        let envelope: QueueStatusEnvelope = self.get("queue_status").await?;
        Ok(envelope.queue_status)
    }

    async fn reset(&self) -> Result<(), PlannerError> {
        let _: Value = self.post("reset", &json!({})).await?;
        Ok(())
    }

    async fn save_analysis(&self, output_dir: Option<&str>) -> Result<AnalysisReport, PlannerError> {
        let body = match output_dir {
            Some(dir) => json!({ "output_dir": dir }),
            None => json!({}),
        };
        // A failed export still carries a report with the reason.
        let value: Value = self.post("save_analysis", &body).await.or_else(|e| match e {
            PlannerError::Rejected(reason) => Ok(json!({ "saved": false, "reason": reason })),
            other => Err(other),
        })?;
        serde_json::from_value(value).map_err(|e| PlannerError::Malformed(e.to_string()))
    }

    async fn health(&self) -> Result<(), PlannerError> {
        let status: Value = self.get("health").await?;
        match status.get("status").and_then(Value::as_str) {
            Some("ok") => Ok(()),
            other => Err(PlannerError::Rejected(format!(
                "health status {}",
                other.unwrap_or("missing")
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joining() {
        let planner = HttpPlanner::new("http://localhost:5000/", Duration::from_secs(1)).unwrap();
        assert_eq!(planner.base_url(), "http://localhost:5000");
        assert_eq!(planner.url("/reset"), "http://localhost:5000/reset");
        assert_eq!(planner.url("get_plan"), "http://localhost:5000/get_plan");
    }

    #[test]
    fn test_envelope_rejection_uses_error_field() {
        let result: Result<ScenarioPlan, _> = decode_envelope(
            json!({"success": false, "error": "No patients found in description", "parsed_count": 0}),
            true,
        );
        match result {
            Err(PlannerError::Rejected(reason)) => {
                assert_eq!(reason, "No patients found in description")
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_envelope_accepts_bare_payload() {
        let plan: ScenarioPlan = decode_envelope(
            json!({
                "nurse_plan": {"commands": [{"action": "WAIT", "target": "", "patient_id": -1, "duration": 2.0}]},
                "doctor_plan": {"commands": []},
                "expected_reward": 3.0
            }),
            true,
        )
        .unwrap();
        assert_eq!(plan.nurse_plan.len(), 1);
        assert_eq!(plan.expected_reward, Some(3.0));
    }

    #[test]
    fn test_envelope_http_error_without_flag_is_rejected() {
        let result: Result<Value, _> = decode_envelope(json!({"message": "boom"}), false);
        assert!(matches!(result, Err(PlannerError::Rejected(_))));
    }

    #[test]
    fn test_step_ack_decodes_queue_status() {
        let ack: StepAck = decode_envelope(
            json!({
                "success": true,
                "patient_complete": false,
                "queue_status": {"queue_size": 1, "patients": [
                    {"id": 1, "type": "Minor", "health": 50, "next_room": "TB",
                     "urgency": 0.4, "current_step": 1, "pathway_length": 2, "steps_remaining": 1}
                ]}
            }),
            true,
        )
        .unwrap();
        assert!(!ack.patient_complete);
        let status = ack.queue_status.unwrap();
        assert_eq!(status.queue_size, 1);
        assert_eq!(status.patients[0].next_room.as_deref(), Some("TB"));
    }

    #[test]
    fn test_malformed_payload() {
        let result: Result<StepAck, _> =
            decode_envelope(json!({"success": true, "patient_complete": "maybe"}), true);
        assert!(matches!(result, Err(PlannerError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_unreachable_planner_reports_error() {
        // Port 9 (discard) is not expected to run an HTTP server.
        let planner = HttpPlanner::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let result = planner
            .plan_scenario(&ScenarioRequest::new("one minor patient"))
            .await;
        assert!(matches!(
            result,
            Err(PlannerError::Unreachable(_)) | Err(PlannerError::Timeout)
        ));
    }
}
