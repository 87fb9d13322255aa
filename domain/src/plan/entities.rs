//! Planner payload entities

use crate::command::Command;
use crate::location::LocationRegistry;
use crate::patient::{Patient, PatientId, Severity};
use serde::{Deserialize, Serialize};

/// A patient as described by the planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientDescriptor {
    pub id: PatientId,
    #[serde(rename = "type", default)]
    pub severity: Severity,
    #[serde(default)]
    pub description: String,
    /// Empty means the standard pathway for the severity.
    #[serde(default)]
    pub pathway: Vec<String>,
    #[serde(default)]
    pub deadline: Option<f64>,
    #[serde(rename = "doctor_required", default)]
    pub requires_doctor: Option<bool>,
}

impl PatientDescriptor {
    pub fn new(id: PatientId, severity: Severity) -> Self {
        Self {
            id,
            severity,
            description: String::new(),
            pathway: Vec::new(),
            deadline: None,
            requires_doctor: None,
        }
    }

    pub fn with_pathway<I, S>(mut self, pathway: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pathway = pathway.into_iter().map(Into::into).collect();
        self
    }

    /// Build the patient entity, filling unspecified fields from the severity.
    pub fn to_patient(&self) -> Patient {
        let pathway = if self.pathway.is_empty() {
            self.severity.default_pathway()
        } else {
            self.pathway.clone()
        };
        Patient::new(self.id, self.severity, pathway)
            .with_deadline(self.deadline.unwrap_or_else(|| self.severity.default_deadline()))
            .with_requires_doctor(
                self.requires_doctor
                    .unwrap_or_else(|| self.severity.requires_doctor()),
            )
            .with_description(self.description.clone())
    }
}

/// Strategy chosen by the planner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    #[serde(default)]
    pub strategy: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub expected_value: Option<f64>,
}

/// Ordered command lists for both agents plus the patients they refer to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioPlan {
    #[serde(default)]
    pub patients: Vec<PatientDescriptor>,
    #[serde(default, with = "command_list")]
    pub nurse_plan: Vec<Command>,
    #[serde(default, with = "command_list")]
    pub doctor_plan: Vec<Command>,
    #[serde(default)]
    pub expected_reward: Option<f64>,
    #[serde(default)]
    pub learning_stats: Option<serde_json::Value>,
    #[serde(default)]
    pub assignment: Option<Assignment>,
}

impl ScenarioPlan {
    pub fn new(patients: Vec<PatientDescriptor>) -> Self {
        Self {
            patients,
            ..Self::default()
        }
    }

    pub fn with_nurse_plan(mut self, commands: Vec<Command>) -> Self {
        self.nurse_plan = commands;
        self
    }

    pub fn with_doctor_plan(mut self, commands: Vec<Command>) -> Self {
        self.doctor_plan = commands;
        self
    }

    pub fn command_count(&self) -> usize {
        self.nurse_plan.len() + self.doctor_plan.len()
    }
}

/// Planner command lists arrive either bare or wrapped as `{"commands": [...]}`.
mod command_list {
    use crate::command::Command;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Shape {
        Bare(Vec<Command>),
        Wrapped {
            #[serde(default)]
            commands: Vec<Command>,
        },
    }

    #[derive(Serialize)]
    struct Wrapped<'a> {
        commands: &'a [Command],
    }

    pub fn serialize<S: Serializer>(commands: &[Command], serializer: S) -> Result<S::Ok, S::Error> {
        Wrapped { commands }.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Command>, D::Error> {
        Ok(match Option::<Shape>::deserialize(deserializer)? {
            Some(Shape::Bare(commands)) | Some(Shape::Wrapped { commands }) => commands,
            None => Vec::new(),
        })
    }
}

/// Room coordinates sent to the planner so it can estimate travel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomLayout {
    pub name: String,
    pub x: f64,
    pub z: f64,
}

impl RoomLayout {
    pub fn from_registry(registry: &LocationRegistry) -> Vec<RoomLayout> {
        registry
            .iter()
            .map(|l| RoomLayout {
                name: l.name.clone(),
                x: l.arrival_point.x,
                z: l.arrival_point.z,
            })
            .collect()
    }
}

/// Request for a new scenario plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioRequest {
    pub description: String,
    #[serde(default)]
    pub rooms: Vec<RoomLayout>,
}

impl ScenarioRequest {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            rooms: Vec::new(),
        }
    }

    pub fn with_rooms(mut self, registry: &LocationRegistry) -> Self {
        self.rooms = RoomLayout::from_registry(registry);
        self
    }
}

/// One entry of the planner's patient queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedPatient {
    pub id: PatientId,
    #[serde(rename = "type", default)]
    pub severity: Severity,
    #[serde(default)]
    pub next_room: Option<String>,
    #[serde(default)]
    pub current_step: usize,
    #[serde(default)]
    pub pathway_length: usize,
    #[serde(default)]
    pub steps_remaining: usize,
    #[serde(default)]
    pub urgency: f64,
}

/// The planner's view of its patient queue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueStatus {
    #[serde(default)]
    pub queue_size: usize,
    #[serde(default)]
    pub patients: Vec<QueuedPatient>,
}

/// Acknowledgement of a completed step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepAck {
    #[serde(default)]
    pub patient_complete: bool,
    #[serde(default)]
    pub queue_status: Option<QueueStatus>,
}

/// Result of asking the planner to export its analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    #[serde(default)]
    pub saved: bool,
    #[serde(default)]
    pub chart_path: Option<String>,
    #[serde(default)]
    pub data_path: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandAction;
    use serde_json::json;

    #[test]
    fn test_parse_planner_response() {
        let plan: ScenarioPlan = serde_json::from_value(json!({
            "success": true,
            "patients": [
                {"id": 1, "type": "Critical", "description": "chest pain",
                 "pathway": ["TRIAGE", "TB", "ICU"], "deadline": 25.0, "doctor_required": true},
                {"id": 2, "type": "Minor"}
            ],
            "nurse_plan": {"commands": [
                {"action": "ESCORT", "target": "TRIAGE", "patient_id": 1, "duration": 0, "from_room": "WAITING"},
                {"action": "TREAT", "target": "TRIAGE", "patient_id": 1, "duration": 5}
            ]},
            "doctor_plan": {"commands": []},
            "expected_reward": 42.5,
            "learning_stats": {"iterations": 20},
            "assignment": {"strategy": "NURSE_TRIAGE_DOCTOR_TREAT", "description": "split"}
        }))
        .unwrap();

        assert_eq!(plan.patients.len(), 2);
        assert_eq!(plan.nurse_plan.len(), 2);
        assert_eq!(plan.nurse_plan[1].action, CommandAction::Treat);
        assert!(plan.doctor_plan.is_empty());
        assert_eq!(plan.expected_reward, Some(42.5));
        assert_eq!(plan.command_count(), 2);
    }

    #[test]
    fn test_bare_command_lists_accepted() {
        let plan: ScenarioPlan = serde_json::from_value(json!({
            "nurse_plan": [{"action": "MOVE", "target": "ENT", "patient_id": -1, "duration": 0}],
            "doctor_plan": null
        }))
        .unwrap();
        assert_eq!(plan.nurse_plan, vec![Command::move_to("ENT")]);
        assert!(plan.doctor_plan.is_empty());
    }

    #[test]
    fn test_descriptor_defaults_from_severity() {
        let desc = PatientDescriptor::new(PatientId::new(5), Severity::Moderate);
        let patient = desc.to_patient();
        assert_eq!(patient.pathway().len(), 4);
        assert_eq!(patient.deadline, 45.0);
        assert!(!patient.requires_doctor);

        let custom = PatientDescriptor::new(PatientId::new(6), Severity::Minor)
            .with_pathway(["TRIAGE"]);
        assert_eq!(custom.to_patient().pathway(), ["TRIAGE".to_string()]);
    }

    #[test]
    fn test_request_carries_rooms() {
        let request = ScenarioRequest::new("two patients")
            .with_rooms(&LocationRegistry::default_ward());
        assert_eq!(request.rooms.len(), 6);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["description"], "two patients");
    }
}
