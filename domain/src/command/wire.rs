//! Literal command shape exchanged with the external planner.
//!
//! ```json
//! {"action": "ESCORT", "target": "TB", "patient_id": 3, "duration": 0.0}
//! ```
//!
//! `patient_id` is `-1` and `target` is `""` when not applicable.

use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireCommand {
    pub action: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub target: String,
    #[serde(default = "no_patient", deserialize_with = "null_as_no_patient")]
    pub patient_id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub duration: f64,
}

fn no_patient() -> i64 {
    -1
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn null_as_no_patient<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<i64>::deserialize(deserializer)?.unwrap_or(-1))
}
