use anyhow::{Context, ensure};
use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::value::RawValue;

pub const MIN_WEIGHT_KG: f32 = 0.0;
pub const MAX_WEIGHT_KG: f32 = 1000.0;

#[derive(Debug, Clone, Copy)]
pub struct Reading {
    pub timestamp: DateTime<Local>,
    pub weight: f32,
}

#[derive(Serialize)]
struct Payload<'a> {
    weight: Box<RawValue>,
    #[serde(rename = "deviceId", skip_serializing_if = "Option::is_none")]
    device_id: Option<&'a str>,
}

impl Reading {
    pub fn new(weight: f32) -> Reading {
        Reading {
            timestamp: Local::now(),
            weight,
        }
    }

    pub fn in_expected_range(&self) -> bool {
        (MIN_WEIGHT_KG..=MAX_WEIGHT_KG).contains(&self.weight)
    }

    /// JSON body of the report. The weight always carries two fractional digits.
    pub fn payload(&self, device_id: Option<&str>) -> Result<String, anyhow::Error> {
        ensure!(
            self.weight.is_finite(),
            "Weight {} cannot be encoded as JSON",
            self.weight
        );

        // Ties round away from zero: 0.125 kg is sent as 0.13.
        let rounded = (f64::from(self.weight) * 100.0).round() / 100.0;
        let weight = RawValue::from_string(format!("{rounded:.2}"))
            .context("Failed to encode weight")?;
        serde_json::to_string(&Payload { weight, device_id }).context("Failed to encode payload")
    }
}

impl std::fmt::Display for Reading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2} kg at {}", self.weight, self.timestamp.to_rfc3339())
    }
}
