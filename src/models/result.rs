use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Schedule {
    Day,
    Night,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResultType {
    Emission,
    Ambient,
    Immission,
    Sonometry,
}

impl ResultType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultType::Emission => "emission",
            ResultType::Ambient => "ambient",
            ResultType::Immission => "immission",
            ResultType::Sonometry => "sonometry",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmissionData {
    pub laeq_source: Option<f64>,
    pub laeq_residual: Option<f64>,
    pub duration_minutes: Option<u32>,
    pub source_description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AmbientData {
    pub laeq: Option<f64>,
    pub l10: Option<f64>,
    pub l90: Option<f64>,
    pub duration_minutes: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImmissionData {
    pub laeq_total: Option<f64>,
    pub laeq_residual: Option<f64>,
    pub tonal_correction: Option<f64>,
    pub impulsive_correction: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SonometryData {
    pub readings: Vec<f64>,
    pub interval_seconds: Option<u32>,
}

/// Exactly one payload per result; the variant doubles as the result type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ResultPayload {
    Emission(EmissionData),
    Ambient(AmbientData),
    Immission(ImmissionData),
    Sonometry(SonometryData),
}

impl ResultPayload {
    pub fn result_type(&self) -> ResultType {
        match self {
            ResultPayload::Emission(_) => ResultType::Emission,
            ResultPayload::Ambient(_) => ResultType::Ambient,
            ResultPayload::Immission(_) => ResultType::Immission,
            ResultPayload::Sonometry(_) => ResultType::Sonometry,
        }
    }
}

/// Identity of a result within a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultKey {
    pub point_id: String,
    pub schedule: Schedule,
    pub result_type: ResultType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementResult {
    pub point_id: String,
    pub schedule: Schedule,
    pub payload: ResultPayload,
}

impl MeasurementResult {
    pub fn key(&self) -> ResultKey {
        ResultKey {
            point_id: self.point_id.clone(),
            schedule: self.schedule,
            result_type: self.payload.result_type(),
        }
    }

    pub fn matches(&self, key: &ResultKey) -> bool {
        self.point_id == key.point_id
            && self.schedule == key.schedule
            && self.payload.result_type() == key.result_type
    }
}
