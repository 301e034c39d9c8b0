use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::{MeasurementResult, Photo};

/// A weather leaf as the user entered it: already numeric, or raw text that
/// may use a locale decimal comma.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Reading {
    Number(f64),
    Text(String),
}

impl<'de> Deserialize<'de> for Reading {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Text(String),
        }

        // Exports write unreadable readings as null; read those back as blank.
        Ok(match Option::<Raw>::deserialize(deserializer)? {
            Some(Raw::Number(value)) => Reading::Number(value),
            Some(Raw::Text(text)) => Reading::Text(text),
            None => Reading::default(),
        })
    }
}

impl Default for Reading {
    fn default() -> Self {
        Reading::Text(String::new())
    }
}

impl Reading {
    /// Numeric value of the reading, accepting `"12,5"` and `"1.234,5"`.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Reading::Number(value) => Some(*value).filter(|v| v.is_finite()),
            Reading::Text(raw) => parse_locale_number(raw),
        }
    }
}

fn parse_locale_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let normalized = if trimmed.contains(',') {
        // "1.234,5": dots group thousands, the comma is the decimal mark
        trimmed.replace('.', "").replace(',', ".")
    } else {
        trimmed.to_string()
    };

    normalized
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkOrder {
    pub number: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GeneralInfo {
    pub company: String,
    pub supervisor: String,
    pub technician: String,
    pub work_order: WorkOrder,
    pub site_address: String,
    pub municipality: String,
    pub measurement_date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
}

/// Planar coordinates as produced by the projection module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanarCoordinates {
    pub east: f64,
    pub north: f64,
    #[serde(default)]
    pub zone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementPoint {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planar: Option<PlanarCoordinates>,
}

impl MeasurementPoint {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description: String::new(),
            location: None,
            planar: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WeatherConditions {
    pub temperature: Reading,
    pub humidity: Reading,
    pub pressure: Reading,
    pub wind_speed: Reading,
    pub wind_direction: Reading,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TechnicalInfo {
    pub sound_meters: Vec<String>,
    pub calibrators: Vec<String>,
    pub weather_stations: Vec<String>,
    pub standard: String,
    pub notes: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Inspection {
    pub checklist: BTreeMap<String, bool>,
    pub observations: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QualitativeData {
    pub area_description: String,
    pub noise_sources: String,
    pub observations: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalEvent {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub impact: String,
}

/// One measurement session's complete record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementDocument {
    pub id: String,
    #[serde(default)]
    pub general_info: GeneralInfo,
    #[serde(default)]
    pub measurement_points: Vec<MeasurementPoint>,
    #[serde(default)]
    pub weather_conditions: WeatherConditions,
    #[serde(default)]
    pub technical_info: TechnicalInfo,
    #[serde(default)]
    pub inspection: Inspection,
    #[serde(default)]
    pub measurement_results: Vec<MeasurementResult>,
    #[serde(default)]
    pub qualitative_data: QualitativeData,
    #[serde(default)]
    pub external_events: Vec<ExternalEvent>,
    #[serde(default)]
    pub photos: Vec<Photo>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MeasurementDocument {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            general_info: GeneralInfo::default(),
            measurement_points: Vec::new(),
            weather_conditions: WeatherConditions::default(),
            technical_info: TechnicalInfo::default(),
            inspection: Inspection::default(),
            measurement_results: Vec::new(),
            qualitative_data: QualitativeData::default(),
            external_events: Vec::new(),
            photos: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// True while none of the identifying general fields have been filled in.
    /// Screens use this to gate navigation; the store never enforces it.
    pub fn is_incomplete(&self) -> bool {
        let info = &self.general_info;
        info.company.trim().is_empty()
            && info.supervisor.trim().is_empty()
            && info.work_order.number.trim().is_empty()
    }

    pub fn point(&self, point_id: &str) -> Option<&MeasurementPoint> {
        self.measurement_points.iter().find(|p| p.id == point_id)
    }
}

/// Replaces the entry with the same id, or appends it.
pub fn upsert_by_id(catalog: &mut Vec<MeasurementDocument>, document: MeasurementDocument) {
    match catalog.iter_mut().find(|existing| existing.id == document.id) {
        Some(slot) => *slot = document,
        None => catalog.push(document),
    }
}

/// Collapses duplicate ids, keeping the last occurrence in its first position.
pub fn dedupe_catalog(documents: Vec<MeasurementDocument>) -> Vec<MeasurementDocument> {
    let mut catalog = Vec::with_capacity(documents.len());
    for document in documents {
        upsert_by_id(&mut catalog, document);
    }
    catalog
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locale_readings_parse_as_numbers() {
        assert_eq!(Reading::Text("12,5".into()).as_number(), Some(12.5));
        assert_eq!(Reading::Text(" 1.013,25 ".into()).as_number(), Some(1013.25));
        assert_eq!(Reading::Text("21.4".into()).as_number(), Some(21.4));
        assert_eq!(Reading::Number(3.0).as_number(), Some(3.0));
        assert_eq!(Reading::Text("".into()).as_number(), None);
        assert_eq!(Reading::Text("calm".into()).as_number(), None);
    }

    #[test]
    fn incomplete_until_any_identifying_field_is_set() {
        let mut doc = MeasurementDocument::new(Utc::now());
        assert!(doc.is_incomplete());

        doc.general_info.supervisor = "   ".into();
        assert!(doc.is_incomplete());

        doc.general_info.work_order.number = "OT-17".into();
        assert!(!doc.is_incomplete());
    }

    #[test]
    fn upsert_replaces_matching_id() {
        let now = Utc::now();
        let first = MeasurementDocument::new(now);
        let mut edited = first.clone();
        edited.general_info.company = "Acme".into();
        let other = MeasurementDocument::new(now);

        let mut catalog = vec![first, other.clone()];
        upsert_by_id(&mut catalog, edited.clone());
        assert_eq!(catalog, vec![edited, other]);
    }

    #[test]
    fn dedupe_keeps_latest_copy() {
        let now = Utc::now();
        let doc = MeasurementDocument::new(now);
        let mut newer = doc.clone();
        newer.general_info.company = "Newer".into();

        let catalog = dedupe_catalog(vec![doc, newer.clone()]);
        assert_eq!(catalog, vec![newer]);
    }

    #[test]
    fn missing_groups_deserialize_to_defaults() {
        let raw = r#"{
            "id": "doc-1",
            "createdAt": "2024-03-01T10:00:00Z",
            "updatedAt": "2024-03-01T10:00:00Z"
        }"#;
        let doc: MeasurementDocument = serde_json::from_str(raw).unwrap();
        assert_eq!(doc.id, "doc-1");
        assert!(doc.measurement_points.is_empty());
        assert_eq!(doc.weather_conditions, WeatherConditions::default());
    }

    #[test]
    fn null_reading_reads_back_blank() {
        let weather: WeatherConditions =
            serde_json::from_str(r#"{"temperature": null, "humidity": 58, "pressure": "1012"}"#)
                .unwrap();
        assert_eq!(weather.temperature, Reading::default());
        assert_eq!(weather.humidity, Reading::Number(58.0));
        assert_eq!(weather.pressure, Reading::Text("1012".into()));
    }
}
