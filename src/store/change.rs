//! Dirty checking against the last persisted copy of a document.
//!
//! Documents are compared through their canonical JSON form with the two
//! timestamp fields removed, so a save never counts as a change by itself and
//! a field that is cleared and retyped to the same value is not a change.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::models::{
    GeneralInfo, Inspection, MeasurementDocument, QualitativeData, TechnicalInfo,
    WeatherConditions,
};

const TIMESTAMP_FIELDS: [&str; 2] = ["createdAt", "updatedAt"];

fn canonical(document: &MeasurementDocument) -> Value {
    // Null compares unequal to any real document.
    let mut value = serde_json::to_value(document).unwrap_or(Value::Null);
    if let Value::Object(map) = &mut value {
        for field in TIMESTAMP_FIELDS {
            map.remove(field);
        }
    }
    value
}

/// Whether `candidate` differs in content from `baseline`. No baseline means
/// nothing has been persisted yet, which always counts as a change.
pub fn has_changed(candidate: &MeasurementDocument, baseline: Option<&MeasurementDocument>) -> bool {
    match baseline {
        Some(baseline) => canonical(candidate) != canonical(baseline),
        None => true,
    }
}

/// Field groups to merge into a document. Unset groups are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentPatch {
    pub general_info: Option<GeneralInfo>,
    pub weather_conditions: Option<WeatherConditions>,
    pub technical_info: Option<TechnicalInfo>,
    pub inspection: Option<Inspection>,
    pub qualitative_data: Option<QualitativeData>,
}

impl DocumentPatch {
    pub fn is_empty(&self) -> bool {
        self == &DocumentPatch::default()
    }

    pub fn apply(self, mut document: MeasurementDocument) -> MeasurementDocument {
        if let Some(general_info) = self.general_info {
            document.general_info = general_info;
        }
        if let Some(weather) = self.weather_conditions {
            document.weather_conditions = weather;
        }
        if let Some(technical) = self.technical_info {
            document.technical_info = technical;
        }
        if let Some(inspection) = self.inspection {
            document.inspection = inspection;
        }
        if let Some(qualitative) = self.qualitative_data {
            document.qualitative_data = qualitative;
        }
        document
    }
}

/// Merges `patch` into `document`, advancing `updated_at` to `now` only when
/// the merge altered the document and the result differs from `baseline`.
pub fn touch(
    document: &MeasurementDocument,
    patch: DocumentPatch,
    baseline: Option<&MeasurementDocument>,
    now: DateTime<Utc>,
) -> MeasurementDocument {
    let merged = patch.apply(document.clone());
    stamp_if_changed(document, merged, baseline, now)
}

/// Stamps `after` with `now` when it differs from both `before` and the
/// baseline; otherwise `after` keeps the timestamp it already carries.
pub fn stamp_if_changed(
    before: &MeasurementDocument,
    mut after: MeasurementDocument,
    baseline: Option<&MeasurementDocument>,
    now: DateTime<Utc>,
) -> MeasurementDocument {
    let edited = canonical(&after) != canonical(before);
    if edited && has_changed(&after, baseline) {
        after.updated_at = now;
    }
    after
}
