use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    error::StorageError,
    models::{
        ExternalEvent, GeneralInfo, Inspection, MeasurementDocument, MeasurementPoint,
        MeasurementResult, Photo, QualitativeData, TechnicalInfo, WeatherConditions,
    },
};

/// Borrowed view of a document in its stored field order, with numeric
/// weather.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportedDocument<'a> {
    id: &'a str,
    general_info: &'a GeneralInfo,
    measurement_points: &'a [MeasurementPoint],
    weather_conditions: ExportedWeather,
    technical_info: &'a TechnicalInfo,
    inspection: &'a Inspection,
    measurement_results: &'a [MeasurementResult],
    qualitative_data: &'a QualitativeData,
    external_events: &'a [ExternalEvent],
    photos: &'a [Photo],
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportedWeather {
    temperature: Option<f64>,
    humidity: Option<f64>,
    pressure: Option<f64>,
    wind_speed: Option<f64>,
    wind_direction: Option<f64>,
}

impl From<&WeatherConditions> for ExportedWeather {
    fn from(weather: &WeatherConditions) -> Self {
        Self {
            temperature: weather.temperature.as_number(),
            humidity: weather.humidity.as_number(),
            pressure: weather.pressure.as_number(),
            wind_speed: weather.wind_speed.as_number(),
            wind_direction: weather.wind_direction.as_number(),
        }
    }
}

/// Pretty-printed (two-space) JSON of `document` for the export packager.
/// Weather readings are written as numbers; blank or unreadable text becomes
/// `null`. The document itself is not modified.
pub fn export_as_string(document: &MeasurementDocument) -> Result<String, StorageError> {
    let exported = ExportedDocument {
        id: &document.id,
        general_info: &document.general_info,
        measurement_points: &document.measurement_points,
        weather_conditions: ExportedWeather::from(&document.weather_conditions),
        technical_info: &document.technical_info,
        inspection: &document.inspection,
        measurement_results: &document.measurement_results,
        qualitative_data: &document.qualitative_data,
        external_events: &document.external_events,
        photos: &document.photos,
        created_at: document.created_at,
        updated_at: document.updated_at,
    };

    serde_json::to_string_pretty(&exported).map_err(|source| StorageError::Serialize {
        what: "export document",
        source,
    })
}
