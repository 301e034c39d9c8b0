pub mod document;
pub mod photo;
pub mod result;

pub use document::{
    dedupe_catalog, upsert_by_id, ExternalEvent, GeneralInfo, GeoLocation, Inspection,
    MeasurementDocument, MeasurementPoint, PlanarCoordinates, QualitativeData, Reading,
    TechnicalInfo, WeatherConditions, WorkOrder,
};
pub use photo::{Photo, PhotoKind};
pub use result::{
    AmbientData, EmissionData, ImmissionData, MeasurementResult, ResultKey, ResultPayload,
    ResultType, Schedule, SonometryData,
};
