use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{GeoLocation, Schedule};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PhotoKind {
    Source,
    Receiver,
    Equipment,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Photo {
    pub id: String,
    /// Supplied by the capture module; empty once the file is known to be gone.
    pub uri: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoLocation>,
    pub point_id: String,
    pub schedule: Schedule,
    pub kind: PhotoKind,
    #[serde(default, skip_serializing_if = "is_false")]
    pub reference_lost: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}
