//! Load-time upgrades of persisted documents to the current schema.
//!
//! Every step is keyed on a field that the step itself removes or sets, so
//! running the engine again over its own output is a no-op.

use serde_json::{Map, Value};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::log_info;

/// URI prefixes whose targets do not survive an app restart.
const TRANSIENT_URI_PREFIXES: [&str; 1] = ["blob:"];

/// Path fragments of platform cache directories that are wiped between runs.
const TRANSIENT_CACHE_MARKERS: [&str; 3] = ["/cache/", "/Caches/", "/tmp/"];

/// Legacy `{selected, other}` key and the array key that replaces it.
const EQUIPMENT_CATEGORIES: [(&str, &str); 3] = [
    ("soundMeter", "soundMeters"),
    ("calibrator", "calibrators"),
    ("weatherStation", "weatherStations"),
];

const LEGACY_PAYLOAD_KEYS: [&str; 4] = ["emission", "ambient", "immission", "sonometry"];

/// Migrates a raw catalog (a JSON array of documents). Returns the migrated
/// catalog and whether anything changed. Non-array input is returned as is.
pub fn migrate(mut raw_catalog: Value) -> (Value, bool) {
    let mut changed = false;

    if let Value::Array(documents) = &mut raw_catalog {
        for document in documents.iter_mut() {
            changed |= migrate_document(document);
        }
    }

    (raw_catalog, changed)
}

/// Migrates one raw document in place, returning whether it changed.
pub fn migrate_document(document: &mut Value) -> bool {
    let Some(document) = document.as_object_mut() else {
        return false;
    };

    let id = document
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or("<unknown>")
        .to_string();

    let photos = migrate_photo_references(document);
    let equipment = migrate_equipment(document);
    let results = migrate_result_payloads(document);

    if photos > 0 || equipment || results > 0 {
        log_info!(
            "migrated document {id}: {photos} lost photo reference(s), equipment={equipment}, {results} result(s) reshaped"
        );
        true
    } else {
        false
    }
}

fn is_transient_uri(uri: &str) -> bool {
    let uri = uri.trim();
    if uri.is_empty() {
        return true;
    }
    if TRANSIENT_URI_PREFIXES
        .iter()
        .any(|prefix| uri.starts_with(prefix))
    {
        return true;
    }
    uri.starts_with("file:")
        && TRANSIENT_CACHE_MARKERS
            .iter()
            .any(|marker| uri.contains(marker))
}

fn migrate_photo_references(document: &mut Map<String, Value>) -> usize {
    let Some(Value::Array(photos)) = document.get_mut("photos") else {
        return 0;
    };

    let mut flagged = 0;
    for photo in photos.iter_mut().filter_map(Value::as_object_mut) {
        let already_lost = photo
            .get("referenceLost")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if already_lost {
            continue;
        }

        let uri = photo.get("uri").and_then(Value::as_str).unwrap_or("");
        if is_transient_uri(uri) {
            photo.insert("referenceLost".into(), Value::Bool(true));
            photo.insert("uri".into(), Value::String(String::new()));
            flagged += 1;
        }
    }
    flagged
}

/// Value a legacy `{selected, other}` entry contributes, if any.
fn legacy_equipment_value(legacy: &Value) -> Option<String> {
    let selected = legacy.get("selected").and_then(Value::as_str).unwrap_or("");
    if selected == "other" {
        let other = legacy
            .get("other")
            .and_then(Value::as_str)
            .unwrap_or("")
            .trim();
        (!other.is_empty()).then(|| other.to_string())
    } else if !selected.is_empty() {
        Some(selected.to_string())
    } else {
        None
    }
}

fn migrate_equipment(document: &mut Map<String, Value>) -> bool {
    let Some(Value::Object(technical)) = document.get_mut("technicalInfo") else {
        return false;
    };

    let mut changed = false;
    for (legacy_key, array_key) in EQUIPMENT_CATEGORIES {
        let legacy = technical.remove(legacy_key);

        let entries = technical
            .entry(array_key)
            .or_insert_with(|| {
                changed = true;
                Value::Array(Vec::new())
            });
        if !entries.is_array() {
            // A scalar where the list belongs keeps its value as a single entry.
            let previous = entries.take();
            *entries = match previous {
                Value::String(s) if !s.trim().is_empty() => Value::Array(vec![Value::String(s)]),
                _ => Value::Array(Vec::new()),
            };
            changed = true;
        }

        let Some(legacy) = legacy else {
            continue;
        };
        changed = true;

        if let (Some(value), Value::Array(list)) = (legacy_equipment_value(&legacy), entries) {
            if !list.iter().any(|existing| existing.as_str() == Some(value.as_str())) {
                list.push(Value::String(value));
            }
        }
    }
    changed
}

fn migrate_result_payloads(document: &mut Map<String, Value>) -> usize {
    let Some(Value::Array(results)) = document.get_mut("measurementResults") else {
        return 0;
    };

    let mut reshaped = 0;
    for result in results.iter_mut().filter_map(Value::as_object_mut) {
        if result.contains_key("payload") {
            continue;
        }
        let Some(kind) = result.get("type").and_then(Value::as_str).map(str::to_string) else {
            continue;
        };
        result.remove("type");

        let data = result
            .remove(kind.as_str())
            .filter(Value::is_object)
            .unwrap_or_else(|| Value::Object(Map::new()));
        for key in LEGACY_PAYLOAD_KEYS {
            result.remove(key);
        }

        let mut payload = Map::new();
        payload.insert("type".into(), Value::String(kind));
        payload.insert("data".into(), data);
        result.insert("payload".into(), Value::Object(payload));
        reshaped += 1;
    }
    reshaped
}
