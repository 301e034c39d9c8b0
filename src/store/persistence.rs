use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::{
    error::{StorageError, StorageWarning},
    models::{dedupe_catalog, upsert_by_id, MeasurementDocument},
};

use super::{
    backend::{KvBackend, StorageKey},
    change::has_changed,
    migrate::{migrate, migrate_document},
    mirror::FileMirror,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

/// Outcome of a successful save.
#[derive(Debug, Clone)]
pub struct SaveReport {
    /// The document as persisted, with `updated_at` stamped if it changed.
    pub document: MeasurementDocument,
    pub warnings: Vec<StorageWarning>,
}

/// Catalog as read from the primary backend, already migrated.
#[derive(Debug, Clone, Default)]
pub struct CatalogRead {
    pub documents: Vec<MeasurementDocument>,
    /// Migrations rewrote at least one stored document.
    pub migrated: bool,
    pub warnings: Vec<StorageWarning>,
    /// Entries that do not decode as a document. They are written back
    /// untouched with the rest of the catalog.
    pub unreadable: Vec<Value>,
}

/// Writes documents to the primary backend and the optional file mirror, and
/// owns the snapshot of the last document it persisted.
pub struct PersistenceWriter<B> {
    backend: Arc<B>,
    mirror: Option<FileMirror>,
    baseline: Mutex<Option<MeasurementDocument>>,
}

impl<B: KvBackend> PersistenceWriter<B> {
    pub fn new(backend: Arc<B>, mirror: Option<FileMirror>) -> Self {
        Self {
            backend,
            mirror,
            baseline: Mutex::new(None),
        }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub async fn baseline(&self) -> Option<MeasurementDocument> {
        self.baseline.lock().await.clone()
    }

    pub async fn reset_baseline(&self, document: Option<MeasurementDocument>) {
        *self.baseline.lock().await = document;
    }

    async fn read_raw(&self, key: StorageKey) -> Result<Option<String>, StorageError> {
        self.backend
            .read(key)
            .await
            .map_err(|source| StorageError::Read { key, source })
    }

    async fn write_json<T: Serialize + ?Sized>(
        &self,
        key: StorageKey,
        value: &T,
    ) -> Result<(), StorageError> {
        let serialized = serde_json::to_string(value).map_err(|source| StorageError::Serialize {
            what: key.as_str(),
            source,
        })?;
        self.backend
            .write(key, serialized)
            .await
            .map_err(|source| StorageError::Write { key, source })
    }

    /// Reads and migrates the catalog. Unparseable text yields an empty
    /// catalog plus a warning; an entry that fails to decode is set aside in
    /// `unreadable` with its own warning. Only backend failures are errors.
    pub async fn read_catalog(&self) -> Result<CatalogRead, StorageError> {
        let Some(text) = self.read_raw(StorageKey::Catalog).await? else {
            return Ok(CatalogRead::default());
        };

        let raw: Value = match serde_json::from_str(&text) {
            Ok(raw) => raw,
            Err(err) => return Ok(corrupt_catalog(err.to_string())),
        };

        let (migrated_raw, migrated) = migrate(raw);
        let Value::Array(entries) = migrated_raw else {
            return Ok(corrupt_catalog("catalog is not a JSON array".to_string()));
        };

        let mut read = CatalogRead {
            migrated,
            ..CatalogRead::default()
        };
        let mut documents = Vec::with_capacity(entries.len());
        for (index, entry) in entries.into_iter().enumerate() {
            match MeasurementDocument::deserialize(&entry) {
                Ok(document) => documents.push(document),
                Err(err) => {
                    let id = entry
                        .get("id")
                        .and_then(Value::as_str)
                        .unwrap_or("<no id>")
                        .to_string();
                    log_warn!("catalog entry {index} ({id}) is unreadable, keeping it as stored: {err}");
                    read.warnings.push(StorageWarning::CorruptEntry {
                        key: StorageKey::Catalog,
                        detail: format!("entry {index} ({id}): {err}"),
                    });
                    read.unreadable.push(entry);
                }
            }
        }
        read.documents = dedupe_catalog(documents);
        Ok(read)
    }

    /// Writes `documents` followed by the `unreadable` entries they were read
    /// with.
    pub async fn write_catalog(
        &self,
        documents: &[MeasurementDocument],
        unreadable: &[Value],
    ) -> Result<(), StorageError> {
        if unreadable.is_empty() {
            return self.write_json(StorageKey::Catalog, documents).await;
        }

        let mut entries = Vec::with_capacity(documents.len() + unreadable.len());
        for document in documents {
            entries.push(serde_json::to_value(document).map_err(|source| {
                StorageError::Serialize {
                    what: "catalog entry",
                    source,
                }
            })?);
        }
        entries.extend(unreadable.iter().cloned());
        self.write_json(StorageKey::Catalog, &entries).await
    }

    /// Reads and migrates the document held in the `CURRENT` slot.
    pub async fn read_current(
        &self,
    ) -> Result<(Option<MeasurementDocument>, Vec<StorageWarning>), StorageError> {
        let Some(text) = self.read_raw(StorageKey::Current).await? else {
            return Ok((None, Vec::new()));
        };

        let parsed = serde_json::from_str::<Value>(&text).and_then(|mut raw| {
            migrate_document(&mut raw);
            serde_json::from_value::<MeasurementDocument>(raw)
        });
        match parsed {
            Ok(document) => Ok((Some(document), Vec::new())),
            Err(err) => {
                log_warn!("current document slot is unreadable, ignoring it: {err}");
                Ok((
                    None,
                    vec![StorageWarning::CorruptEntry {
                        key: StorageKey::Current,
                        detail: err.to_string(),
                    }],
                ))
            }
        }
    }

    pub async fn remove_current(&self) -> Result<(), StorageError> {
        self.backend
            .remove(StorageKey::Current)
            .await
            .map_err(|source| StorageError::Write {
                key: StorageKey::Current,
                source,
            })
    }

    /// Persists `document` into the catalog and the `CURRENT` slot, then makes
    /// it the new baseline.
    pub async fn save(&self, document: MeasurementDocument) -> Result<SaveReport, StorageError> {
        let CatalogRead {
            documents: mut catalog,
            warnings,
            unreadable,
            ..
        } = self.read_catalog().await?;

        let mut document = document;
        {
            let baseline = self.baseline.lock().await;
            if has_changed(&document, baseline.as_ref()) {
                document.updated_at = Utc::now();
            }
        }

        upsert_by_id(&mut catalog, document.clone());
        self.write_catalog(&catalog, &unreadable).await?;
        self.write_json(StorageKey::Current, &document).await?;

        self.mirror_catalog(catalog).await;

        *self.baseline.lock().await = Some(document.clone());
        log_debug!("saved document {} at {}", document.id, document.updated_at);

        Ok(SaveReport { document, warnings })
    }

    /// Removes `document_id` from the stored catalog. Returns the remaining
    /// documents.
    pub async fn delete(&self, document_id: &str) -> Result<CatalogRead, StorageError> {
        let mut read = self.read_catalog().await?;
        read.documents.retain(|doc| doc.id != document_id);
        self.write_catalog(&read.documents, &read.unreadable).await?;

        if let Some(mirror) = self.mirror.clone() {
            let id = document_id.to_string();
            let remaining = read.documents.clone();
            let outcome =
                tokio::task::spawn_blocking(move || mirror.remove_document(&id, &remaining)).await;
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(err)) => log_warn!("mirror cleanup for {document_id} failed: {err}"),
                Err(err) => log_warn!("mirror cleanup task for {document_id} panicked: {err}"),
            }
        }

        Ok(read)
    }

    async fn mirror_catalog(&self, catalog: Vec<MeasurementDocument>) {
        let Some(mirror) = self.mirror.clone() else {
            return;
        };

        match tokio::task::spawn_blocking(move || mirror.write_catalog(&catalog)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => log_warn!("catalog mirror write failed: {err}"),
            Err(err) => log_warn!("catalog mirror task failed: {err}"),
        }
    }
}

fn corrupt_catalog(detail: String) -> CatalogRead {
    log_warn!("stored catalog is unreadable, treating it as empty: {detail}");
    CatalogRead {
        documents: Vec::new(),
        migrated: false,
        warnings: vec![StorageWarning::CorruptEntry {
            key: StorageKey::Catalog,
            detail,
        }],
        unreadable: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone};
    use serde_json::json;

    use crate::test_support::MemoryBackend;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 10, 7, 30, 0).unwrap()
    }

    fn writer(backend: &Arc<MemoryBackend>) -> PersistenceWriter<MemoryBackend> {
        PersistenceWriter::new(backend.clone(), None)
    }

    #[tokio::test]
    async fn save_writes_catalog_current_and_baseline() {
        let backend = Arc::new(MemoryBackend::default());
        let writer = writer(&backend);
        let doc = MeasurementDocument::new(t0());

        let report = writer.save(doc.clone()).await.unwrap();
        assert!(report.warnings.is_empty());
        // No baseline yet, so the first save is a change.
        assert!(report.document.updated_at > t0());

        let catalog: Vec<MeasurementDocument> =
            serde_json::from_str(&backend.get(StorageKey::Catalog).unwrap()).unwrap();
        assert_eq!(catalog, vec![report.document.clone()]);

        let current: MeasurementDocument =
            serde_json::from_str(&backend.get(StorageKey::Current).unwrap()).unwrap();
        assert_eq!(current, report.document);
        assert_eq!(writer.baseline().await, Some(report.document));
    }

    #[tokio::test]
    async fn unchanged_save_keeps_timestamp() {
        let backend = Arc::new(MemoryBackend::default());
        let writer = writer(&backend);
        let doc = MeasurementDocument::new(t0());
        writer.reset_baseline(Some(doc.clone())).await;

        let report = writer.save(doc.clone()).await.unwrap();
        assert_eq!(report.document.updated_at, t0());
    }

    #[tokio::test]
    async fn corrupt_catalog_is_replaced_with_warning() {
        let backend = Arc::new(MemoryBackend::default());
        backend.set(StorageKey::Catalog, "{not json");
        let writer = writer(&backend);

        let report = writer.save(MeasurementDocument::new(t0())).await.unwrap();
        assert!(matches!(
            report.warnings.as_slice(),
            [StorageWarning::CorruptEntry {
                key: StorageKey::Catalog,
                ..
            }]
        ));
        let catalog: Vec<MeasurementDocument> =
            serde_json::from_str(&backend.get(StorageKey::Catalog).unwrap()).unwrap();
        assert_eq!(catalog.len(), 1);
    }

    #[tokio::test]
    async fn failed_write_keeps_previous_baseline() {
        let backend = Arc::new(MemoryBackend::default());
        let writer = writer(&backend);
        let doc = MeasurementDocument::new(t0());
        writer.reset_baseline(Some(doc.clone())).await;

        backend.fail_next_writes(1);
        let mut edited = doc.clone();
        edited.general_info.company = "Acme".into();
        let err = writer.save(edited).await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::Write {
                key: StorageKey::Catalog,
                ..
            }
        ));
        assert_eq!(writer.baseline().await, Some(doc));
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_saves_last_completed_wins() {
        let backend = Arc::new(MemoryBackend::default());
        backend.slow_writes_containing("slow-co", std::time::Duration::from_millis(500));
        let writer = writer(&backend);

        let doc = MeasurementDocument::new(t0());
        let mut slow = doc.clone();
        slow.general_info.company = "slow-co".into();
        let mut fast = doc.clone();
        fast.general_info.company = "fast-co".into();

        let (first, second) = tokio::join!(writer.save(slow), writer.save(fast));
        first.unwrap();
        second.unwrap();

        // The slow save started first but finished last.
        let current: MeasurementDocument =
            serde_json::from_str(&backend.get(StorageKey::Current).unwrap()).unwrap();
        assert_eq!(current.general_info.company, "slow-co");
        assert_eq!(
            writer.baseline().await.map(|b| b.general_info.company),
            Some("slow-co".to_string())
        );
    }

    #[tokio::test]
    async fn unreadable_entry_does_not_cost_the_rest_of_the_catalog() {
        let backend = Arc::new(MemoryBackend::default());
        let good = MeasurementDocument::new(t0());
        let broken = json!({
            "id": "broken",
            "createdAt": "2024-01-10T07:30:00Z",
            "updatedAt": "2024-01-10T07:30:00Z",
            "measurementPoints": [{ "name": "no id here" }]
        });
        backend.set(
            StorageKey::Catalog,
            &json!([serde_json::to_value(&good).unwrap(), broken.clone()]).to_string(),
        );
        let writer = writer(&backend);

        let read = writer.read_catalog().await.unwrap();
        assert_eq!(read.documents, vec![good.clone()]);
        assert_eq!(read.unreadable, vec![broken.clone()]);
        assert!(matches!(
            read.warnings.as_slice(),
            [StorageWarning::CorruptEntry {
                key: StorageKey::Catalog,
                ..
            }]
        ));

        let report = writer.save(MeasurementDocument::new(t0())).await.unwrap();
        assert_eq!(report.warnings.len(), 1);

        let stored: Vec<Value> =
            serde_json::from_str(&backend.get(StorageKey::Catalog).unwrap()).unwrap();
        assert_eq!(stored.len(), 3);
        assert!(stored.iter().any(|entry| entry["id"] == json!(good.id)));
        assert!(stored.contains(&broken));
    }

    #[tokio::test]
    async fn read_catalog_migrates_legacy_entries() {
        let backend = Arc::new(MemoryBackend::default());
        backend.set(
            StorageKey::Catalog,
            &json!([{
                "id": "old",
                "createdAt": "2023-06-01T10:00:00Z",
                "updatedAt": "2023-06-01T10:00:00Z",
                "technicalInfo": { "soundMeter": { "selected": "SLM-9" } }
            }])
            .to_string(),
        );

        let read = writer(&backend).read_catalog().await.unwrap();
        assert!(read.migrated);
        assert_eq!(read.documents[0].technical_info.sound_meters, vec!["SLM-9"]);
    }

    #[tokio::test]
    async fn mirror_receives_saved_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(MemoryBackend::default());
        let mirror = FileMirror::new(dir.path());
        let writer = PersistenceWriter::new(backend.clone(), Some(mirror.clone()));

        let report = writer.save(MeasurementDocument::new(t0())).await.unwrap();
        assert!(mirror.document_path(&report.document.id).unwrap().exists());
        assert!(mirror.aggregate_path().exists());

        writer.delete(&report.document.id).await.unwrap();
        assert!(!mirror.document_path(&report.document.id).unwrap().exists());
    }

    #[tokio::test]
    async fn mirror_failure_does_not_fail_save() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocked");
        std::fs::write(&blocker, "x").unwrap();

        let backend = Arc::new(MemoryBackend::default());
        let writer = PersistenceWriter::new(backend.clone(), Some(FileMirror::new(&blocker)));
        assert!(writer.save(MeasurementDocument::new(t0())).await.is_ok());
    }
}
