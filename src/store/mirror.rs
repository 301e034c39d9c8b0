use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{error::MirrorError, models::MeasurementDocument};

const MIRROR_DIR: &str = "Formatos";
const AGGREGATE_FILE: &str = "formatos.json";

/// Best-effort copy of the catalog as plain files, one per document plus an
/// aggregate. The primary backend stays authoritative.
#[derive(Debug, Clone)]
pub struct FileMirror {
    root: PathBuf,
}

impl FileMirror {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: base_dir.into().join(MIRROR_DIR),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File for `document_id` inside the mirror root. Ids that could name a
    /// path outside it are rejected.
    pub fn document_path(&self, document_id: &str) -> Result<PathBuf, MirrorError> {
        let unsafe_id = document_id.is_empty()
            || document_id == "."
            || document_id == ".."
            || document_id.contains(['/', '\\', '\0']);
        if unsafe_id {
            return Err(MirrorError::UnsafeDocumentId {
                id: document_id.to_string(),
            });
        }
        Ok(self.root.join(format!("{document_id}.json")))
    }

    pub fn aggregate_path(&self) -> PathBuf {
        self.root.join(AGGREGATE_FILE)
    }

    fn ensure_root(&self) -> Result<(), MirrorError> {
        fs::create_dir_all(&self.root).map_err(|source| MirrorError::CreateDir {
            path: self.root.clone(),
            source,
        })
    }

    fn write_file(path: PathBuf, contents: String) -> Result<(), MirrorError> {
        fs::write(&path, contents).map_err(|source| MirrorError::WriteFile { path, source })
    }

    pub fn write_catalog(&self, catalog: &[MeasurementDocument]) -> Result<(), MirrorError> {
        self.ensure_root()?;

        for document in catalog {
            // The aggregate below still carries a document that gets no file.
            let path = match self.document_path(&document.id) {
                Ok(path) => path,
                Err(err) => {
                    log::warn!("skipping mirror file: {err}");
                    continue;
                }
            };
            let serialized = serde_json::to_string_pretty(document)?;
            Self::write_file(path, serialized)?;
        }

        let aggregate = serde_json::to_string_pretty(catalog)?;
        Self::write_file(self.aggregate_path(), aggregate)
    }

    /// Drops the per-document file and rewrites the aggregate.
    pub fn remove_document(
        &self,
        document_id: &str,
        remaining: &[MeasurementDocument],
    ) -> Result<(), MirrorError> {
        // Unsafe ids never got a file of their own.
        if let Ok(path) = self.document_path(document_id) {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => return Err(MirrorError::RemoveFile { path, source }),
            }
        }

        self.ensure_root()?;
        let aggregate = serde_json::to_string_pretty(remaining)?;
        Self::write_file(self.aggregate_path(), aggregate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn writes_one_file_per_document_plus_aggregate() {
        let dir = tempfile::tempdir().unwrap();
        let mirror = FileMirror::new(dir.path().join("external"));

        let first = MeasurementDocument::new(Utc::now());
        let second = MeasurementDocument::new(Utc::now());
        mirror.write_catalog(&[first.clone(), second.clone()]).unwrap();

        let stored: MeasurementDocument =
            serde_json::from_str(&fs::read_to_string(mirror.document_path(&first.id).unwrap()).unwrap())
                .unwrap();
        assert_eq!(stored, first);
        assert!(mirror.document_path(&second.id).unwrap().exists());

        let aggregate: Vec<MeasurementDocument> =
            serde_json::from_str(&fs::read_to_string(mirror.aggregate_path()).unwrap()).unwrap();
        assert_eq!(aggregate, vec![first.clone(), second.clone()]);

        mirror.remove_document(&first.id, &[second.clone()]).unwrap();
        assert!(!mirror.document_path(&first.id).unwrap().exists());
        let aggregate: Vec<MeasurementDocument> =
            serde_json::from_str(&fs::read_to_string(mirror.aggregate_path()).unwrap()).unwrap();
        assert_eq!(aggregate, vec![second]);
    }

    #[test]
    fn ids_with_path_components_stay_inside_root() {
        let dir = tempfile::tempdir().unwrap();
        let mirror = FileMirror::new(dir.path().join("external"));

        for id in ["../escape", "a/b", "..", "", "c\\d"] {
            assert!(matches!(
                mirror.document_path(id),
                Err(MirrorError::UnsafeDocumentId { .. })
            ));
        }

        let mut hostile = MeasurementDocument::new(Utc::now());
        hostile.id = "../escape".into();
        let normal = MeasurementDocument::new(Utc::now());
        mirror
            .write_catalog(&[hostile.clone(), normal.clone()])
            .unwrap();

        assert!(!dir.path().join("external").join("escape.json").exists());
        assert!(mirror.document_path(&normal.id).unwrap().exists());
        let aggregate: Vec<MeasurementDocument> =
            serde_json::from_str(&fs::read_to_string(mirror.aggregate_path()).unwrap()).unwrap();
        assert_eq!(aggregate, vec![hostile.clone(), normal]);

        mirror.remove_document(&hostile.id, &[]).unwrap();
        let aggregate: Vec<MeasurementDocument> =
            serde_json::from_str(&fs::read_to_string(mirror.aggregate_path()).unwrap()).unwrap();
        assert!(aggregate.is_empty());
    }

    #[test]
    fn unwritable_base_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, "file").unwrap();

        let mirror = FileMirror::new(&blocker);
        let err = mirror
            .write_catalog(&[MeasurementDocument::new(Utc::now())])
            .unwrap_err();
        assert!(matches!(err, MirrorError::CreateDir { .. }));
    }
}
