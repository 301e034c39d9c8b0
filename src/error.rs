use std::path::PathBuf;

use thiserror::Error;

use crate::store::backend::StorageKey;

/// Failures that abort a store operation and reach the caller.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to read {key} from storage: {source}")]
    Read {
        key: StorageKey,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to write {key} to storage: {source}")]
    Write {
        key: StorageKey,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to serialize {what}: {source}")]
    Serialize {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("there is no document to save")]
    NoDocument,
}

impl StorageError {
    /// Message shown in the store's `error` field.
    pub fn user_message(&self) -> String {
        match self {
            StorageError::Read { .. } => "Saved data could not be read.".to_string(),
            StorageError::Write { .. } | StorageError::Serialize { .. } => {
                "Changes could not be saved on this device.".to_string()
            }
            StorageError::NoDocument => "There is no open form to save.".to_string(),
        }
    }
}

/// Recoverable problems reported alongside a successful operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageWarning {
    /// Stored text for `key` could not be parsed and was treated as empty.
    CorruptEntry { key: StorageKey, detail: String },
}

/// Secondary file mirror failures. Logged, never surfaced.
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("failed to create mirror directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write mirror file {path}: {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to remove mirror file {path}: {source}")]
    RemoveFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("document id {id:?} cannot be used as a mirror file name")]
    UnsafeDocumentId { id: String },
    #[error("failed to serialize mirror entry: {0}")]
    Serialize(#[from] serde_json::Error),
}
