use std::fmt;
use std::future::Future;

use anyhow::Result;

/// The two logical slots of the primary backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
    /// Array of every saved document.
    Catalog,
    /// The document that is currently open, kept apart from the catalog.
    Current,
}

impl StorageKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKey::Catalog => "acufield.catalog",
            StorageKey::Current => "acufield.current",
        }
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Primary key-value storage. Values are UTF-8 JSON text.
pub trait KvBackend: Send + Sync + 'static {
    fn read(&self, key: StorageKey) -> impl Future<Output = Result<Option<String>>> + Send;

    fn write(&self, key: StorageKey, value: String) -> impl Future<Output = Result<()>> + Send;

    fn remove(&self, key: StorageKey) -> impl Future<Output = Result<()>> + Send;
}
