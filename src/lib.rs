pub mod db;
pub mod error;
pub mod models;
pub mod settings;
pub mod store;
mod utils;

#[cfg(test)]
mod test_support;

use std::{path::Path, sync::Arc};

use anyhow::Context;

pub use db::Database;
pub use error::{MirrorError, StorageError, StorageWarning};
pub use models::MeasurementDocument;
pub use settings::{SettingsStore, StoreSettings};
pub use store::{MeasurementStore, MutationOutcome, SavePolicy};
pub use utils::logging::init_logging;

/// Opens the store rooted at `app_data_dir`: settings from `settings.json`
/// (with environment overrides), the SQLite file and, when enabled, the
/// filesystem mirror. Must be called inside a tokio runtime.
pub fn open_store(app_data_dir: &Path) -> anyhow::Result<MeasurementStore<Database>> {
    std::fs::create_dir_all(app_data_dir).with_context(|| {
        format!(
            "Failed to create app data directory {}",
            app_data_dir.display()
        )
    })?;

    let settings_store = SettingsStore::new(app_data_dir.join("settings.json"))?;
    let settings = settings_store.settings().with_env_overrides();

    let database = Database::new(app_data_dir.join(&settings.database_file))?;
    let mirror = settings
        .mirror_base(app_data_dir)
        .map(store::FileMirror::new);

    log::info!(
        "Opened measurement store at {} (debounce {} ms, mirror {})",
        database.path().display(),
        settings.debounce_ms,
        mirror
            .as_ref()
            .map_or_else(|| "off".to_string(), |m| m.root().display().to_string())
    );

    Ok(MeasurementStore::new(
        Arc::new(database),
        mirror,
        settings.quiet_period(),
    ))
}
