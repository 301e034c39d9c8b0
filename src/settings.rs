use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::RwLock,
    time::Duration,
};

use crate::store::debounce::DEFAULT_QUIET_PERIOD;

const DEBOUNCE_ENV: &str = "ACUFIELD_DEBOUNCE_MS";
const MIRROR_DIR_ENV: &str = "ACUFIELD_MIRROR_DIR";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Quiet period before a debounced save fires.
    pub debounce_ms: u64,
    /// Mirror the catalog into `<base>/Formatos`. On by default on Android only.
    pub mirror_enabled: bool,
    /// Base directory for the mirror; the app data directory when unset.
    pub mirror_dir: Option<PathBuf>,
    pub database_file: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_QUIET_PERIOD.as_millis() as u64,
            mirror_enabled: cfg!(target_os = "android"),
            mirror_dir: None,
            database_file: "acufield.sqlite3".into(),
        }
    }
}

impl StoreSettings {
    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Mirror base directory, if mirroring is on.
    pub fn mirror_base(&self, app_data_dir: &Path) -> Option<PathBuf> {
        self.mirror_enabled.then(|| {
            self.mirror_dir
                .clone()
                .unwrap_or_else(|| app_data_dir.to_path_buf())
        })
    }

    /// Applies `ACUFIELD_DEBOUNCE_MS` and `ACUFIELD_MIRROR_DIR` on top of the
    /// stored values.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(ms) = std::env::var(DEBOUNCE_ENV)
            .ok()
            .and_then(|value| value.trim().parse::<u64>().ok())
        {
            self.debounce_ms = ms;
        }
        if let Some(dir) = std::env::var_os(MIRROR_DIR_ENV).filter(|dir| !dir.is_empty()) {
            self.mirror_enabled = true;
            self.mirror_dir = Some(PathBuf::from(dir));
        }
        self
    }
}

/// Settings persisted as JSON next to the database.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<StoreSettings>,
}

impl SettingsStore {
    /// Loads settings from `path`; a missing or unreadable file yields defaults.
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log::warn!(
                    "Ignoring malformed settings file {}: {err}",
                    path.display()
                );
                StoreSettings::default()
            })
        } else {
            StoreSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn settings(&self) -> StoreSettings {
        match self.data.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn update(&self, settings: StoreSettings) -> Result<()> {
        let mut guard = match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        self.persist(&settings)?;
        *guard = settings;
        Ok(())
    }

    fn persist(&self, data: &StoreSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
