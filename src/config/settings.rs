use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use super::AppConfig;

const APP_NAME: &str = "ContentCompendium";
const CONFIG_FILE: &str = "config.json";

/// Returns the platform-specific configuration directory for the application.
pub fn get_config_directory() -> Option<PathBuf> {
    ProjectDirs::from("com", "contentcompendium", APP_NAME)
        .map(|proj_dirs| proj_dirs.config_dir().to_path_buf())
}

/// The directory that holds every persisted document.
///
/// Production code points it at the platform config directory; tests point it
/// at a temporary directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Storage rooted at the platform configuration directory.
    pub fn from_project_dirs() -> Result<Self> {
        get_config_directory()
            .map(Self::new)
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Reads and parses a JSON document. Returns `Ok(None)` if it does not exist.
    pub fn read_document<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        let path = self.path_for(name);
        if !path.exists() {
            return Ok(None);
        }
        let content =
            fs::read_to_string(&path).with_context(|| format!("Failed to read {:?}", path))?;
        let value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {:?}", path))?;
        Ok(Some(value))
    }

    /// Reads a JSON document, falling back to `T::default()` when it is missing or unreadable.
    ///
    /// An unreadable document is moved aside to `<name>.corrupt` first, so the
    /// next write does not destroy it.
    pub fn read_document_or_default<T: DeserializeOwned + Default>(&self, name: &str) -> T {
        match self.read_document(name) {
            Ok(Some(value)) => value,
            Ok(None) => T::default(),
            Err(e) => {
                let path = self.path_for(name);
                let backup = self.path_for(&format!("{name}.corrupt"));
                match fs::rename(&path, &backup) {
                    Ok(()) => tracing::warn!(
                        "{:#}. Moved {:?} to {:?} and fell back to default.",
                        e,
                        path,
                        backup
                    ),
                    Err(rename_err) => tracing::warn!(
                        "{:#}. Falling back to default, {:?} could not be moved aside: {}",
                        e,
                        path,
                        rename_err
                    ),
                }
                T::default()
            }
        }
    }

    /// Serializes `value` and atomically replaces the document.
    pub fn write_document<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(value)?;
        self.write_atomic(name, json.as_bytes())
    }

    /// Writes `contents` to a temporary file next to the target, then renames it into place.
    pub fn write_atomic(&self, name: &str, contents: &[u8]) -> Result<()> {
        let path = self.path_for(name);
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
            tracing::info!("Created config directory: {:?}", dir);
        }

        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(contents)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path)
            .with_context(|| format!("Failed to replace {:?}", path))?;
        tracing::debug!("Saved {:?}", path);
        Ok(())
    }

    /// Deletes a document. A missing document is not an error.
    pub fn remove_document(&self, name: &str) -> Result<()> {
        let path = self.path_for(name);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to delete {:?}", path)),
        }
    }
}

/// Loads the application configuration from the config file.
/// If the file doesn't exist, it creates a default one.
/// If the file is corrupted or cannot be parsed, it logs a warning
/// and falls back to the default configuration to prevent a crash.
pub fn load_config(storage: &Storage) -> Result<AppConfig> {
    let config_path = storage.path_for(CONFIG_FILE);

    if !config_path.exists() {
        tracing::info!(
            "Config file not found, creating default config at {:?}",
            config_path
        );
        let default_config = AppConfig::default();
        save_config(&default_config, storage)?;
        return Ok(default_config);
    }

    let config_content = fs::read_to_string(&config_path)?;

    match serde_json::from_str::<AppConfig>(&config_content) {
        Ok(config) => {
            tracing::info!("Loaded config from {:?}", config_path);
            Ok(config)
        }
        Err(e) => {
            tracing::warn!(
                "Failed to parse config file at {:?}: {}. Falling back to default config.",
                config_path,
                e
            );
            migrate_legacy_config(&config_content).or_else(|_| Ok(AppConfig::default()))
        }
    }
}

/// Fills fields missing from an older config document with their defaults.
fn migrate_legacy_config(config_content: &str) -> Result<AppConfig> {
    let mut value: Value = serde_json::from_str(config_content)?;
    let obj = value
        .as_object_mut()
        .ok_or_else(|| anyhow::anyhow!("Config is not a JSON object"))?;

    let defaults = serde_json::to_value(AppConfig::default())?;
    if let Value::Object(default_fields) = defaults {
        for (key, default_val) in default_fields {
            if obj.get(&key).map_or(true, Value::is_null) {
                obj.insert(key, default_val);
            }
        }
    }

    let migrated_config: AppConfig = serde_json::from_value(value)?;
    tracing::info!("Successfully migrated legacy config");
    Ok(migrated_config)
}

/// Saves the provided configuration to the config file.
pub fn save_config(config: &AppConfig, storage: &Storage) -> Result<()> {
    storage.write_document(CONFIG_FILE, config)?;
    tracing::info!("Saved config to {:?}", storage.path_for(CONFIG_FILE));
    Ok(())
}
