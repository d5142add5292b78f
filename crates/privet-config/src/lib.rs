//! Settings loading and persistence for the Privet device core.
//!
//! Layers built-in defaults, a TOML file and `PRIVET_*` environment
//! variables into [`privet_core::Settings`], and writes committed changes
//! back to the same file through [`TomlSettingsStore`].

use std::error::Error as StdError;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use thiserror::Error;
use tracing::debug;

use privet_core::{Config, Settings, SettingsStore};

const MODEL_ID_LEN: usize = 5;

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize settings: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("settings loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── Settings file path ──────────────────────────────────────────────

/// Resolve the settings file path via XDG / platform conventions.
pub fn settings_path() -> PathBuf {
    ProjectDirs::from("org", "privet", "privet").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("settings.toml");
            p
        },
        |dirs| dirs.config_dir().join("settings.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("privet");
    p
}

// ── Loading ─────────────────────────────────────────────────────────

/// Load settings from the canonical path plus environment.
pub fn load_settings() -> Result<Settings, ConfigError> {
    load_settings_from(&settings_path())
}

/// Load settings from `path` plus environment. A missing file yields the
/// defaults.
pub fn load_settings_from(path: &Path) -> Result<Settings, ConfigError> {
    let settings: Settings = Figment::new()
        .merge(Serialized::defaults(Settings::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("PRIVET_"))
        .extract()?;

    validate(&settings)?;
    debug!(path = %path.display(), device_id = %settings.device_id, "settings loaded");
    Ok(settings)
}

fn validate(settings: &Settings) -> Result<(), ConfigError> {
    if settings.name.is_empty() {
        return Err(ConfigError::Validation {
            field: "name".into(),
            reason: "must not be empty".into(),
        });
    }
    if settings.model_id.len() != MODEL_ID_LEN || !settings.model_id.is_ascii() {
        return Err(ConfigError::Validation {
            field: "model_id".into(),
            reason: format!(
                "expected {MODEL_ID_LEN} ASCII characters, got '{}'",
                settings.model_id
            ),
        });
    }
    Ok(())
}

/// Load settings from `path` and wire a [`Config`] that saves commits
/// back to it.
pub fn open_config(path: impl Into<PathBuf>) -> Result<Config, ConfigError> {
    let path = path.into();
    let settings = load_settings_from(&path)?;
    Ok(Config::with_store(settings, TomlSettingsStore::new(path)))
}

// ── Saving ──────────────────────────────────────────────────────────

/// Persists committed settings as pretty-printed TOML.
#[derive(Debug, Clone)]
pub struct TomlSettingsStore {
    path: PathBuf,
}

impl TomlSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, settings: &Settings) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let toml_str = toml::to_string_pretty(settings)?;
        std::fs::write(&self.path, toml_str)?;
        debug!(path = %self.path.display(), "settings written");
        Ok(())
    }
}

impl SettingsStore for TomlSettingsStore {
    fn save(&self, settings: &Settings) -> Result<(), Box<dyn StdError + Send + Sync>> {
        self.write(settings).map_err(Into::into)
    }
}
