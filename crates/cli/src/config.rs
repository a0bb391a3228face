//! Configuration resolution.
//!
//! Each setting is taken from the first source that provides it:
//! 1. command-line flag or environment variable (clap merges these)
//! 2. the TOML config file
//! 3. compiled default

use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use clap::ValueEnum;
use lms_progress::TrackerConfig;
use serde::Deserialize;

/// Storage backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// One JSON file per record
    Json,
    /// SQLite database file (needs the `sqlite` feature)
    Sqlite,
}

/// Settings from the command line / environment; `None` means not given.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub storage: Option<PathBuf>,
    pub backend: Option<Backend>,
    pub log_level: Option<String>,
}

/// Contents of `lms.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    storage: Option<PathBuf>,
    backend: Option<Backend>,
    log_level: Option<String>,
    tracker: Option<TrackerConfig>,
}

/// Fully resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub storage: PathBuf,
    pub backend: Backend,
    pub log_level: String,
    pub tracker: TrackerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: PathBuf::from(".lms"),
            backend: Backend::Json,
            log_level: "info".to_string(),
            tracker: TrackerConfig::default(),
        }
    }
}

impl Config {
    /// Merge overrides over the config file (if it exists) over defaults.
    pub fn resolve(overrides: Overrides, file: &Path) -> Result<Self> {
        let from_file = match std::fs::read_to_string(file) {
            Ok(text) => toml::from_str::<FileConfig>(&text)
                .with_context(|| format!("invalid config file {}", file.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => FileConfig::default(),
            Err(e) => {
                return Err(e).with_context(|| format!("cannot read config file {}", file.display()))
            }
        };

        let defaults = Config::default();
        Ok(Self {
            storage: overrides.storage.or(from_file.storage).unwrap_or(defaults.storage),
            backend: overrides.backend.or(from_file.backend).unwrap_or(defaults.backend),
            log_level: overrides.log_level.or(from_file.log_level).unwrap_or(defaults.log_level),
            tracker: from_file.tracker.unwrap_or(defaults.tracker),
        })
    }
}
