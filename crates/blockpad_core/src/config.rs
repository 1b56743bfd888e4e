//! Configuration types for Blockpad.
//!
//! This module provides the [`Config`] struct which selects the storage
//! backend and tunes autosave. Configuration is persisted as TOML (typically
//! at `~/.config/blockpad/config.toml` on Unix systems).
//!
//! # Example
//!
//! ```toml
//! default_page_title = "Untitled"
//!
//! [storage]
//! backend = "json"
//! dir = "/home/user/.local/share/blockpad"
//!
//! [autosave]
//! debounce_ms = 1000
//! max_retries = 2
//! retry_backoff_ms = 500
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BlockpadError, Result};
use crate::model::DEFAULT_PAGE_TITLE;
use crate::save::AutosaveConfig;

/// Which backing store holds pages and blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Process-local, nothing survives exit
    Memory,
    /// `pages.json` and `blocks.json` inside `dir`
    Json { dir: PathBuf },
    /// A SQLite database file (requires the `sqlite` feature)
    Sqlite { path: PathBuf },
}

impl StorageConfig {
    /// Short backend name for display.
    pub fn backend_name(&self) -> &'static str {
        match self {
            StorageConfig::Memory => "memory",
            StorageConfig::Json { .. } => "json",
            StorageConfig::Sqlite { .. } => "sqlite",
        }
    }
}

/// `Config` is the user-editable part of Blockpad.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Title used when a page is created without one
    #[serde(default = "default_page_title")]
    pub default_page_title: String,

    /// Storage backend selection
    pub storage: StorageConfig,

    /// Debounce and retry tuning for the save coordinator
    #[serde(default)]
    pub autosave: AutosaveConfig,
}

fn default_page_title() -> String {
    DEFAULT_PAGE_TITLE.to_string()
}

impl Config {
    /// Create a config using the given storage backend and default tuning.
    pub fn new(storage: StorageConfig) -> Self {
        Self {
            default_page_title: default_page_title(),
            storage,
            autosave: AutosaveConfig::default(),
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| BlockpadError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save config to a specific path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents).map_err(|e| BlockpadError::FileWrite {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(())
    }
}

// ============================================================================
// Native-only implementation (not available in WASM)
// ============================================================================

#[cfg(not(target_arch = "wasm32"))]
impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("blockpad");

        Self::new(StorageConfig::Json { dir: data_dir })
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl Config {
    /// Get the config file path (~/.config/blockpad/config.toml)
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("blockpad").join("config.toml"))
    }

    /// Load config from default location, or return default if file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = Self::config_path()
            && path.exists()
        {
            return Self::load_from(&path);
        }

        Ok(Config::default())
    }

    /// Save config to default location
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path().ok_or(BlockpadError::NoConfigDir)?;
        self.save_to(&path)
    }
}
