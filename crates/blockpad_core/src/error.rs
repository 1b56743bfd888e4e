use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Unified error type for blockpad operations
#[derive(Debug, Error)]
pub enum BlockpadError {
    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read '{path}': {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write '{path}': {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    // Record encoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(all(not(target_arch = "wasm32"), feature = "sqlite"))]
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    // Config errors
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config serialize error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("Could not determine config directory")]
    NoConfigDir,

    // Model errors
    #[error("Page not found: '{0}'")]
    PageNotFound(String),

    #[error("Block '{block_id}' belongs to page '{block_page}', not '{target_page}'")]
    ForeignBlock {
        block_id: String,
        block_page: String,
        target_page: String,
    },

    #[error("Unknown block type: '{0}'")]
    InvalidBlockType(String),

    #[error("Storage backend is unavailable: {0}")]
    StorageUnavailable(String),
}

/// Result type alias for blockpad operations
pub type Result<T> = std::result::Result<T, BlockpadError>;

/// A serializable representation of BlockpadError for IPC with the editing surface
#[derive(Debug, Clone, Serialize)]
pub struct SerializableError {
    /// Error kind/variant name
    pub kind: String,
    /// Human-readable error message
    pub message: String,
    /// Associated path (if applicable)
    pub path: Option<PathBuf>,
}

impl From<&BlockpadError> for SerializableError {
    fn from(err: &BlockpadError) -> Self {
        let kind = match err {
            BlockpadError::Io(_) => "Io",
            BlockpadError::FileRead { .. } => "FileRead",
            BlockpadError::FileWrite { .. } => "FileWrite",
            BlockpadError::Json(_) => "Json",
            #[cfg(all(not(target_arch = "wasm32"), feature = "sqlite"))]
            BlockpadError::Database(_) => "Database",
            BlockpadError::ConfigParse(_) => "ConfigParse",
            BlockpadError::ConfigSerialize(_) => "ConfigSerialize",
            BlockpadError::NoConfigDir => "NoConfigDir",
            BlockpadError::PageNotFound(_) => "PageNotFound",
            BlockpadError::ForeignBlock { .. } => "ForeignBlock",
            BlockpadError::InvalidBlockType(_) => "InvalidBlockType",
            BlockpadError::StorageUnavailable(_) => "StorageUnavailable",
        }
        .to_string();

        let path = match err {
            BlockpadError::FileRead { path, .. } => Some(path.clone()),
            BlockpadError::FileWrite { path, .. } => Some(path.clone()),
            _ => None,
        };

        Self {
            kind,
            message: err.to_string(),
            path,
        }
    }
}

impl From<BlockpadError> for SerializableError {
    fn from(err: BlockpadError) -> Self {
        SerializableError::from(&err)
    }
}

impl BlockpadError {
    /// Convert to a serializable representation for IPC
    pub fn to_serializable(&self) -> SerializableError {
        SerializableError::from(self)
    }

    /// Whether this error means the referenced record does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, BlockpadError::PageNotFound(_))
    }
}
