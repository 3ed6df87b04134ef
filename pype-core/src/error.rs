//! Error types for pype-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from document store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying I/O failure while persisting or loading a store file.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization error (document conversion or save path).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// JSON parse error on load, includes the store file path.
    #[error("failed to parse document store at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A document with the same `_id` already exists in the project.
    #[error("duplicate document id {id} in project {project}")]
    DuplicateId { project: String, id: String },

    /// The document is not a JSON object or carries a non-string `_id`.
    #[error("invalid document: {0}")]
    InvalidDocument(String),
}

/// Errors that can arise while loading pipeline settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Underlying I/O failure (permission denied, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parse error on load, includes file path and line context.
    #[error("failed to parse settings at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A name pattern in the settings does not describe a usable value.
    #[error("invalid setting {key}: {reason}")]
    Invalid { key: String, reason: String },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source,
    }
}
