//! Error types for pype-anatomy.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from anatomy loading and template filling.
#[derive(Debug, Error)]
pub enum AnatomyError {
    /// Tera template engine error (syntax error or undefined key).
    #[error("template engine error: {0}")]
    Tera(#[from] tera::Error),

    /// JSON serialization error (building the template context).
    #[error("context serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parse error on load, includes the anatomy file path.
    #[error("failed to parse anatomy at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("anatomy io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No template registered under the requested key.
    #[error("anatomy has no \"{key}\" template")]
    MissingTemplate { key: String },

    /// The template exists but has no `path` part.
    #[error("anatomy template \"{key}\" has no path")]
    MissingPath { key: String },

    /// The `path` template does not reference `frame`, so it cannot describe
    /// a sequence.
    #[error("anatomy template \"{key}\" has no frame placeholder")]
    NoFramePlaceholder { key: String },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> AnatomyError {
    AnatomyError::Io {
        path: path.into(),
        source,
    }
}
