//! Error types for pype-publish.

use std::path::PathBuf;

use thiserror::Error;

use pype_anatomy::AnatomyError;
use pype_core::StoreError;

/// All errors that can arise from hero integration and file transfers.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("document store error: {0}")]
    Store(#[from] StoreError),

    #[error("anatomy error: {0}")]
    Anatomy(#[from] AnatomyError),

    #[error("document serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The version the representations were published under is not in the
    /// store.
    #[error("can't find origin version of subset {subset}")]
    VersionNotFound { subset: String },

    /// Every `<dir>.BACKUP<N>` slot up to the maximum index is occupied.
    #[error("backup folders of {path} are occupied up to index {max}")]
    BackupSlotsExhausted { path: PathBuf, max: usize },

    /// The current hero directory could not be moved aside.
    #[error("could not back up current hero files at {path}: {source}")]
    BackupFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Representation files mix frame sequences and single files.
    #[error("integrity error in representation {representation}: {reason}")]
    Integrity {
        representation: String,
        reason: String,
    },

    /// A document failed schema validation before commit.
    #[error("invalid {kind} document {id}: {reason}")]
    InvalidDocument {
        kind: &'static str,
        id: String,
        reason: String,
    },

    #[error("failed to transfer {src} to {dst}: {source}")]
    TransferFailed {
        src: PathBuf,
        dst: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No free version number within the probe limit.
    #[error("no free version after {attempts} attempts starting at {start}")]
    VersionsExhausted { start: u32, attempts: u32 },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> PublishError {
    PublishError::Io {
        path: path.into(),
        source,
    }
}
