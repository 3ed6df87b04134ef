//! Error types for pype-syncserver.

use thiserror::Error;

use pype_core::{DocId, StoreError};

#[derive(Debug, Error)]
pub enum SyncServerError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("representation JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("representation {0} not found")]
    RepresentationNotFound(DocId),

    /// A column or status name given on the command line is not known.
    #[error("unknown {kind} {name:?}")]
    UnknownName { kind: &'static str, name: String },
}
