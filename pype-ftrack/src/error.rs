//! Error types for pype-ftrack.

use thiserror::Error;

use pype_core::StoreError;

use crate::tracker::TrackerError;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("tracker error: {0}")]
    Tracker(#[from] TrackerError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The document store has no project document for this project.
    #[error("project {0} has no project document")]
    ProjectMissing(String),

    /// A configured name pattern does not compile.
    #[error("invalid name pattern for {schema}: {source}")]
    InvalidPattern {
        schema: String,
        #[source]
        source: regex::Error,
    },

    #[error("malformed event: {0}")]
    MalformedEvent(String),
}
