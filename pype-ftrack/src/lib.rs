//! Tracker to document-store synchronisation.
//!
//! - [`event`]: parsing and classifying tracker events
//! - [`index`]: per-event view of the asset tree
//! - [`changeability`]: which assets may be renamed, moved or removed
//! - [`processor`]: [`SyncProcessor`], applying an event to the store
//! - [`tracker`]: [`TrackerSession`] seam and the in-memory session

pub mod changeability;
pub mod error;
pub mod event;
pub mod index;
pub mod patterns;
pub mod processor;
pub mod report;
pub mod tracker;
pub mod updates;

pub use changeability::{Changeability, Reason};
pub use error::SyncError;
pub use event::{classify, Action, EntityChange, EventBatch, TrackerEvent};
pub use index::AssetIndex;
pub use patterns::{NameKind, SchemaPatterns};
pub use processor::SyncProcessor;
pub use report::{Severity, SyncReport};
pub use tracker::{
    AttributeKind, CustomAttribute, MemoryTracker, TrackerEntity, TrackerError, TrackerProject,
    TrackerSession, TrackerTask,
};
pub use updates::Updates;
