//! # pype-publish
//!
//! Hero version integration: promote a fresh publish into the subset's
//! version-less hero slot, with rollback of the hero directory on failure.
//!
//! - [`hero`]: [`HeroIntegrator`]
//! - [`transfer`]: hard link with copy fallback
//! - [`sequence`]: frame-sequence assembly
//! - [`versioning`]: next free version number
//! - [`validate`]: document checks before commit

pub mod error;
pub mod hero;
pub mod instance;
pub mod sequence;
pub mod transfer;
pub mod validate;
pub mod versioning;

pub use error::PublishError;
pub use hero::{HeroIntegrator, HeroOutcome, HeroSummary, SkipReason};
pub use instance::{PublishInstance, PublishedRepresentation};
pub use transfer::{FileTransfer, HardlinkTransfer, TransferMode};
pub use versioning::{next_free_version, next_version_number};
