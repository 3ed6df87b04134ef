//! # pype-loader
//!
//! Loads published libraries into a host scene as containers, updates them
//! in place, and removes them again.
//!
//! - [`scene`]: the [`SceneGraph`] adapter a host implements
//! - [`memory`]: [`MemoryScene`], an in-memory scene
//! - [`registry`]: container discovery and naming
//! - [`plugins`]: loader profiles, creators, [`PluginRegistry`]
//! - [`engine`]: [`AssetLoader`]: `process_asset`, `exec_update`, `exec_remove`
//! - [`diff`]: update preview
//! - [`metadata`]: follow-up metadata-update process

pub mod diff;
pub mod engine;
pub mod error;
pub mod memory;
pub mod metadata;
pub mod plugins;
pub mod registry;
pub mod scene;

pub use diff::{diff_container, ContainerDiff};
pub use engine::{AssetLoader, LoadContext, LoadOptions, LoadedContainer, UpdateOutcome};
pub use error::{LoaderError, SceneError};
pub use memory::{LibrarySource, MemoryScene, SourceObject};
pub use metadata::{apply_metadata_update, MetadataUpdateArgs, MetadataUpdateCommand};
pub use plugins::{CreateAnimation, Creator, LoaderProfile, PluginRegistry};
pub use scene::{AvalonProperty, ObjectHandle, ObjectKind, SceneGraph, Transform};
