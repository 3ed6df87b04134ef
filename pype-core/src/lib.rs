//! Pype core library: domain documents, document store, settings, errors.
//!
//! - [`types`]: document shapes, container and instance metadata
//! - [`store`]: [`DocumentStore`] trait and the [`MemoryStore`] implementation
//! - [`settings`]: [`PipelineSettings`] loaded from YAML
//! - [`error`]: [`StoreError`], [`SettingsError`]

pub mod error;
pub mod settings;
pub mod store;
pub mod types;

pub use error::{SettingsError, StoreError};
pub use settings::{PipelineSettings, UnchangeableRemovePolicy};
pub use store::{
    BulkWriteResult, DocumentStore, DocumentStoreExt, Filter, MemoryStore, Update, WriteOp,
};
pub use types::{
    AssetData, AssetDoc, ContainerMetadata, DocId, DocType, HeroVersionDoc, InstanceMetadata,
    ProjectData, ProjectDoc, RepresentationData, RepresentationDoc, RepresentationFile,
    SiteEntry, SubsetDoc, TaskInfo, VersionDoc,
};
