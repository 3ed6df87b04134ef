//! Error types for pype-loader.

use std::path::PathBuf;

use thiserror::Error;

use pype_core::StoreError;

use crate::scene::ObjectHandle;

/// Failures reported by a [`crate::scene::SceneGraph`] implementation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SceneError {
    /// The handle no longer resolves to an object (removed or never existed).
    #[error("object {0} does not exist in the scene")]
    UnknownObject(ObjectHandle),

    #[error("no library at {0}")]
    LibraryNotFound(String),

    #[error("cannot import {0}")]
    ImportFailed(String),

    /// A local object with this name already exists.
    #[error("object name {0} is already taken")]
    NameTaken(String),

    #[error("object {object} has no constraint {bone}/{constraint}")]
    UnknownConstraint {
        object: ObjectHandle,
        bone: String,
        constraint: String,
    },
}

/// All errors that can arise from loading, updating, and removing containers.
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("scene error: {0}")]
    Scene(#[from] SceneError),

    #[error("document store error: {0}")]
    Store(#[from] StoreError),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The container root named by `objectName` is not in the scene.
    #[error("the asset is not loaded: {0}")]
    ContainerNotLoaded(String),

    /// An object with the container's `objectName` already exists.
    #[error("container {0} already exists")]
    DuplicateContainer(String),

    /// The container root carries no container metadata.
    #[error("object {0} carries no container metadata")]
    MissingMetadata(String),

    #[error("the file doesn't exist: {0}")]
    MissingFile(PathBuf),

    #[error("unsupported file: {0}")]
    UnsupportedExtension(PathBuf),

    /// The linked library holds no object with container metadata.
    #[error("no asset group found in {0}")]
    SourceContainerMissing(String),

    /// Merging an animation requires an armature under the container root.
    #[error("no skeleton found under {0}")]
    SkeletonNotFound(String),

    /// The imported animation file holds no root empty.
    #[error("no root found in imported file {0}")]
    ImportedRootMissing(PathBuf),

    #[error("no parent object named {0}")]
    ParentNotFound(String),

    #[error("creator plugin \"{0}\" was not found")]
    CreatorNotFound(String),

    #[error("loader \"{0}\" is not registered")]
    LoaderNotFound(String),

    #[error("this instance already exists: {0}")]
    DuplicateInstance(String),

    /// The representation document lacks a field the loader needs.
    #[error("representation {id} is missing {field}")]
    IncompleteRepresentation { id: String, field: &'static str },

    #[error("{datablocks} datablock(s) but {datapaths} datapath(s)")]
    MismatchedDatablocks { datablocks: usize, datapaths: usize },

    #[error("failed to spawn metadata update: {0}")]
    MetadataSpawn(#[source] std::io::Error),

    /// The metadata-update process exited unsuccessfully. `None` means it was
    /// killed by a signal.
    #[error("metadata update exited with {code:?}")]
    MetadataUpdateFailed { code: Option<i32> },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> LoaderError {
    LoaderError::Io {
        path: path.into(),
        source,
    }
}
