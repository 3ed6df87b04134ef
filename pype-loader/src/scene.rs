//! Scene graph adapter.
//!
//! A host application exposes its scene to the loader through
//! [`SceneGraph`]. Objects are addressed by opaque [`ObjectHandle`]s; names
//! are only used for lookups the host would do by name (container roots,
//! modifier targets).
//!
//! Objects pulled in from a library file stay *linked* (read-only, owned by
//! the library) until [`SceneGraph::make_local`] produces an editable local
//! copy. [`SceneGraph::object_by_name`] only resolves local objects.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use pype_core::types::{ContainerMetadata, InstanceMetadata};

use crate::error::SceneError;

/// Opaque scene object identifier. Never reused within one scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectHandle(pub u64);

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The closed set of object kinds the loader knows how to relink and clean up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Mesh,
    Armature,
    Curve,
    Empty,
}

/// The "avalon" property block an object may carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AvalonProperty {
    /// Root of a loaded container.
    Container(ContainerMetadata),
    /// Object owned by a container.
    Member { container_name: String },
    /// Publish instance created in the scene.
    Instance(InstanceMetadata),
}

impl AvalonProperty {
    pub fn container(&self) -> Option<&ContainerMetadata> {
        match self {
            AvalonProperty::Container(meta) if meta.is_container() => Some(meta),
            _ => None,
        }
    }
}

/// Column-major 4x4 local transform.
pub type Matrix4 = [[f64; 4]; 4];

pub const IDENTITY: Matrix4 = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Default for Vec3 {
    fn default() -> Self {
        Self { x: 0.0, y: 0.0, z: 0.0 }
    }
}

/// Location, XYZ euler rotation in radians and scale applied to a new
/// container root.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vec3::default(),
            rotation: Vec3::default(),
            scale: Vec3 { x: 1.0, y: 1.0, z: 1.0 },
        }
    }
}

/// A pose-bone constraint of an armature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintRef {
    pub bone: String,
    pub name: String,
    pub target: Option<ObjectHandle>,
}

/// An object modifier that may point at another object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifierRef {
    pub name: String,
    pub target: Option<ObjectHandle>,
}

/// Shallow description of an object inside a library file, read without
/// linking it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryEntry {
    pub name: String,
    pub kind: ObjectKind,
    pub parent: Option<String>,
    pub is_container: bool,
}

/// Operations the loader needs from a host scene.
pub trait SceneGraph {
    /// Resolve a local object by name.
    fn object_by_name(&self, name: &str) -> Option<ObjectHandle>;
    fn object_name(&self, obj: ObjectHandle) -> Result<String, SceneError>;
    fn kind(&self, obj: ObjectHandle) -> Result<ObjectKind, SceneError>;
    /// Library path the object is linked from; `None` for local objects.
    fn library_of(&self, obj: ObjectHandle) -> Result<Option<String>, SceneError>;

    fn children(&self, obj: ObjectHandle) -> Result<Vec<ObjectHandle>, SceneError>;
    fn parent(&self, obj: ObjectHandle) -> Result<Option<ObjectHandle>, SceneError>;
    fn set_parent(
        &mut self,
        obj: ObjectHandle,
        parent: Option<ObjectHandle>,
    ) -> Result<(), SceneError>;

    fn avalon(&self, obj: ObjectHandle) -> Result<Option<AvalonProperty>, SceneError>;
    fn set_avalon(&mut self, obj: ObjectHandle, prop: AvalonProperty) -> Result<(), SceneError>;

    fn create_empty(&mut self, name: &str) -> Result<ObjectHandle, SceneError>;
    /// Link into a named collection, creating the collection on demand.
    fn link_to_collection(&mut self, obj: ObjectHandle, collection: &str)
        -> Result<(), SceneError>;
    fn collection_objects(&self, collection: &str) -> Vec<ObjectHandle>;

    /// Link every object of a library file into the scene (still linked,
    /// not local) and return them.
    fn link_library(&mut self, libpath: &Path) -> Result<Vec<ObjectHandle>, SceneError>;
    fn peek_library(&self, libpath: &Path) -> Result<Vec<LibraryEntry>, SceneError>;
    fn library_loaded(&self, libpath: &str) -> bool;
    /// Unload a library and every object still linked from it.
    fn unload_library(&mut self, libpath: &str) -> Result<(), SceneError>;
    /// Remove linked objects nobody uses. Returns how many were removed.
    fn purge_orphans(&mut self) -> usize;

    /// Make a local, editable copy of `obj` named `new_name`. The copy keeps
    /// the source's parent, constraints, drivers, and modifiers as-is.
    fn make_local(&mut self, obj: ObjectHandle, new_name: &str)
        -> Result<ObjectHandle, SceneError>;
    /// Make the object's own datablocks (mesh/armature/curve data, material
    /// slots, action) local, renamed `<prefix>:<name>`.
    fn localize_data(&mut self, obj: ObjectHandle, prefix: &str) -> Result<(), SceneError>;

    fn bone_constraints(&self, obj: ObjectHandle) -> Result<Vec<ConstraintRef>, SceneError>;
    fn set_constraint_target(
        &mut self,
        obj: ObjectHandle,
        bone: &str,
        constraint: &str,
        target: Option<ObjectHandle>,
    ) -> Result<(), SceneError>;
    /// Point every driver variable target of the object's data at `target`.
    fn retarget_drivers(
        &mut self,
        obj: ObjectHandle,
        target: ObjectHandle,
    ) -> Result<(), SceneError>;
    fn modifiers(&self, obj: ObjectHandle) -> Result<Vec<ModifierRef>, SceneError>;
    fn set_modifier_target(
        &mut self,
        obj: ObjectHandle,
        modifier: &str,
        target: Option<ObjectHandle>,
    ) -> Result<(), SceneError>;

    fn matrix_basis(&self, obj: ObjectHandle) -> Result<Matrix4, SceneError>;
    fn set_matrix_basis(&mut self, obj: ObjectHandle, matrix: Matrix4) -> Result<(), SceneError>;
    fn set_transform(&mut self, obj: ObjectHandle, transform: &Transform)
        -> Result<(), SceneError>;

    fn action(&self, obj: ObjectHandle) -> Result<Option<String>, SceneError>;
    fn set_action(&mut self, obj: ObjectHandle, action: Option<String>)
        -> Result<(), SceneError>;

    fn remove_materials(&mut self, obj: ObjectHandle) -> Result<(), SceneError>;
    /// Remove the object's datablock together with the object using it.
    fn remove_data(&mut self, obj: ObjectHandle) -> Result<(), SceneError>;
    fn remove_object(&mut self, obj: ObjectHandle) -> Result<(), SceneError>;

    /// Import a file as local objects (e.g. an FBX animation).
    fn import_file(&mut self, path: &Path) -> Result<Vec<ObjectHandle>, SceneError>;
}
