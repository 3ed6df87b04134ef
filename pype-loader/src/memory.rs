//! In-memory [`SceneGraph`] implementation.
//!
//! Library and import files are registered up front as [`LibrarySource`]s;
//! linking instantiates fresh linked objects from the registered source each
//! time, the way a host re-reads a library file.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::error::SceneError;
use crate::scene::{
    AvalonProperty, ConstraintRef, LibraryEntry, Matrix4, ModifierRef, ObjectHandle, ObjectKind,
    SceneGraph, Transform, IDENTITY,
};

// ---------------------------------------------------------------------------
// Library sources
// ---------------------------------------------------------------------------

/// One object as stored in a library file. References are by name and
/// resolve against the other objects of the same file.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceObject {
    name: String,
    kind: ObjectKind,
    parent: Option<String>,
    avalon: Option<AvalonProperty>,
    data: Option<String>,
    materials: Vec<String>,
    action: Option<String>,
    constraints: Vec<(String, String, Option<String>)>,
    drivers: Vec<String>,
    modifiers: Vec<(String, Option<String>)>,
}

impl SourceObject {
    pub fn new(name: impl Into<String>, kind: ObjectKind) -> Self {
        let name = name.into();
        let data = match kind {
            ObjectKind::Empty => None,
            _ => Some(format!("{name}_data")),
        };
        Self {
            name,
            kind,
            parent: None,
            avalon: None,
            data,
            materials: Vec::new(),
            action: None,
            constraints: Vec::new(),
            drivers: Vec::new(),
            modifiers: Vec::new(),
        }
    }

    pub fn parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn avalon(mut self, prop: AvalonProperty) -> Self {
        self.avalon = Some(prop);
        self
    }

    pub fn material(mut self, material: impl Into<String>) -> Self {
        self.materials.push(material.into());
        self
    }

    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    /// Pose-bone constraint targeting another object of the same file.
    pub fn constraint(
        mut self,
        bone: impl Into<String>,
        name: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        self.constraints
            .push((bone.into(), name.into(), Some(target.into())));
        self
    }

    pub fn driver(mut self, target: impl Into<String>) -> Self {
        self.drivers.push(target.into());
        self
    }

    pub fn modifier(mut self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.modifiers.push((name.into(), Some(target.into())));
        self
    }
}

/// Contents of a library (or importable) file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LibrarySource {
    objects: Vec<SourceObject>,
}

impl LibrarySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn object(mut self, object: SourceObject) -> Self {
        self.objects.push(object);
        self
    }
}

// ---------------------------------------------------------------------------
// Scene
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Object {
    name: String,
    kind: ObjectKind,
    library: Option<String>,
    parent: Option<ObjectHandle>,
    avalon: Option<AvalonProperty>,
    data: Option<String>,
    materials: Vec<String>,
    action: Option<String>,
    constraints: Vec<ConstraintRef>,
    drivers: Vec<Option<ObjectHandle>>,
    modifiers: Vec<ModifierRef>,
    matrix: Matrix4,
}

impl Object {
    fn references(&self, target: ObjectHandle) -> usize {
        let parent = usize::from(self.parent == Some(target));
        let constraints = self
            .constraints
            .iter()
            .filter(|c| c.target == Some(target))
            .count();
        let drivers = self.drivers.iter().filter(|d| **d == Some(target)).count();
        let modifiers = self
            .modifiers
            .iter()
            .filter(|m| m.target == Some(target))
            .count();
        parent + constraints + drivers + modifiers
    }

    fn forget(&mut self, target: ObjectHandle) {
        if self.parent == Some(target) {
            self.parent = None;
        }
        for c in &mut self.constraints {
            if c.target == Some(target) {
                c.target = None;
            }
        }
        for d in &mut self.drivers {
            if *d == Some(target) {
                *d = None;
            }
        }
        for m in &mut self.modifiers {
            if m.target == Some(target) {
                m.target = None;
            }
        }
    }
}

/// Scene held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryScene {
    next_handle: u64,
    objects: BTreeMap<ObjectHandle, Object>,
    collections: BTreeMap<String, Vec<ObjectHandle>>,
    sources: BTreeMap<String, LibrarySource>,
    imports: BTreeMap<String, LibrarySource>,
    loaded: BTreeSet<String>,
    link_counts: BTreeMap<String, usize>,
}

fn key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

impl MemoryScene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `source` available to [`SceneGraph::link_library`] at `path`.
    pub fn register_library(&mut self, path: impl AsRef<Path>, source: LibrarySource) {
        self.sources.insert(key(path.as_ref()), source);
    }

    /// Make `source` available to [`SceneGraph::import_file`] at `path`.
    pub fn register_import(&mut self, path: impl AsRef<Path>, source: LibrarySource) {
        self.imports.insert(key(path.as_ref()), source);
    }

    /// How many times a library was linked.
    pub fn link_count(&self, path: &str) -> usize {
        self.link_counts.get(path).copied().unwrap_or(0)
    }

    pub fn objects(&self) -> Vec<ObjectHandle> {
        self.objects.keys().copied().collect()
    }

    /// Linked objects nothing uses any more.
    pub fn orphans(&self) -> Vec<ObjectHandle> {
        self.objects
            .iter()
            .filter(|(h, o)| o.library.is_some() && self.user_count(**h) == 0)
            .map(|(h, _)| *h)
            .collect()
    }

    /// Materials assigned to an object.
    pub fn materials(&self, obj: ObjectHandle) -> Result<Vec<String>, SceneError> {
        Ok(self.get(obj)?.materials.clone())
    }

    /// Driver targets of an object's data.
    pub fn driver_targets(&self, obj: ObjectHandle) -> Result<Vec<Option<ObjectHandle>>, SceneError> {
        Ok(self.get(obj)?.drivers.clone())
    }

    fn get(&self, obj: ObjectHandle) -> Result<&Object, SceneError> {
        self.objects.get(&obj).ok_or(SceneError::UnknownObject(obj))
    }

    fn get_mut(&mut self, obj: ObjectHandle) -> Result<&mut Object, SceneError> {
        self.objects
            .get_mut(&obj)
            .ok_or(SceneError::UnknownObject(obj))
    }

    fn allocate(&mut self) -> ObjectHandle {
        self.next_handle += 1;
        ObjectHandle(self.next_handle)
    }

    fn user_count(&self, obj: ObjectHandle) -> usize {
        let in_collections = self
            .collections
            .values()
            .filter(|members| members.contains(&obj))
            .count();
        let referenced: usize = self
            .objects
            .iter()
            .filter(|(h, _)| **h != obj)
            .map(|(_, o)| o.references(obj))
            .sum();
        in_collections + referenced
    }

    fn local_name_taken(&self, name: &str) -> bool {
        self.object_by_name(name).is_some()
    }

    fn instantiate(&mut self, source: &LibrarySource, library: Option<&str>) -> Vec<ObjectHandle> {
        let handles: Vec<ObjectHandle> = source.objects.iter().map(|_| self.allocate()).collect();
        let by_name: BTreeMap<&str, ObjectHandle> = source
            .objects
            .iter()
            .zip(&handles)
            .map(|(o, h)| (o.name.as_str(), *h))
            .collect();
        let resolve = |name: &Option<String>| name.as_deref().and_then(|n| by_name.get(n).copied());

        for (src, handle) in source.objects.iter().zip(&handles) {
            let object = Object {
                name: src.name.clone(),
                kind: src.kind,
                library: library.map(str::to_owned),
                parent: resolve(&src.parent),
                avalon: src.avalon.clone(),
                data: src.data.clone(),
                materials: src.materials.clone(),
                action: src.action.clone(),
                constraints: src
                    .constraints
                    .iter()
                    .map(|(bone, name, target)| ConstraintRef {
                        bone: bone.clone(),
                        name: name.clone(),
                        target: resolve(target),
                    })
                    .collect(),
                drivers: src
                    .drivers
                    .iter()
                    .map(|t| by_name.get(t.as_str()).copied())
                    .collect(),
                modifiers: src
                    .modifiers
                    .iter()
                    .map(|(name, target)| ModifierRef {
                        name: name.clone(),
                        target: resolve(target),
                    })
                    .collect(),
                matrix: IDENTITY,
            };
            self.objects.insert(*handle, object);
        }
        handles
    }

    fn detach(&mut self, obj: ObjectHandle) {
        self.objects.remove(&obj);
        for members in self.collections.values_mut() {
            members.retain(|h| *h != obj);
        }
        for other in self.objects.values_mut() {
            other.forget(obj);
        }
    }
}

impl SceneGraph for MemoryScene {
    fn object_by_name(&self, name: &str) -> Option<ObjectHandle> {
        self.objects
            .iter()
            .find(|(_, o)| o.library.is_none() && o.name == name)
            .map(|(h, _)| *h)
    }

    fn object_name(&self, obj: ObjectHandle) -> Result<String, SceneError> {
        Ok(self.get(obj)?.name.clone())
    }

    fn kind(&self, obj: ObjectHandle) -> Result<ObjectKind, SceneError> {
        Ok(self.get(obj)?.kind)
    }

    fn library_of(&self, obj: ObjectHandle) -> Result<Option<String>, SceneError> {
        Ok(self.get(obj)?.library.clone())
    }

    fn children(&self, obj: ObjectHandle) -> Result<Vec<ObjectHandle>, SceneError> {
        self.get(obj)?;
        Ok(self
            .objects
            .iter()
            .filter(|(_, o)| o.parent == Some(obj))
            .map(|(h, _)| *h)
            .collect())
    }

    fn parent(&self, obj: ObjectHandle) -> Result<Option<ObjectHandle>, SceneError> {
        Ok(self.get(obj)?.parent)
    }

    fn set_parent(
        &mut self,
        obj: ObjectHandle,
        parent: Option<ObjectHandle>,
    ) -> Result<(), SceneError> {
        if let Some(p) = parent {
            self.get(p)?;
        }
        self.get_mut(obj)?.parent = parent;
        Ok(())
    }

    fn avalon(&self, obj: ObjectHandle) -> Result<Option<AvalonProperty>, SceneError> {
        Ok(self.get(obj)?.avalon.clone())
    }

    fn set_avalon(&mut self, obj: ObjectHandle, prop: AvalonProperty) -> Result<(), SceneError> {
        self.get_mut(obj)?.avalon = Some(prop);
        Ok(())
    }

    fn create_empty(&mut self, name: &str) -> Result<ObjectHandle, SceneError> {
        if self.local_name_taken(name) {
            return Err(SceneError::NameTaken(name.to_owned()));
        }
        let handle = self.allocate();
        self.objects.insert(
            handle,
            Object {
                name: name.to_owned(),
                kind: ObjectKind::Empty,
                library: None,
                parent: None,
                avalon: None,
                data: None,
                materials: Vec::new(),
                action: None,
                constraints: Vec::new(),
                drivers: Vec::new(),
                modifiers: Vec::new(),
                matrix: IDENTITY,
            },
        );
        Ok(handle)
    }

    fn link_to_collection(
        &mut self,
        obj: ObjectHandle,
        collection: &str,
    ) -> Result<(), SceneError> {
        self.get(obj)?;
        let members = self.collections.entry(collection.to_owned()).or_default();
        if !members.contains(&obj) {
            members.push(obj);
        }
        Ok(())
    }

    fn collection_objects(&self, collection: &str) -> Vec<ObjectHandle> {
        self.collections.get(collection).cloned().unwrap_or_default()
    }

    fn link_library(&mut self, libpath: &Path) -> Result<Vec<ObjectHandle>, SceneError> {
        let path = key(libpath);
        let source = self
            .sources
            .get(&path)
            .cloned()
            .ok_or_else(|| SceneError::LibraryNotFound(path.clone()))?;
        let handles = self.instantiate(&source, Some(&path));
        self.loaded.insert(path.clone());
        *self.link_counts.entry(path).or_default() += 1;
        Ok(handles)
    }

    fn peek_library(&self, libpath: &Path) -> Result<Vec<LibraryEntry>, SceneError> {
        let path = key(libpath);
        let source = self
            .sources
            .get(&path)
            .ok_or(SceneError::LibraryNotFound(path))?;
        Ok(source
            .objects
            .iter()
            .map(|o| LibraryEntry {
                name: o.name.clone(),
                kind: o.kind,
                parent: o.parent.clone(),
                is_container: o.avalon.as_ref().and_then(AvalonProperty::container).is_some(),
            })
            .collect())
    }

    fn library_loaded(&self, libpath: &str) -> bool {
        self.loaded.contains(libpath)
    }

    fn unload_library(&mut self, libpath: &str) -> Result<(), SceneError> {
        if !self.loaded.remove(libpath) {
            return Err(SceneError::LibraryNotFound(libpath.to_owned()));
        }
        let linked: Vec<ObjectHandle> = self
            .objects
            .iter()
            .filter(|(_, o)| o.library.as_deref() == Some(libpath))
            .map(|(h, _)| *h)
            .collect();
        for h in linked {
            self.detach(h);
        }
        Ok(())
    }

    fn purge_orphans(&mut self) -> usize {
        let orphans = self.orphans();
        for h in &orphans {
            self.detach(*h);
        }
        orphans.len()
    }

    fn make_local(
        &mut self,
        obj: ObjectHandle,
        new_name: &str,
    ) -> Result<ObjectHandle, SceneError> {
        if self.local_name_taken(new_name) {
            return Err(SceneError::NameTaken(new_name.to_owned()));
        }
        let mut copy = self.get(obj)?.clone();
        copy.name = new_name.to_owned();
        copy.library = None;
        let handle = self.allocate();
        self.objects.insert(handle, copy);
        Ok(handle)
    }

    fn localize_data(&mut self, obj: ObjectHandle, prefix: &str) -> Result<(), SceneError> {
        let object = self.get_mut(obj)?;
        if let Some(data) = object.data.take() {
            object.data = Some(format!("{prefix}:{data}"));
        }
        for material in &mut object.materials {
            *material = format!("{prefix}:{material}");
        }
        if let Some(action) = object.action.take() {
            object.action = Some(format!("{prefix}:{action}"));
        }
        Ok(())
    }

    fn bone_constraints(&self, obj: ObjectHandle) -> Result<Vec<ConstraintRef>, SceneError> {
        Ok(self.get(obj)?.constraints.clone())
    }

    fn set_constraint_target(
        &mut self,
        obj: ObjectHandle,
        bone: &str,
        constraint: &str,
        target: Option<ObjectHandle>,
    ) -> Result<(), SceneError> {
        let object = self.get_mut(obj)?;
        let slot = object
            .constraints
            .iter_mut()
            .find(|c| c.bone == bone && c.name == constraint)
            .ok_or_else(|| SceneError::UnknownConstraint {
                object: obj,
                bone: bone.to_owned(),
                constraint: constraint.to_owned(),
            })?;
        slot.target = target;
        Ok(())
    }

    fn retarget_drivers(
        &mut self,
        obj: ObjectHandle,
        target: ObjectHandle,
    ) -> Result<(), SceneError> {
        for driver in &mut self.get_mut(obj)?.drivers {
            *driver = Some(target);
        }
        Ok(())
    }

    fn modifiers(&self, obj: ObjectHandle) -> Result<Vec<ModifierRef>, SceneError> {
        Ok(self.get(obj)?.modifiers.clone())
    }

    fn set_modifier_target(
        &mut self,
        obj: ObjectHandle,
        modifier: &str,
        target: Option<ObjectHandle>,
    ) -> Result<(), SceneError> {
        for m in self
            .get_mut(obj)?
            .modifiers
            .iter_mut()
            .filter(|m| m.name == modifier)
        {
            m.target = target;
        }
        Ok(())
    }

    fn matrix_basis(&self, obj: ObjectHandle) -> Result<Matrix4, SceneError> {
        Ok(self.get(obj)?.matrix)
    }

    fn set_matrix_basis(&mut self, obj: ObjectHandle, matrix: Matrix4) -> Result<(), SceneError> {
        self.get_mut(obj)?.matrix = matrix;
        Ok(())
    }

    fn set_transform(
        &mut self,
        obj: ObjectHandle,
        transform: &Transform,
    ) -> Result<(), SceneError> {
        // Basis columns are the XYZ euler rotation (Rz * Ry * Rx) scaled per
        // axis; translation goes in the last column.
        let t = transform;
        let (sx, cx) = t.rotation.x.sin_cos();
        let (sy, cy) = t.rotation.y.sin_cos();
        let (sz, cz) = t.rotation.z.sin_cos();
        let axes = [
            [cy * cz, cy * sz, -sy],
            [sx * sy * cz - cx * sz, sx * sy * sz + cx * cz, sx * cy],
            [cx * sy * cz + sx * sz, cx * sy * sz - sx * cz, cx * cy],
        ];
        let scale = [t.scale.x, t.scale.y, t.scale.z];
        let mut matrix = IDENTITY;
        for (col, axis) in axes.iter().enumerate() {
            for (row, value) in axis.iter().enumerate() {
                matrix[col][row] = value * scale[col];
            }
        }
        matrix[3][0] = t.translation.x;
        matrix[3][1] = t.translation.y;
        matrix[3][2] = t.translation.z;
        self.get_mut(obj)?.matrix = matrix;
        Ok(())
    }

    fn action(&self, obj: ObjectHandle) -> Result<Option<String>, SceneError> {
        Ok(self.get(obj)?.action.clone())
    }

    fn set_action(
        &mut self,
        obj: ObjectHandle,
        action: Option<String>,
    ) -> Result<(), SceneError> {
        self.get_mut(obj)?.action = action;
        Ok(())
    }

    fn remove_materials(&mut self, obj: ObjectHandle) -> Result<(), SceneError> {
        self.get_mut(obj)?.materials.clear();
        Ok(())
    }

    fn remove_data(&mut self, obj: ObjectHandle) -> Result<(), SceneError> {
        self.get(obj)?;
        self.detach(obj);
        Ok(())
    }

    fn remove_object(&mut self, obj: ObjectHandle) -> Result<(), SceneError> {
        self.get(obj)?;
        self.detach(obj);
        Ok(())
    }

    fn import_file(&mut self, path: &Path) -> Result<Vec<ObjectHandle>, SceneError> {
        let path = key(path);
        let source = self
            .imports
            .get(&path)
            .cloned()
            .ok_or(SceneError::ImportFailed(path))?;
        let handles = self.instantiate(&source, None);
        for h in &handles {
            self.link_to_collection(*h, "Scene")?;
        }
        Ok(handles)
    }
}
