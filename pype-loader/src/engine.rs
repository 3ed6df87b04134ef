//! Loader / updater engine.
//!
//! # Load pass
//!
//! 1. Link the library file and find the source container root (the empty
//!    carrying avalon metadata).
//! 2. Walk the source root's subtree breadth-first, keeping objects of the
//!    loader's allowed kinds. Only kept objects have their children walked.
//! 3. Reverse the walk so children come before their parents.
//! 4. Collect bone constraints of the armatures about to be copied.
//! 5. Make a local copy of every kept object, named `<group>:<name>`.
//! 6. Reparent each copy onto the copy of its parent (or the new root),
//!    retarget constraints and drivers, and stamp member metadata. Every
//!    copy exists before the first one is stamped, so no stamped object
//!    points at a linked parent.
//! 7. Copy curves in a second pass; their modifier targets resolve by name
//!    inside the new group.
//! 8. Purge linked objects nothing uses any more.
//!
//! # Cleanup dispatch
//!
//! | Kind     | Cleanup                                         |
//! |----------|-------------------------------------------------|
//! | Mesh     | remove material slots, remove mesh data         |
//! | Armature | queue children, remove armature data            |
//! | Curve    | remove curve data                               |
//! | Empty    | queue children, remove the empty itself         |

use std::collections::{BTreeMap, VecDeque};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use pype_core::types::{
    AssetDoc, ContainerMetadata, RepresentationDoc, SubsetDoc, AVALON_CONTAINER_ID,
    CONTAINER_SCHEMA,
};

use crate::error::{io_err, LoaderError};
use crate::plugins::{CreateOptions, LoaderProfile, PluginRegistry};
use crate::registry::{
    asset_name, count_library_users, create_root, find_root, metadata_of, unique_number,
};
use crate::scene::{AvalonProperty, ObjectHandle, ObjectKind, SceneGraph, Transform};

/// Documents describing what to load.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadContext {
    pub representation: RepresentationDoc,
    pub subset: SubsetDoc,
    pub asset: AssetDoc,
}

/// Free-form load options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadOptions {
    /// Object the new root is parented to, keeping `transform`.
    pub parent: Option<String>,
    pub transform: Option<Transform>,
    /// Action assigned to loaded armatures instead of their own.
    pub action: Option<String>,
    pub create_animation: bool,
    pub animation_asset: Option<String>,
    /// Animation file merged onto the loaded skeleton.
    pub animation_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedContainer {
    pub root: ObjectHandle,
    pub metadata: ContainerMetadata,
    /// Local objects owned by the container.
    pub objects: Vec<ObjectHandle>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated,
    /// The container already points at the requested library.
    AlreadyUpToDate,
}

/// Resolved library path of a representation (`data.path`).
pub fn representation_path(representation: &RepresentationDoc) -> Result<PathBuf, LoaderError> {
    if representation.data.path.is_empty() {
        return Err(LoaderError::IncompleteRepresentation {
            id: representation.id.to_string(),
            field: "data.path",
        });
    }
    Ok(PathBuf::from(&representation.data.path))
}

fn normalized(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// A loader bound to the plugin registry it was resolved from.
#[derive(Debug, Clone, Copy)]
pub struct AssetLoader<'r> {
    profile: &'r LoaderProfile,
    plugins: &'r PluginRegistry,
}

impl<'r> AssetLoader<'r> {
    pub fn new(profile: &'r LoaderProfile, plugins: &'r PluginRegistry) -> Self {
        Self { profile, plugins }
    }

    /// Look a loader up by name in `plugins`.
    pub fn by_name(plugins: &'r PluginRegistry, name: &str) -> Result<Self, LoaderError> {
        plugins
            .loader(name)
            .map(|profile| Self::new(profile, plugins))
            .ok_or_else(|| LoaderError::LoaderNotFound(name.to_owned()))
    }

    pub fn profile(&self) -> &LoaderProfile {
        self.profile
    }

    // -----------------------------------------------------------------------
    // Load
    // -----------------------------------------------------------------------

    /// Load `context` into a new container.
    ///
    /// On failure after the root was created, the root and everything loaded
    /// under it are removed again.
    pub fn process_asset<S: SceneGraph>(
        &self,
        scene: &mut S,
        context: &LoadContext,
        name: Option<&str>,
        namespace: Option<&str>,
        options: &LoadOptions,
    ) -> Result<LoadedContainer, LoaderError> {
        let representation = &context.representation;
        let libpath = representation_path(representation)?;
        if !libpath.exists() {
            return Err(LoaderError::MissingFile(libpath));
        }
        let family = representation
            .context_str("family")
            .ok_or_else(|| LoaderError::IncompleteRepresentation {
                id: representation.id.to_string(),
                field: "context.family",
            })?
            .to_owned();

        let asset = context.asset.name.as_str();
        let subset = context.subset.name.as_str();
        let number = unique_number(scene, asset, subset);
        let group_name = asset_name(asset, subset, Some(&number));
        let namespace = namespace
            .map(str::to_owned)
            .unwrap_or_else(|| format!("{asset}_{number}"));

        let parent = match (&options.parent, &options.transform) {
            (Some(parent), Some(_)) => Some(
                scene
                    .object_by_name(parent)
                    .ok_or_else(|| LoaderError::ParentNotFound(parent.clone()))?,
            ),
            _ => None,
        };
        if options.create_animation && self.plugins.creator("CreateAnimation").is_none() {
            return Err(LoaderError::CreatorNotFound("CreateAnimation".into()));
        }

        let root = create_root(scene, &group_name)?;
        if let (Some(parent), Some(transform)) = (parent, &options.transform) {
            scene.set_transform(root, transform)?;
            scene.set_parent(root, Some(parent))?;
        }

        let metadata = ContainerMetadata {
            schema: CONTAINER_SCHEMA.to_owned(),
            id: AVALON_CONTAINER_ID.to_owned(),
            name: name.unwrap_or(&group_name).to_owned(),
            namespace: namespace.clone(),
            loader: self.profile.name.to_owned(),
            representation: representation.id.to_string(),
            libpath: libpath.to_string_lossy().into_owned(),
            asset_name: asset_name(asset, subset, None),
            parent: representation.parent.to_string(),
            family,
            object_name: group_name.clone(),
        };

        let populated = self.populate(scene, context, &libpath, root, &metadata, options);
        match populated {
            Ok(objects) => {
                scene.set_avalon(root, AvalonProperty::Container(metadata.clone()))?;
                tracing::info!(
                    "loaded {} into {group_name} ({} object(s))",
                    libpath.display(),
                    objects.len()
                );
                Ok(LoadedContainer {
                    root,
                    metadata,
                    objects,
                })
            }
            Err(err) => {
                if let Err(cleanup) = remove_children(scene, root)
                    .and_then(|()| scene.remove_object(root).map_err(LoaderError::from))
                {
                    tracing::warn!("failed to clean up {group_name} after error: {cleanup}");
                }
                if let Err(cleanup) = discard_library(scene, &metadata.libpath) {
                    tracing::warn!("failed to unload {} after error: {cleanup}", metadata.libpath);
                }
                Err(err)
            }
        }
    }

    fn populate<S: SceneGraph>(
        &self,
        scene: &mut S,
        context: &LoadContext,
        libpath: &Path,
        root: ObjectHandle,
        metadata: &ContainerMetadata,
        options: &LoadOptions,
    ) -> Result<Vec<ObjectHandle>, LoaderError> {
        let group_name = &metadata.object_name;
        let objects = self.link_hierarchy(scene, libpath, root, group_name, options.action.clone())?;

        if options.create_animation {
            let creator = self
                .plugins
                .creator("CreateAnimation")
                .ok_or_else(|| LoaderError::CreatorNotFound("CreateAnimation".into()))?;
            let animation_asset = options
                .animation_asset
                .as_deref()
                .unwrap_or(&context.asset.name);
            let data = BTreeMap::from([(
                "dependencies".to_string(),
                Value::from(context.representation.id.to_string()),
            )]);
            creator.create(
                scene,
                &format!("{}_animation", metadata.namespace),
                animation_asset,
                &CreateOptions {
                    use_selection: false,
                    asset_group: Some(group_name.clone()),
                },
                &data,
            )?;
        }

        if let Some(animation_file) = &options.animation_file {
            merge_animation(scene, root, group_name, animation_file)?;
        }
        Ok(objects)
    }

    /// Link `libpath` and relink its hierarchy under `root`.
    fn link_hierarchy<S: SceneGraph>(
        &self,
        scene: &mut S,
        libpath: &Path,
        root: ObjectHandle,
        group_name: &str,
        action: Option<String>,
    ) -> Result<Vec<ObjectHandle>, LoaderError> {
        let linked = scene.link_library(libpath)?;

        let mut source_root = None;
        for obj in &linked {
            if scene.kind(*obj)? == ObjectKind::Empty && scene.avalon(*obj)?.is_some() {
                source_root = Some(*obj);
                break;
            }
        }
        let source_root = source_root
            .ok_or_else(|| LoaderError::SourceContainerMissing(libpath.display().to_string()))?;

        let mut objects = Vec::new();
        let mut queue: VecDeque<ObjectHandle> = scene.children(source_root)?.into();
        while let Some(obj) = queue.pop_front() {
            if self.profile.allows(scene.kind(obj)?) {
                objects.push(obj);
                queue.extend(scene.children(obj)?);
            }
        }
        objects.reverse();

        let mut constraints = Vec::new();
        for obj in &objects {
            if scene.kind(*obj)? == ObjectKind::Armature {
                for constraint in scene.bone_constraints(*obj)? {
                    if constraint.target.is_some() {
                        constraints.push((*obj, constraint));
                    }
                }
            }
        }

        let mut local_by_original = BTreeMap::new();
        let mut locals = Vec::with_capacity(objects.len());
        for obj in &objects {
            let name = scene.object_name(*obj)?;
            let local = scene.make_local(*obj, &format!("{group_name}:{name}"))?;
            scene.localize_data(local, group_name)?;
            local_by_original.insert(*obj, local);
            locals.push((*obj, local));
        }

        for (original, local) in &locals {
            let parent = scene
                .parent(*original)?
                .and_then(|p| local_by_original.get(&p).copied())
                .unwrap_or(root);
            scene.set_parent(*local, Some(parent))?;

            if scene.kind(*local)? == ObjectKind::Armature {
                if let Some(action) = &action {
                    scene.set_action(*local, Some(action.clone()))?;
                }
                scene.retarget_drivers(*local, *local)?;
            }
            scene.set_avalon(
                *local,
                AvalonProperty::Member {
                    container_name: group_name.to_owned(),
                },
            )?;
        }

        for (armature, constraint) in &constraints {
            let Some(target) = constraint.target.and_then(|t| local_by_original.get(&t)) else {
                continue;
            };
            if let Some(local_armature) = local_by_original.get(armature) {
                scene.set_constraint_target(
                    *local_armature,
                    &constraint.bone,
                    &constraint.name,
                    Some(*target),
                )?;
            }
        }

        let mut result: Vec<ObjectHandle> = locals.iter().rev().map(|(_, l)| *l).collect();

        for obj in &linked {
            if local_by_original.contains_key(obj) || scene.kind(*obj)? != ObjectKind::Curve {
                continue;
            }
            let name = scene.object_name(*obj)?;
            let local = scene.make_local(*obj, &format!("{group_name}:{name}"))?;
            scene.localize_data(local, group_name)?;
            for modifier in scene.modifiers(local)? {
                let Some(target) = modifier.target else {
                    continue;
                };
                let target_name = scene.object_name(target)?;
                let resolved = scene.object_by_name(&format!("{group_name}:{target_name}"));
                scene.set_modifier_target(local, &modifier.name, resolved)?;
            }
            scene.set_avalon(
                local,
                AvalonProperty::Member {
                    container_name: group_name.to_owned(),
                },
            )?;
            scene.set_parent(local, Some(root))?;
            result.push(local);
        }

        let mut purged = 0;
        loop {
            let n = scene.purge_orphans();
            if n == 0 {
                break;
            }
            purged += n;
        }
        tracing::debug!("purged {purged} orphan(s) after linking {}", libpath.display());
        Ok(result)
    }

    // -----------------------------------------------------------------------
    // Update
    // -----------------------------------------------------------------------

    /// Switch a loaded container to `representation` in place.
    ///
    /// The root, its `objectName`, and its transform survive; for loaders
    /// that preserve actions the armature's action survives as well.
    pub fn exec_update<S: SceneGraph>(
        &self,
        scene: &mut S,
        container: &ContainerMetadata,
        representation: &RepresentationDoc,
    ) -> Result<UpdateOutcome, LoaderError> {
        let object_name = &container.object_name;
        let root = find_root(scene, object_name)
            .ok_or_else(|| LoaderError::ContainerNotLoaded(object_name.clone()))?;
        let libpath = representation_path(representation)?;
        match std::fs::metadata(&libpath) {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Err(LoaderError::MissingFile(libpath)),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(LoaderError::MissingFile(libpath))
            }
            Err(err) => return Err(io_err(&libpath, err)),
        }
        let extension = libpath
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default();
        if !self.plugins.valid_extensions().contains(&extension) {
            return Err(LoaderError::UnsupportedExtension(libpath));
        }

        let mut metadata = metadata_of(scene, root)?;
        let group_libpath = metadata.libpath.clone();
        if normalized(Path::new(&group_libpath)) == normalized(&libpath) {
            tracing::info!("library already loaded, not updating {object_name}");
            return Ok(UpdateOutcome::AlreadyUpToDate);
        }

        let users = count_library_users(scene, &group_libpath)?;

        let mut action = None;
        if self.profile.preserves_action {
            for child in scene.children(root)? {
                if scene.kind(child)? == ObjectKind::Armature {
                    action = scene.action(child)?;
                    break;
                }
            }
        }
        let matrix = scene.matrix_basis(root)?;

        if !scene
            .peek_library(&libpath)?
            .iter()
            .any(|entry| entry.is_container && entry.kind == ObjectKind::Empty)
        {
            return Err(LoaderError::SourceContainerMissing(
                libpath.display().to_string(),
            ));
        }

        remove_children(scene, root)?;
        if users == 1 && scene.library_loaded(&group_libpath) {
            tracing::debug!("unloading {group_libpath}, last user was {object_name}");
            scene.unload_library(&group_libpath)?;
        }

        self.link_hierarchy(scene, &libpath, root, object_name, action)?;
        scene.set_matrix_basis(root, matrix)?;

        metadata.libpath = libpath.to_string_lossy().into_owned();
        metadata.representation = representation.id.to_string();
        metadata.parent = representation.parent.to_string();
        scene.set_avalon(root, AvalonProperty::Container(metadata))?;
        tracing::info!("updated {object_name} to {}", libpath.display());
        Ok(UpdateOutcome::Updated)
    }

    // -----------------------------------------------------------------------
    // Remove
    // -----------------------------------------------------------------------

    /// Remove a container. Returns `false` when its root is already gone.
    pub fn exec_remove<S: SceneGraph>(
        &self,
        scene: &mut S,
        container: &ContainerMetadata,
    ) -> Result<bool, LoaderError> {
        let Some(root) = find_root(scene, &container.object_name) else {
            return Ok(false);
        };
        let libpath = match scene.avalon(root)? {
            Some(AvalonProperty::Container(metadata)) => metadata.libpath,
            _ => container.libpath.clone(),
        };
        let users = count_library_users(scene, &libpath)?;

        remove_children(scene, root)?;
        scene.remove_object(root)?;

        if users == 1 && scene.library_loaded(&libpath) {
            tracing::debug!("unloading {libpath}, last user was {}", container.object_name);
            scene.unload_library(&libpath)?;
        }
        Ok(true)
    }
}

/// Remove every descendant of `root` by kind; `root` itself stays.
pub fn remove_children<S: SceneGraph + ?Sized>(
    scene: &mut S,
    root: ObjectHandle,
) -> Result<(), LoaderError> {
    let mut queue: VecDeque<ObjectHandle> = scene.children(root)?.into();
    while let Some(obj) = queue.pop_front() {
        match scene.kind(obj)? {
            ObjectKind::Mesh => {
                scene.remove_materials(obj)?;
                scene.remove_data(obj)?;
            }
            ObjectKind::Armature => {
                queue.extend(scene.children(obj)?);
                scene.remove_data(obj)?;
            }
            ObjectKind::Curve => scene.remove_data(obj)?,
            ObjectKind::Empty => {
                queue.extend(scene.children(obj)?);
                scene.remove_object(obj)?;
            }
        }
    }
    Ok(())
}

/// Purge what a failed link left behind and unload `libpath` once no
/// container references it.
fn discard_library<S: SceneGraph + ?Sized>(
    scene: &mut S,
    libpath: &str,
) -> Result<(), LoaderError> {
    while scene.purge_orphans() > 0 {}
    if scene.library_loaded(libpath) && count_library_users(scene, libpath)? == 0 {
        tracing::debug!("unloading unused library {libpath}");
        scene.unload_library(libpath)?;
    }
    Ok(())
}

/// Import `path` and move its armature action onto the skeleton under
/// `root`, then delete the imported scaffold.
fn merge_animation<S: SceneGraph>(
    scene: &mut S,
    root: ObjectHandle,
    group_name: &str,
    path: &Path,
) -> Result<(), LoaderError> {
    let mut armature = None;
    for child in scene.children(root)? {
        if scene.kind(child)? == ObjectKind::Armature {
            armature = Some(child);
            break;
        }
    }
    let armature = armature.ok_or_else(|| LoaderError::SkeletonNotFound(group_name.to_owned()))?;

    let imported = scene.import_file(path)?;
    let mut imported_group = None;
    for obj in &imported {
        match scene.kind(*obj)? {
            ObjectKind::Empty if imported_group.is_none() => imported_group = Some(*obj),
            ObjectKind::Armature => {
                let action = scene.action(*obj)?;
                scene.set_action(armature, action)?;
            }
            _ => {}
        }
    }
    let Some(imported_group) = imported_group else {
        for obj in imported {
            scene.remove_object(obj)?;
        }
        return Err(LoaderError::ImportedRootMissing(path.to_path_buf()));
    };
    remove_children(scene, imported_group)?;
    scene.remove_object(imported_group)?;
    Ok(())
}
