//! Container registry: the loaded-asset roots of a scene.
//!
//! Every container root is linked into the [`AVALON_CONTAINERS`] collection
//! and carries [`AvalonProperty::Container`] metadata. Roots are named
//! `<asset>_<subset>_<NN>` with the lowest unused two-digit number, and that
//! name doubles as the container's `objectName`.

use pype_core::types::ContainerMetadata;

use crate::error::LoaderError;
use crate::scene::{AvalonProperty, ObjectHandle, SceneGraph};

/// Collection holding every container root.
pub const AVALON_CONTAINERS: &str = "AVALON_CONTAINERS";

/// Collection holding publish instances created in the scene.
pub const AVALON_INSTANCES: &str = "AVALON_INSTANCES";

/// `<asset>_<subset>`, or `<asset>_<subset>_<number>` when numbered.
pub fn asset_name(asset: &str, subset: &str, number: Option<&str>) -> String {
    match number {
        Some(n) => format!("{asset}_{subset}_{n}"),
        None => format!("{asset}_{subset}"),
    }
}

/// Lowest two-digit number not yet used by a root for this asset and subset.
pub fn unique_number<S: SceneGraph + ?Sized>(scene: &S, asset: &str, subset: &str) -> String {
    let mut count = 1u32;
    loop {
        let number = format!("{count:0>2}");
        if scene
            .object_by_name(&asset_name(asset, subset, Some(&number)))
            .is_none()
        {
            return number;
        }
        count += 1;
    }
}

/// A container found in the scene.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerEntry {
    pub root: ObjectHandle,
    pub metadata: ContainerMetadata,
}

/// Every container root in the scene, in collection order.
pub fn ls<S: SceneGraph + ?Sized>(scene: &S) -> Result<Vec<ContainerEntry>, LoaderError> {
    let mut found = Vec::new();
    for root in scene.collection_objects(AVALON_CONTAINERS) {
        if let Some(AvalonProperty::Container(metadata)) = scene.avalon(root)? {
            if metadata.is_container() {
                found.push(ContainerEntry { root, metadata });
            }
        }
    }
    Ok(found)
}

/// Containers currently referencing `libpath`.
pub fn count_library_users<S: SceneGraph + ?Sized>(
    scene: &S,
    libpath: &str,
) -> Result<usize, LoaderError> {
    Ok(ls(scene)?
        .iter()
        .filter(|c| c.metadata.libpath == libpath)
        .count())
}

/// Resolve the root of a container by its `objectName`.
pub fn find_root<S: SceneGraph + ?Sized>(scene: &S, object_name: &str) -> Option<ObjectHandle> {
    scene.object_by_name(object_name)
}

/// Create an empty root named `object_name` inside [`AVALON_CONTAINERS`].
pub fn create_root<S: SceneGraph + ?Sized>(
    scene: &mut S,
    object_name: &str,
) -> Result<ObjectHandle, LoaderError> {
    if scene.object_by_name(object_name).is_some() {
        return Err(LoaderError::DuplicateContainer(object_name.to_owned()));
    }
    let root = scene.create_empty(object_name)?;
    scene.link_to_collection(root, AVALON_CONTAINERS)?;
    Ok(root)
}

/// Read the container metadata stamped on `root`.
pub fn metadata_of<S: SceneGraph + ?Sized>(
    scene: &S,
    root: ObjectHandle,
) -> Result<ContainerMetadata, LoaderError> {
    match scene.avalon(root)? {
        Some(AvalonProperty::Container(metadata)) => Ok(metadata),
        _ => Err(LoaderError::MissingMetadata(scene.object_name(root)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryScene;
    use pype_core::types::{AVALON_CONTAINER_ID, CONTAINER_SCHEMA};

    fn meta(name: &str, libpath: &str) -> ContainerMetadata {
        ContainerMetadata {
            schema: CONTAINER_SCHEMA.into(),
            id: AVALON_CONTAINER_ID.into(),
            name: name.into(),
            namespace: String::new(),
            loader: "BlendRigLoader".into(),
            representation: "r1".into(),
            libpath: libpath.into(),
            asset_name: "hero_rigMain".into(),
            parent: "v1".into(),
            family: "rig".into(),
            object_name: name.into(),
        }
    }

    #[test]
    fn unique_number_picks_lowest_gap() {
        let mut scene = MemoryScene::new();
        assert_eq!(unique_number(&scene, "hero", "rigMain"), "01");
        create_root(&mut scene, "hero_rigMain_01").unwrap();
        create_root(&mut scene, "hero_rigMain_03").unwrap();
        assert_eq!(unique_number(&scene, "hero", "rigMain"), "02");
        assert_eq!(unique_number(&scene, "other", "rigMain"), "01");
    }

    #[test]
    fn create_root_rejects_duplicates() {
        let mut scene = MemoryScene::new();
        create_root(&mut scene, "hero_rigMain_01").unwrap();
        let err = create_root(&mut scene, "hero_rigMain_01").unwrap_err();
        assert!(matches!(err, LoaderError::DuplicateContainer(_)));
    }

    #[test]
    fn ls_lists_only_stamped_roots() {
        let mut scene = MemoryScene::new();
        let a = create_root(&mut scene, "a").unwrap();
        create_root(&mut scene, "b").unwrap();
        scene
            .set_avalon(a, AvalonProperty::Container(meta("a", "/lib/x.blend")))
            .unwrap();
        let found = ls(&scene).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].root, a);
        assert_eq!(count_library_users(&scene, "/lib/x.blend").unwrap(), 1);
        assert_eq!(count_library_users(&scene, "/lib/y.blend").unwrap(), 0);
    }
}
