#![allow(dead_code)]

use std::path::{Path, PathBuf};

use serde_json::json;
use tempfile::TempDir;

use pype_core::types::{ContainerMetadata, RepresentationDoc, AVALON_CONTAINER_ID, CONTAINER_SCHEMA};
use pype_loader::{AvalonProperty, LibrarySource, LoadContext, MemoryScene, ObjectKind, SourceObject};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Write an empty placeholder file so path checks pass.
pub fn touch(dir: &TempDir, name: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, b"").unwrap();
    path
}

fn source_root_metadata() -> ContainerMetadata {
    ContainerMetadata {
        schema: CONTAINER_SCHEMA.into(),
        id: AVALON_CONTAINER_ID.into(),
        name: "hero_rigMain".into(),
        namespace: String::new(),
        loader: String::new(),
        representation: String::new(),
        libpath: String::new(),
        asset_name: "hero_rigMain".into(),
        parent: String::new(),
        family: "rig".into(),
        object_name: "hero_rigMain".into(),
    }
}

/// root -> rig -> body, root -> ctrl, plus a curve hooked onto the body.
pub fn rig_library() -> LibrarySource {
    LibrarySource::new()
        .object(
            SourceObject::new("root", ObjectKind::Empty)
                .avalon(AvalonProperty::Container(source_root_metadata())),
        )
        .object(
            SourceObject::new("rig", ObjectKind::Armature)
                .parent("root")
                .action("walk")
                .driver("rig")
                .constraint("hand", "IK", "ctrl"),
        )
        .object(
            SourceObject::new("body", ObjectKind::Mesh)
                .parent("rig")
                .material("skin"),
        )
        .object(SourceObject::new("ctrl", ObjectKind::Mesh).parent("root"))
        .object(
            SourceObject::new("cable", ObjectKind::Curve)
                .parent("root")
                .modifier("hook", "body"),
        )
}

/// Same rig with an extra mesh under the armature.
pub fn rig_library_v2() -> LibrarySource {
    rig_library().object(SourceObject::new("eyes", ObjectKind::Mesh).parent("rig"))
}

pub fn representation(id: &str, path: &Path) -> RepresentationDoc {
    serde_json::from_value(json!({
        "_id": id,
        "type": "representation",
        "parent": format!("version_of_{id}"),
        "name": "blend",
        "context": {"family": "rig", "asset": "hero", "subset": "rigMain"},
        "data": {"path": path.to_string_lossy()},
    }))
    .unwrap()
}

pub fn context(representation: RepresentationDoc) -> LoadContext {
    LoadContext {
        representation,
        subset: serde_json::from_value(json!({
            "_id": "s1", "type": "subset", "name": "rigMain", "parent": "a1"
        }))
        .unwrap(),
        asset: serde_json::from_value(json!({
            "_id": "a1", "type": "asset", "name": "hero", "parent": "p1"
        }))
        .unwrap(),
    }
}

/// A scene with `v001.blend` and `v002.blend` registered as libraries.
pub fn scene_with_versions(dir: &TempDir) -> (MemoryScene, PathBuf, PathBuf) {
    let v1 = touch(dir, "rigMain_v001.blend");
    let v2 = touch(dir, "rigMain_v002.blend");
    let mut scene = MemoryScene::new();
    scene.register_library(&v1, rig_library());
    scene.register_library(&v2, rig_library_v2());
    (scene, v1, v2)
}
