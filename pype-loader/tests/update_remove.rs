mod common;

use common::*;
use rstest::rstest;
use tempfile::TempDir;

use pype_core::settings::LoaderSettings;
use pype_loader::registry::{count_library_users, metadata_of};
use pype_loader::{
    diff_container, AssetLoader, LibrarySource, LoadOptions, LoadedContainer, LoaderError,
    MemoryScene, ObjectKind, PluginRegistry, SceneGraph, SourceObject, UpdateOutcome,
};

fn load(
    scene: &mut MemoryScene,
    plugins: &PluginRegistry,
    path: &std::path::Path,
) -> LoadedContainer {
    AssetLoader::by_name(plugins, "BlendRigLoader")
        .unwrap()
        .process_asset(
            scene,
            &context(representation("r1", path)),
            None,
            None,
            &LoadOptions::default(),
        )
        .unwrap()
}

fn key(path: &std::path::Path) -> String {
    path.to_string_lossy().into_owned()
}

#[test]
fn update_to_same_library_relinks_once() {
    init_logger();
    let dir = TempDir::new().unwrap();
    let (mut scene, v1, v2) = scene_with_versions(&dir);
    let plugins = PluginRegistry::init(&LoaderSettings::default());
    let loader = AssetLoader::by_name(&plugins, "BlendRigLoader").unwrap();
    let loaded = load(&mut scene, &plugins, &v1);

    let mut matrix = scene.matrix_basis(loaded.root).unwrap();
    matrix[3][0] = 4.0;
    matrix[3][2] = -1.5;
    scene.set_matrix_basis(loaded.root, matrix).unwrap();
    let rig = scene.object_by_name("hero_rigMain_01:rig").unwrap();
    scene.set_action(rig, Some("shot010_anim".into())).unwrap();

    let repr2 = representation("r2", &v2);
    let first = loader.exec_update(&mut scene, &loaded.metadata, &repr2).unwrap();
    assert_eq!(first, UpdateOutcome::Updated);
    assert_eq!(scene.link_count(&key(&v2)), 1);

    let root = scene.object_by_name("hero_rigMain_01").unwrap();
    assert_eq!(root, loaded.root);
    let rig = scene.object_by_name("hero_rigMain_01:rig").unwrap();
    let action_before = scene.action(rig).unwrap();
    let matrix_before = scene.matrix_basis(root).unwrap();
    assert_eq!(action_before.as_deref(), Some("shot010_anim"));
    assert_eq!(matrix_before, matrix);
    assert!(scene.object_by_name("hero_rigMain_01:eyes").is_some());

    let second = loader.exec_update(&mut scene, &loaded.metadata, &repr2).unwrap();
    assert_eq!(second, UpdateOutcome::AlreadyUpToDate);
    assert_eq!(scene.link_count(&key(&v2)), 1);
    assert_eq!(scene.object_by_name("hero_rigMain_01"), Some(root));
    assert_eq!(scene.matrix_basis(root).unwrap(), matrix_before);
    let rig = scene.object_by_name("hero_rigMain_01:rig").unwrap();
    assert_eq!(scene.action(rig).unwrap(), action_before);
    assert!(scene.orphans().is_empty());
}

#[test]
fn update_rewrites_container_metadata() {
    let dir = TempDir::new().unwrap();
    let (mut scene, v1, v2) = scene_with_versions(&dir);
    let plugins = PluginRegistry::init(&LoaderSettings::default());
    let loader = AssetLoader::by_name(&plugins, "BlendRigLoader").unwrap();
    let loaded = load(&mut scene, &plugins, &v1);

    loader
        .exec_update(&mut scene, &loaded.metadata, &representation("r2", &v2))
        .unwrap();

    let entries = pype_loader::registry::ls(&scene).unwrap();
    assert_eq!(entries.len(), 1);
    let meta = &entries[0].metadata;
    assert_eq!(meta.libpath, key(&v2));
    assert_eq!(meta.representation, "r2");
    assert_eq!(meta.parent, "version_of_r2");
    assert_eq!(meta.object_name, loaded.metadata.object_name);
    assert_eq!(meta.namespace, loaded.metadata.namespace);
}

#[rstest]
#[case(2)]
#[case(3)]
fn shared_library_unloads_with_last_remove(#[case] containers: usize) {
    let dir = TempDir::new().unwrap();
    let (mut scene, v1, _) = scene_with_versions(&dir);
    let plugins = PluginRegistry::init(&LoaderSettings::default());
    let loader = AssetLoader::by_name(&plugins, "BlendRigLoader").unwrap();
    let loaded: Vec<_> = (0..containers)
        .map(|_| load(&mut scene, &plugins, &v1))
        .collect();
    assert_eq!(count_library_users(&scene, &key(&v1)).unwrap(), containers);

    let (last, rest) = loaded.split_last().unwrap();
    for container in rest {
        assert!(loader.exec_remove(&mut scene, &container.metadata).unwrap());
        assert!(scene.library_loaded(&key(&v1)));
    }
    assert!(loader.exec_remove(&mut scene, &last.metadata).unwrap());
    assert!(!scene.library_loaded(&key(&v1)));
    assert!(scene.objects().is_empty(), "left: {:?}", scene.objects());
}

#[test]
fn shared_library_unloads_with_last_update() {
    let dir = TempDir::new().unwrap();
    let (mut scene, v1, v2) = scene_with_versions(&dir);
    let plugins = PluginRegistry::init(&LoaderSettings::default());
    let loader = AssetLoader::by_name(&plugins, "BlendRigLoader").unwrap();
    let a = load(&mut scene, &plugins, &v1);
    let b = load(&mut scene, &plugins, &v1);
    let repr2 = representation("r2", &v2);

    loader.exec_update(&mut scene, &a.metadata, &repr2).unwrap();
    assert!(scene.library_loaded(&key(&v1)));
    loader.exec_update(&mut scene, &b.metadata, &repr2).unwrap();
    assert!(!scene.library_loaded(&key(&v1)));
    assert!(scene.library_loaded(&key(&v2)));
}

#[test]
fn removing_twice_reports_missing_root() {
    let dir = TempDir::new().unwrap();
    let (mut scene, v1, _) = scene_with_versions(&dir);
    let plugins = PluginRegistry::init(&LoaderSettings::default());
    let loader = AssetLoader::by_name(&plugins, "BlendRigLoader").unwrap();
    let loaded = load(&mut scene, &plugins, &v1);

    assert!(loader.exec_remove(&mut scene, &loaded.metadata).unwrap());
    assert!(!loader.exec_remove(&mut scene, &loaded.metadata).unwrap());
}

#[test]
fn update_preconditions_are_checked() {
    let dir = TempDir::new().unwrap();
    let (mut scene, v1, v2) = scene_with_versions(&dir);
    let plugins = PluginRegistry::init(&LoaderSettings::default());
    let loader = AssetLoader::by_name(&plugins, "BlendRigLoader").unwrap();
    let loaded = load(&mut scene, &plugins, &v1);

    let mut gone = loaded.metadata.clone();
    gone.object_name = "other_rigMain_01".into();
    let err = loader
        .exec_update(&mut scene, &gone, &representation("r2", &v2))
        .unwrap_err();
    assert!(matches!(err, LoaderError::ContainerNotLoaded(_)));

    let missing = dir.path().join("rigMain_v009.blend");
    let err = loader
        .exec_update(&mut scene, &loaded.metadata, &representation("r9", &missing))
        .unwrap_err();
    assert!(matches!(err, LoaderError::MissingFile(_)));

    let text = touch(&dir, "notes.txt");
    let err = loader
        .exec_update(&mut scene, &loaded.metadata, &representation("r3", &text))
        .unwrap_err();
    assert!(matches!(err, LoaderError::UnsupportedExtension(_)));

    let mut no_path = representation("r4", &v2);
    no_path.data.path.clear();
    let err = loader
        .exec_update(&mut scene, &loaded.metadata, &no_path)
        .unwrap_err();
    assert!(matches!(err, LoaderError::IncompleteRepresentation { field: "data.path", .. }));

    // nothing was touched
    assert_eq!(scene.link_count(&key(&v1)), 1);
    assert!(scene.object_by_name("hero_rigMain_01:rig").is_some());
}

#[test]
fn update_to_library_without_container_keeps_current_content() {
    let dir = TempDir::new().unwrap();
    let (mut scene, v1, _) = scene_with_versions(&dir);
    let loose = touch(&dir, "rigMain_v003.blend");
    scene.register_library(
        &loose,
        LibrarySource::new().object(SourceObject::new("loose", ObjectKind::Mesh)),
    );
    let plugins = PluginRegistry::init(&LoaderSettings::default());
    let loader = AssetLoader::by_name(&plugins, "BlendRigLoader").unwrap();
    let loaded = load(&mut scene, &plugins, &v1);
    let children = scene.children(loaded.root).unwrap();

    let err = loader
        .exec_update(&mut scene, &loaded.metadata, &representation("r3", &loose))
        .unwrap_err();
    assert!(matches!(err, LoaderError::SourceContainerMissing(_)));

    assert_eq!(scene.children(loaded.root).unwrap(), children);
    assert!(scene.object_by_name("hero_rigMain_01:rig").is_some());
    assert!(scene.library_loaded(&key(&v1)));
    assert!(!scene.library_loaded(&key(&loose)));
    assert_eq!(metadata_of(&scene, loaded.root).unwrap().libpath, key(&v1));

    let retry = loader
        .exec_update(&mut scene, &loaded.metadata, &representation("r1", &v1))
        .unwrap();
    assert_eq!(retry, UpdateOutcome::AlreadyUpToDate);
    assert_eq!(scene.children(loaded.root).unwrap(), children);
}

#[test]
fn diff_previews_added_objects_without_mutation() {
    let dir = TempDir::new().unwrap();
    let (mut scene, v1, v2) = scene_with_versions(&dir);
    let plugins = PluginRegistry::init(&LoaderSettings::default());
    let loader = AssetLoader::by_name(&plugins, "BlendRigLoader").unwrap();
    let loaded = load(&mut scene, &plugins, &v1);
    let before = scene.objects();

    let diff = diff_container(&scene, loader.profile(), &loaded.metadata, &v2).unwrap();

    assert_eq!(diff.added, vec!["eyes".to_string()]);
    assert!(diff.removed.is_empty());
    assert_eq!(diff.kept, vec!["body", "cable", "ctrl", "rig"]);
    assert!(!diff.is_empty());
    assert!(diff.unified(&key(&v2)).contains("+eyes"));
    assert_eq!(scene.objects(), before);

    let same = diff_container(&scene, loader.profile(), &loaded.metadata, &v1).unwrap();
    assert!(same.is_empty());
}
