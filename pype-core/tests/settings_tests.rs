//! Settings loading: defaults, overrides, parse and validation errors.

use assert_fs::prelude::*;
use rstest::rstest;
use pype_core::{settings, SettingsError, UnchangeableRemovePolicy};

#[test]
fn missing_file_yields_defaults() {
    let tmp = assert_fs::TempDir::new().expect("tempdir");
    let loaded = settings::load_at(&tmp.path().join("pipeline.yaml")).expect("load");
    assert_eq!(loaded.sync_server.max_tries, 3);
    assert_eq!(loaded.sync_server.default_priority, 50);
    assert_eq!(
        loaded.loader.valid_extensions,
        vec![".blend", ".json", ".abc", ".fbx"]
    );
    assert_eq!(
        loaded.ftrack.unchangeable_remove_policy,
        UnchangeableRemovePolicy::Recreate
    );
}

#[test]
fn partial_file_overrides_only_named_keys() {
    let tmp = assert_fs::TempDir::new().expect("tempdir");
    let file = tmp.child("pipeline.yaml");
    file.write_str(
        "hero:\n  ignored_representation_names: [thumbnail]\n\
         ftrack:\n  unchangeable_remove_policy: report_only\n\
         sync_server:\n  max_tries: 5\n",
    )
    .expect("write");

    let loaded = settings::load_at(file.path()).expect("load");
    assert!(loaded.hero.is_ignored("THUMBNAIL"));
    assert_eq!(loaded.sync_server.max_tries, 5);
    assert_eq!(loaded.sync_server.page_size, 20);
    assert_eq!(
        loaded.ftrack.unchangeable_remove_policy,
        UnchangeableRemovePolicy::ReportOnly
    );
    assert_eq!(loaded.ftrack.ignore_keys, vec!["statusid", "thumbid"]);
}

#[test]
fn empty_file_yields_defaults() {
    let tmp = assert_fs::TempDir::new().expect("tempdir");
    let file = tmp.child("pipeline.yaml");
    file.write_str("").expect("write");
    let loaded = settings::load_at(file.path()).expect("load");
    assert_eq!(loaded, pype_core::PipelineSettings::default());
}

#[test]
fn corrupt_yaml_reports_path() {
    let tmp = assert_fs::TempDir::new().expect("tempdir");
    let file = tmp.child("pipeline.yaml");
    file.write_str("hero: [unclosed").expect("write");

    let err = settings::load_at(file.path()).unwrap_err();
    assert!(matches!(err, SettingsError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains("pipeline.yaml"));
}

#[rstest]
#[case::extension_without_dot("loader:\n  valid_extensions: [blend]\n", "loader.valid_extensions")]
#[case::zero_tries("sync_server:\n  max_tries: 0\n", "sync_server.max_tries")]
#[case::zero_page_size("sync_server:\n  page_size: 0\n", "sync_server.page_size")]
#[case::empty_name_pattern(
    "ftrack:\n  name_patterns:\n    asset: ''\n",
    "ftrack.name_patterns.asset"
)]
fn invalid_values_are_rejected(#[case] yaml: &str, #[case] expected_key: &str) {
    let tmp = assert_fs::TempDir::new().expect("tempdir");
    let file = tmp.child("pipeline.yaml");
    file.write_str(yaml).expect("write");

    let err = settings::load_at(file.path()).unwrap_err();
    match err {
        SettingsError::Invalid { key, .. } => assert_eq!(key, expected_key),
        other => panic!("expected an invalid setting, got: {other}"),
    }
}
