use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::str::contains;
use serde_json::{json, Value};
use tempfile::TempDir;

use pype_core::store::{DocumentStore, Filter};
use pype_core::{DocId, MemoryStore};
use pype_ftrack::MemoryTracker;

const PROJECT: &str = "demo";

fn pype_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("pype"));
    cmd.env("HOME", home).env("USERPROFILE", home);
    cmd
}

fn store_path(home: &TempDir) -> PathBuf {
    home.path().join(".pype").join("store.json")
}

fn write_store(home: &TempDir, docs: Vec<Value>) -> PathBuf {
    let path = store_path(home);
    fs::create_dir_all(path.parent().expect("store dir")).expect("create .pype");
    let mut store = MemoryStore::new();
    for doc in docs {
        store.insert_one(PROJECT, doc).expect("insert");
    }
    store.save_at(&path).expect("save store");
    path
}

fn load_doc(path: &Path, id: &str) -> Value {
    MemoryStore::load_at(path)
        .expect("load store")
        .find_one(PROJECT, &Filter::by_id(&DocId::from(id)))
        .expect("query")
        .expect("doc exists")
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout json")
}

fn representation(id: &str, asset: &str, sites: Value) -> Value {
    json!({
        "_id": id,
        "type": "representation",
        "parent": "v1",
        "name": "abc",
        "context": {"asset": asset, "subset": "modelMain", "version": 3, "representation": "abc"},
        "files": [{"path": format!("/{asset}/model.abc"), "size": 2048, "sites": sites}],
    })
}

fn sync_docs() -> Vec<Value> {
    let done = |site: &str| json!({"name": site, "created_dt": "2024-01-01T00:00:00Z"});
    vec![
        representation("r1", "chair", json!([done("studio"), done("gdrive")])),
        representation("r2", "table", json!([done("studio")])),
        representation(
            "r3",
            "lamp",
            json!([done("studio"), {"name": "gdrive", "tries": 5, "error": "timeout"}]),
        ),
    ]
}

fn asset(id: &str, name: &str, ftrack_id: &str, parent: Option<&str>, parents: &[&str]) -> Value {
    json!({
        "_id": id,
        "type": "asset",
        "schema": "openpype:asset-3.0",
        "name": name,
        "parent": "proj",
        "data": {
            "ftrackId": ftrack_id,
            "visualParent": parent,
            "parents": parents,
            "hierarchy": parents.join("/"),
            "tasks": {},
        },
    })
}

fn hierarchy_docs() -> Vec<Value> {
    vec![
        json!({"_id": "proj", "type": "project", "name": PROJECT, "data": {"ftrackId": "p"}}),
        asset("sq1", "sq01", "e_sq1", None, &[]),
        asset("sh010", "sh010", "e_sh010", Some("sq1"), &["sq01"]),
        asset("sq2", "sq02", "e_sq2", None, &[]),
        json!({"_id": "sub1", "type": "subset", "name": "modelMain", "parent": "sh010"}),
    ]
}

#[test]
fn status_json_lists_rows_with_derived_status() {
    let home = TempDir::new().expect("home");
    write_store(&home, sync_docs());

    let assert = pype_cmd(home.path())
        .args(["status", "--project", PROJECT, "--sort", "asset", "--json"])
        .assert()
        .success();
    let payload = stdout_json(assert.get_output());

    assert_eq!(payload["summary"]["representations"], 3);
    assert_eq!(payload["summary"]["pages"], 1);
    let rows = payload["representations"].as_array().expect("rows");
    let found: Vec<(&str, &str)> = rows
        .iter()
        .map(|r| (r["asset"].as_str().unwrap(), r["status"].as_str().unwrap()))
        .collect();
    assert_eq!(
        found,
        vec![("chair", "synced_ok"), ("lamp", "failed"), ("table", "queued")]
    );
}

#[test]
fn status_filters_by_status() {
    let home = TempDir::new().expect("home");
    write_store(&home, sync_docs());

    let assert = pype_cmd(home.path())
        .args(["status", "--project", PROJECT, "--status", "queued", "--json"])
        .assert()
        .success();
    let payload = stdout_json(assert.get_output());
    let rows = payload["representations"].as_array().expect("rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["id"], "r2");
}

#[test]
fn status_table_shows_labels() {
    let home = TempDir::new().expect("home");
    write_store(&home, sync_docs());

    pype_cmd(home.path())
        .args(["status", "--project", PROJECT])
        .assert()
        .success()
        .stdout(contains("Synced OK"))
        .stdout(contains("Failed"))
        .stdout(contains("v003"))
        .stdout(contains("2.0 KB"));
}

#[test]
fn unknown_status_is_rejected() {
    let home = TempDir::new().expect("home");
    write_store(&home, sync_docs());

    pype_cmd(home.path())
        .args(["status", "--project", PROJECT, "--status", "done"])
        .assert()
        .failure()
        .stderr(contains("done"));
}

#[test]
fn priority_is_saved_to_store() {
    let home = TempDir::new().expect("home");
    let path = write_store(&home, sync_docs());

    let assert = pype_cmd(home.path())
        .args(["status", "--project", PROJECT, "--representation", "r2", "--priority", "80", "--json"])
        .assert()
        .success();
    let files = stdout_json(assert.get_output());
    assert_eq!(files[0]["priority"], 80);

    let doc = load_doc(&path, "r2");
    assert_eq!(doc["files"][0]["sites"][0]["priority"], 80);
}

#[test]
fn explicit_store_flag_overrides_home() {
    let home = TempDir::new().expect("home");
    let elsewhere = TempDir::new().expect("elsewhere");
    let path = elsewhere.path().join("docs.json");
    let mut store = MemoryStore::new();
    for doc in sync_docs() {
        store.insert_one(PROJECT, doc).expect("insert");
    }
    store.save_at(&path).expect("save");

    let assert = pype_cmd(home.path())
        .arg("--store")
        .arg(&path)
        .args(["status", "--project", PROJECT, "--json"])
        .assert()
        .success();
    assert_eq!(stdout_json(assert.get_output())["summary"]["representations"], 3);
}

#[test]
fn changeability_lists_protected_assets() {
    let home = TempDir::new().expect("home");
    write_store(&home, hierarchy_docs());

    let assert = pype_cmd(home.path())
        .args(["changeability", "--project", PROJECT, "--json"])
        .assert()
        .success();
    let payload = stdout_json(assert.get_output());

    assert_eq!(payload["changeable"], 1);
    let entries = payload["unchangeable"].as_array().expect("entries");
    let reason = |id: &str| {
        entries
            .iter()
            .find(|e| e["id"] == id)
            .map(|e| e["reason"].as_str().unwrap().to_owned())
    };
    assert_eq!(reason("proj").as_deref(), Some("project root"));
    assert_eq!(reason("sh010").as_deref(), Some("contains published data"));
    assert_eq!(reason("sq1").as_deref(), Some("a child contains published data"));
    assert_eq!(reason("sq2"), None);
}

#[test]
fn update_metadata_records_datablocks() {
    let home = TempDir::new().expect("home");
    let path = write_store(
        &home,
        vec![json!({"_id": "r9", "type": "representation", "name": "blend"})],
    );

    pype_cmd(home.path())
        .args([
            "update-metadata", "--project", PROJECT, "--subset", "rigMain", "--datablocks", "rig",
            "body", "--datapaths", "objects", "meshes", "--representation", "r9",
        ])
        .assert()
        .success();

    let doc = load_doc(&path, "r9");
    assert_eq!(doc["data"]["subset"], "rigMain");
    assert_eq!(doc["data"]["datablocks"][0], json!({"name": "rig", "path": "objects"}));
    assert_eq!(doc["data"]["datablocks"][1], json!({"name": "body", "path": "meshes"}));
}

#[test]
fn update_metadata_fails_for_unknown_representation() {
    let home = TempDir::new().expect("home");
    write_store(&home, vec![]);

    pype_cmd(home.path())
        .args([
            "update-metadata", "--project", PROJECT, "--subset", "rigMain", "--datablocks", "rig",
            "--datapaths", "objects", "--representation", "missing",
        ])
        .assert()
        .failure()
        .stderr(contains("not found"));
}

#[test]
fn update_metadata_rejects_mismatched_lists() {
    let home = TempDir::new().expect("home");
    write_store(
        &home,
        vec![json!({"_id": "r9", "type": "representation", "name": "blend"})],
    );

    pype_cmd(home.path())
        .args([
            "update-metadata", "--project", PROJECT, "--subset", "rigMain", "--datablocks", "rig",
            "body", "--datapaths", "objects", "--representation", "r9",
        ])
        .assert()
        .failure();
}

fn write_tracker(home: &TempDir, renamed_to: &str) -> PathBuf {
    let tracker = MemoryTracker::new("p", PROJECT)
        .with_entity("e_sq1", "Sequence", "sq01", "p")
        .with_entity("e_sh010", "Shot", "sh010", "e_sq1")
        .with_entity("e_sq2", "Sequence", renamed_to, "p");
    let path = home.path().join("tracker.json");
    fs::write(&path, serde_json::to_string(&tracker).expect("tracker json")).expect("write");
    path
}

fn write_rename_event(home: &TempDir, id: &str, entity_type: &str, old: &str, new: &str) -> PathBuf {
    let event = json!({"entities": [{
        "entityType": "task",
        "entity_type": entity_type,
        "action": "update",
        "entityId": id,
        "parentId": "p",
        "keys": ["name"],
        "changes": {"name": {"old": old, "new": new}},
    }]});
    let path = home.path().join("event.json");
    fs::write(&path, event.to_string()).expect("write event");
    path
}

#[test]
fn sync_event_applies_rename() {
    let home = TempDir::new().expect("home");
    let store = write_store(&home, hierarchy_docs());
    let tracker = write_tracker(&home, "sq03");
    let event = write_rename_event(&home, "e_sq2", "Sequence", "sq02", "sq03");

    pype_cmd(home.path())
        .args(["sync-event", "--project", PROJECT, "--tracker"])
        .arg(&tracker)
        .arg(&event)
        .assert()
        .success();

    assert_eq!(load_doc(&store, "sq2")["name"], "sq03");
}

#[test]
fn sync_event_dry_run_saves_nothing() {
    let home = TempDir::new().expect("home");
    let store = write_store(&home, hierarchy_docs());
    let tracker = write_tracker(&home, "sq03");
    let event = write_rename_event(&home, "e_sq2", "Sequence", "sq02", "sq03");

    pype_cmd(home.path())
        .args(["sync-event", "--dry-run", "--project", PROJECT, "--tracker"])
        .arg(&tracker)
        .arg(&event)
        .assert()
        .success()
        .stdout(contains("Dry run"));

    assert_eq!(load_doc(&store, "sq2")["name"], "sq02");
}

#[test]
fn sync_event_reverts_rename_of_published_asset() {
    let home = TempDir::new().expect("home");
    write_store(&home, hierarchy_docs());
    let tracker_path = write_tracker(&home, "sq02");
    let mut tracker: MemoryTracker =
        serde_json::from_str(&fs::read_to_string(&tracker_path).expect("read")).expect("parse");
    tracker.get_mut("e_sq1").expect("e_sq1").name = "sq99".into();
    fs::write(&tracker_path, serde_json::to_string(&tracker).expect("json")).expect("write");
    let event = write_rename_event(&home, "e_sq1", "Sequence", "sq01", "sq99");

    pype_cmd(home.path())
        .args(["sync-event", "--project", PROJECT, "--tracker"])
        .arg(&tracker_path)
        .arg(&event)
        .assert()
        .success()
        .stdout(contains("Entity renamed back"));

    let tracker: MemoryTracker =
        serde_json::from_str(&fs::read_to_string(&tracker_path).expect("read")).expect("parse");
    assert_eq!(tracker.get("e_sq1").expect("e_sq1").name, "sq01");
}
