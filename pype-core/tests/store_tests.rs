//! Document store integration tests: typed access, batches, persistence.

use assert_fs::prelude::*;
use predicates::prelude::*;
use pype_core::types::{AssetData, AssetDoc, DocId, DocType};
use pype_core::{DocumentStore, DocumentStoreExt, Filter, MemoryStore, Update, WriteOp};
use serde_json::json;

const PROJECT: &str = "demo";

fn asset(id: &str, name: &str, parent: Option<&str>) -> AssetDoc {
    AssetDoc {
        id: DocId::from(id),
        doc_type: DocType::Asset,
        schema: pype_core::types::ASSET_SCHEMA.into(),
        name: name.into(),
        parent: DocId::from("p1"),
        data: AssetData {
            visual_parent: parent.map(DocId::from),
            ..Default::default()
        },
    }
}

#[test]
fn typed_insert_and_find() {
    let mut store = MemoryStore::new();
    store.insert_as(PROJECT, &asset("a1", "sq01", None)).unwrap();
    store.insert_as(PROJECT, &asset("a2", "sh010", Some("a1"))).unwrap();

    let children: Vec<AssetDoc> = store
        .find_as(PROJECT, &Filter::new().eq("data.visualParent", "a1"))
        .unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].name, "sh010");

    let root: Option<AssetDoc> = store
        .find_one_as(PROJECT, &Filter::new().eq("data.visualParent", serde_json::Value::Null))
        .unwrap();
    assert_eq!(root.map(|a| a.name), Some("sq01".to_string()));
}

#[test]
fn projects_are_isolated() {
    let mut store = MemoryStore::new();
    store.insert_as("one", &asset("a1", "sq01", None)).unwrap();
    assert_eq!(store.count_documents("two", &Filter::new()).unwrap(), 0);
    assert_eq!(store.project_names(), vec!["one".to_string()]);
}

#[test]
fn update_many_flips_type() {
    let mut store = MemoryStore::new();
    store.insert_as(PROJECT, &asset("a1", "sq01", None)).unwrap();
    store.insert_as(PROJECT, &asset("a2", "sh010", Some("a1"))).unwrap();
    let n = store
        .update_many(
            PROJECT,
            &Filter::new().any_of("_id", ["a1", "a2"]),
            &Update::new().set("type", DocType::ArchivedAsset),
        )
        .unwrap();
    assert_eq!(n, 2);
    let archived: Vec<AssetDoc> = store
        .find_as(PROJECT, &Filter::new().eq("type", "archived_asset"))
        .unwrap();
    assert!(archived.iter().all(AssetDoc::is_archived));
}

#[test]
fn bulk_write_applies_in_order() {
    let mut store = MemoryStore::new();
    let result = store
        .bulk_write(
            PROJECT,
            vec![
                WriteOp::InsertOne(json!({"_id": "r1", "name": "blend"})),
                WriteOp::UpdateOne {
                    filter: Filter::by_id(&DocId::from("r1")),
                    update: Update::new().set("data.path", "/p/a.blend"),
                },
                WriteOp::ReplaceOne {
                    filter: Filter::by_id(&DocId::from("r1")),
                    doc: json!({"_id": "r1", "name": "abc"}),
                },
            ],
        )
        .unwrap();
    assert_eq!((result.inserted, result.updated, result.replaced), (1, 1, 1));
    let doc = store.find_one(PROJECT, &Filter::new()).unwrap().unwrap();
    assert_eq!(doc, json!({"_id": "r1", "name": "abc"}));
}

#[test]
fn save_writes_pretty_json_file() {
    let tmp = assert_fs::TempDir::new().expect("tempdir");
    let mut store = MemoryStore::new();
    store.insert_as(PROJECT, &asset("a1", "sq01", None)).unwrap();
    store.save_at(&tmp.path().join("store.json")).unwrap();

    tmp.child("store.json")
        .assert(predicate::str::contains("\"sq01\""));
    tmp.child("store.json.tmp").assert(predicate::path::missing());

    let missing = MemoryStore::load_at(&tmp.path().join("absent.json")).unwrap();
    assert_eq!(missing, MemoryStore::new());
}
