use serde_json::{json, Value};

use pype_core::settings::SyncServerSettings;
use pype_core::store::{DocumentStore, Filter};
use pype_core::{DocId, MemoryStore};
use pype_syncserver::{
    RowFilter, SitePair, SortColumn, SortOrder, SyncRepresentationModel, SyncServerError,
    SyncStatus,
};

const PROJECT: &str = "demo";

fn repre(id: &str, asset: &str, subset: &str, name: &str, files: Value) -> Value {
    json!({
        "_id": id,
        "type": "representation",
        "parent": "v1",
        "name": name,
        "files": files,
        "context": {"asset": asset, "subset": subset, "version": 1, "representation": name},
    })
}

fn file(path: &str, size: u64, sites: Value) -> Value {
    json!({"path": path, "size": size, "sites": sites})
}

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn store() -> MemoryStore {
    init_logger();
    let done = |site: &str, at: &str| json!({"name": site, "created_dt": at});
    let docs = [
        repre(
            "r1",
            "chair",
            "modelMain",
            "abc",
            json!([
                file("/chair/a.abc", 10, json!([done("studio", "2024-01-01T00:00:00Z"),
                                                {"name": "gdrive", "progress": 0.5}])),
                file("/chair/b.abc", 20, json!([done("studio", "2024-01-01T00:00:00Z"),
                                                done("gdrive", "2024-01-05T00:00:00Z")])),
            ]),
        ),
        repre(
            "r2",
            "table",
            "modelMain",
            "ma",
            json!([file("/table/a.ma", 5, json!([done("studio", "2024-01-01T00:00:00Z"),
                                                 done("gdrive", "2024-03-01T00:00:00Z")]))]),
        ),
        repre(
            "r3",
            "lamp",
            "rigMain",
            "blend",
            json!([file("/lamp/rig.blend", 5, json!([done("studio", "2024-01-01T00:00:00Z"),
                                                     {"name": "gdrive", "paused": true}]))]),
        ),
        repre(
            "r4",
            "lamp",
            "lookMain",
            "ma",
            json!([file("/lamp/look.ma", 5, json!([
                done("studio", "2024-01-01T00:00:00Z"),
                {"name": "gdrive", "tries": 3, "last_failed_dt": "2024-02-01T00:00:00Z",
                 "error": "quota exceeded"},
            ]))]),
        ),
        repre(
            "r5",
            "sofa",
            "modelMain",
            "abc",
            json!([file("/sofa/a.abc", 5, json!([done("studio", "2024-01-01T00:00:00Z")]))]),
        ),
        repre(
            "r6",
            "desk",
            "modelMain",
            "abc",
            json!([file("/desk/a.abc", 5, json!([done("other", "2024-01-01T00:00:00Z")]))]),
        ),
        repre("r7", "desk", "modelMain", "ma", json!([])),
    ];
    let mut store = MemoryStore::new();
    for doc in docs {
        store.insert_one(PROJECT, doc).unwrap();
    }
    store
}

fn model(store: &MemoryStore) -> SyncRepresentationModel {
    let settings = SyncServerSettings {
        page_size: 2,
        ..SyncServerSettings::default()
    };
    let mut model =
        SyncRepresentationModel::new(PROJECT, SitePair::new("studio", "gdrive"), settings);
    model.refresh(store).unwrap();
    model
}

fn ids(rows: &[&pype_syncserver::RepresentationSummary]) -> Vec<String> {
    rows.iter().map(|r| r.id.to_string()).collect()
}

#[test]
fn rows_carry_derived_status() {
    let store = store();
    let model = model(&store);
    let rows = model.rows();
    let status = |id: &str| rows.iter().find(|r| r.id.as_str() == id).unwrap().status;

    assert_eq!(rows.len(), 5);
    assert_eq!(status("r1"), SyncStatus::InProgress);
    assert_eq!(status("r2"), SyncStatus::SyncedOk);
    assert_eq!(status("r3"), SyncStatus::Paused);
    assert_eq!(status("r4"), SyncStatus::Failed);
    assert_eq!(status("r5"), SyncStatus::Queued);

    let chair = rows.iter().find(|r| r.id.as_str() == "r1").unwrap();
    assert_eq!(chair.files_count, 2);
    assert_eq!(chair.files_size, 30);
    assert_eq!(chair.local.avg_progress, 1.0);
    assert_eq!(chair.remote.avg_progress, 0.75);
    assert_eq!(chair.priority, 50);
}

#[test]
fn default_order_is_latest_remote_first() {
    let store = store();
    let model = model(&store);
    assert_eq!(ids(&model.rows()), vec!["r2", "r4", "r1", "r3", "r5"]);
}

#[test]
fn previous_sort_breaks_ties() {
    let store = store();
    let mut model = model(&store);
    model.sort_by(SortColumn::Asset, SortOrder::Ascending);
    assert_eq!(ids(&model.rows()), vec!["r1", "r4", "r3", "r5", "r2"]);
}

#[test]
fn filters_by_status_and_text() {
    let store = store();
    let mut model = model(&store);
    model.set_filter(RowFilter {
        statuses: [SyncStatus::Queued, SyncStatus::Failed].into(),
        text: None,
    });
    let mut found = ids(&model.rows());
    found.sort();
    assert_eq!(found, vec!["r4", "r5"]);

    model.set_filter(RowFilter {
        statuses: Default::default(),
        text: Some("LAMP".into()),
    });
    let mut found = ids(&model.rows());
    found.sort();
    assert_eq!(found, vec!["r3", "r4"]);
}

#[test]
fn pages_split_rows() {
    let store = store();
    let model = model(&store);
    assert_eq!(model.page_count(), 3);
    assert_eq!(ids(&model.page(0)), vec!["r2", "r4"]);
    assert_eq!(model.page(2).len(), 1);
    assert!(model.page(3).is_empty());
}

#[test]
fn file_details_list_errors() {
    let store = store();
    let model = model(&store);
    let files = model.details(&store, &DocId::from("r4")).unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].errors, vec!["quota exceeded"]);
    assert_eq!(files[0].status, SyncStatus::Failed);

    let files = model.details(&store, &DocId::from("r1")).unwrap();
    assert_eq!(files[0].status, SyncStatus::InProgress);
    assert_eq!(files[1].status, SyncStatus::SyncedOk);
}

#[test]
fn priority_is_written_to_local_site() {
    let mut store = store();
    let mut model = model(&store);
    model
        .set_priority(&mut store, &DocId::from("r5"), 90)
        .unwrap();

    let row = model.rows().into_iter().find(|r| r.id.as_str() == "r5").unwrap();
    assert_eq!(row.priority, 90);
    let doc = store
        .find_one(PROJECT, &Filter::by_id(&DocId::from("r5")))
        .unwrap()
        .unwrap();
    assert_eq!(doc["files"][0]["sites"][0]["priority"], 90);
}

#[test]
fn unknown_representation_is_an_error() {
    let store = store();
    let model = model(&store);
    let err = model.details(&store, &DocId::from("missing")).unwrap_err();
    assert!(matches!(err, SyncServerError::RepresentationNotFound(_)));
}
