//! Document store adapter.
//!
//! The pipeline talks to its database through [`DocumentStore`]: a
//! per-project collection of JSON documents keyed by `_id`, queried with
//! equality [`Filter`]s and mutated with `$set`-style [`Update`]s.
//!
//! [`MemoryStore`] is the shipped implementation. It keeps every project in
//! memory and persists to a single JSON file with the same `.tmp` + rename
//! pattern the settings loader uses, so a crash mid-save leaves the previous
//! file intact.
//!
//! `bulk_write` is all-or-nothing in [`MemoryStore`]: operations are applied
//! to a staged copy of the collection which replaces the live one only when
//! every operation succeeded.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{io_err, StoreError};
use crate::types::DocId;

// ---------------------------------------------------------------------------
// 1. Filters and updates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Clause {
    Eq(String, Value),
    In(String, Vec<Value>),
}

/// Conjunction of equality / membership clauses over dotted keys.
///
/// An `Eq(key, Null)` clause matches documents where the key is missing or
/// explicitly `null`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    clauses: Vec<Clause>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter matching the document with `_id == id`.
    pub fn by_id(id: &DocId) -> Self {
        Self::new().eq("_id", id)
    }

    pub fn eq(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses.push(Clause::Eq(key.into(), value.into()));
        self
    }

    pub fn any_of<V: Into<Value>>(
        mut self,
        key: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.clauses.push(Clause::In(
            key.into(),
            values.into_iter().map(Into::into).collect(),
        ));
        self
    }

    pub fn matches(&self, doc: &Value) -> bool {
        self.clauses.iter().all(|clause| match clause {
            Clause::Eq(key, expected) => match lookup(doc, key) {
                Some(found) => found == expected,
                None => expected.is_null(),
            },
            Clause::In(key, options) => lookup(doc, key)
                .map(|found| options.iter().any(|o| o == found))
                .unwrap_or(false),
        })
    }
}

/// `$set` update over dotted keys. Intermediate objects are created on demand.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    set: BTreeMap<String, Value>,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.set.insert(key.into(), value.into());
    }

    /// Flatten a nested change map into dotted `$set` keys.
    ///
    /// `{"data": {"visualParent": "x"}, "name": "y"}` becomes
    /// `{"data.visualParent": "x", "name": "y"}`.
    pub fn from_nested(changes: &Map<String, Value>) -> Self {
        let mut update = Self::new();
        flatten_into(&mut update.set, "", changes);
        update
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.set.iter()
    }

    /// Merge another update into this one; keys in `other` win.
    pub fn merge(&mut self, other: Update) {
        self.set.extend(other.set);
    }

    pub fn apply(&self, doc: &mut Value) {
        for (key, value) in &self.set {
            set_path(doc, key, value.clone());
        }
    }
}

fn flatten_into(out: &mut BTreeMap<String, Value>, prefix: &str, map: &Map<String, Value>) {
    for (key, value) in map {
        let full = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::Object(inner) if !inner.is_empty() => flatten_into(out, &full, inner),
            other => {
                out.insert(full, other.clone());
            }
        }
    }
}

/// Resolve a dotted key (`data.visualParent`) inside a JSON document.
pub fn lookup<'a>(doc: &'a Value, key: &str) -> Option<&'a Value> {
    let mut current = doc;
    for part in key.split('.') {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn set_path(doc: &mut Value, key: &str, value: Value) {
    let mut current = doc;
    let mut parts = key.split('.').peekable();
    while let Some(part) = parts.next() {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let Value::Object(map) = current else {
            return;
        };
        if parts.peek().is_none() {
            map.insert(part.to_owned(), value);
            return;
        }
        current = map
            .entry(part.to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}

// ---------------------------------------------------------------------------
// 2. Store trait
// ---------------------------------------------------------------------------

/// A single staged write of a [`DocumentStore::bulk_write`] batch.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    InsertOne(Value),
    ReplaceOne { filter: Filter, doc: Value },
    UpdateOne { filter: Filter, update: Update },
    DeleteOne { filter: Filter },
}

/// Counts reported by a committed batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkWriteResult {
    pub inserted: usize,
    pub replaced: usize,
    pub updated: usize,
    pub deleted: usize,
}

/// Project-scoped document collection.
pub trait DocumentStore {
    fn find(&self, project: &str, filter: &Filter) -> Result<Vec<Value>, StoreError>;

    fn find_one(&self, project: &str, filter: &Filter) -> Result<Option<Value>, StoreError> {
        Ok(self.find(project, filter)?.into_iter().next())
    }

    fn count_documents(&self, project: &str, filter: &Filter) -> Result<usize, StoreError> {
        Ok(self.find(project, filter)?.len())
    }

    /// Insert a document. A missing `_id` is generated; the id is returned.
    fn insert_one(&mut self, project: &str, doc: Value) -> Result<DocId, StoreError>;

    /// Apply `update` to the first matching document. Returns whether a
    /// document matched.
    fn update_one(
        &mut self,
        project: &str,
        filter: &Filter,
        update: &Update,
    ) -> Result<bool, StoreError>;

    fn update_many(
        &mut self,
        project: &str,
        filter: &Filter,
        update: &Update,
    ) -> Result<usize, StoreError>;

    /// Replace the first matching document wholesale.
    fn replace_one(
        &mut self,
        project: &str,
        filter: &Filter,
        doc: Value,
    ) -> Result<bool, StoreError>;

    /// Commit a batch of writes.
    fn bulk_write(
        &mut self,
        project: &str,
        ops: Vec<WriteOp>,
    ) -> Result<BulkWriteResult, StoreError>;
}

/// Typed helpers over any [`DocumentStore`].
pub trait DocumentStoreExt: DocumentStore {
    fn find_as<T: DeserializeOwned>(
        &self,
        project: &str,
        filter: &Filter,
    ) -> Result<Vec<T>, StoreError> {
        self.find(project, filter)?
            .into_iter()
            .map(|doc| serde_json::from_value(doc).map_err(StoreError::from))
            .collect()
    }

    fn find_one_as<T: DeserializeOwned>(
        &self,
        project: &str,
        filter: &Filter,
    ) -> Result<Option<T>, StoreError> {
        self.find_one(project, filter)?
            .map(|doc| serde_json::from_value(doc).map_err(StoreError::from))
            .transpose()
    }

    fn insert_as<T: Serialize>(&mut self, project: &str, doc: &T) -> Result<DocId, StoreError> {
        let value = serde_json::to_value(doc)?;
        self.insert_one(project, value)
    }
}

impl<S: DocumentStore + ?Sized> DocumentStoreExt for S {}

// ---------------------------------------------------------------------------
// 3. In-memory implementation
// ---------------------------------------------------------------------------

/// In-memory store, optionally persisted to a JSON file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryStore {
    #[serde(default)]
    projects: BTreeMap<String, Vec<Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Project names with at least one document, sorted.
    pub fn project_names(&self) -> Vec<String> {
        self.projects.keys().cloned().collect()
    }

    /// Load a store from `path`. A missing file yields an empty store.
    pub fn load_at(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
        serde_json::from_str(&contents).map_err(|source| StoreError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Atomically save the store to `path` (`<path>.tmp` then rename).
    pub fn save_at(&self, path: &Path) -> Result<(), StoreError> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        let tmp = PathBuf::from(format!("{}.tmp", path.display()));
        std::fs::write(&tmp, json).map_err(|e| io_err(&tmp, e))?;
        if let Err(e) = std::fs::rename(&tmp, path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(io_err(path, e));
        }
        Ok(())
    }

    fn collection(&self, project: &str) -> &[Value] {
        self.projects
            .get(project)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

fn ensure_id(project: &str, docs: &[Value], doc: &mut Value) -> Result<DocId, StoreError> {
    let Value::Object(map) = doc else {
        return Err(StoreError::InvalidDocument(
            "document must be a JSON object".into(),
        ));
    };
    let id = match map.get("_id") {
        Some(Value::String(id)) => DocId::from(id.as_str()),
        Some(other) => {
            return Err(StoreError::InvalidDocument(format!(
                "_id must be a string, got {other}"
            )))
        }
        None => {
            let id = DocId::generate();
            map.insert("_id".into(), Value::from(&id));
            id
        }
    };
    if docs
        .iter()
        .any(|d| d.get("_id").and_then(Value::as_str) == Some(id.as_str()))
    {
        return Err(StoreError::DuplicateId {
            project: project.to_owned(),
            id: id.0,
        });
    }
    Ok(id)
}

fn apply_op(
    project: &str,
    docs: &mut Vec<Value>,
    op: WriteOp,
    result: &mut BulkWriteResult,
) -> Result<(), StoreError> {
    match op {
        WriteOp::InsertOne(mut doc) => {
            ensure_id(project, docs, &mut doc)?;
            docs.push(doc);
            result.inserted += 1;
        }
        WriteOp::ReplaceOne { filter, doc } => {
            if !doc.is_object() {
                return Err(StoreError::InvalidDocument(
                    "replacement must be a JSON object".into(),
                ));
            }
            if let Some(slot) = docs.iter_mut().find(|d| filter.matches(d)) {
                *slot = doc;
                result.replaced += 1;
            }
        }
        WriteOp::UpdateOne { filter, update } => {
            if let Some(slot) = docs.iter_mut().find(|d| filter.matches(d)) {
                update.apply(slot);
                result.updated += 1;
            }
        }
        WriteOp::DeleteOne { filter } => {
            if let Some(pos) = docs.iter().position(|d| filter.matches(d)) {
                docs.remove(pos);
                result.deleted += 1;
            }
        }
    }
    Ok(())
}

impl DocumentStore for MemoryStore {
    fn find(&self, project: &str, filter: &Filter) -> Result<Vec<Value>, StoreError> {
        Ok(self
            .collection(project)
            .iter()
            .filter(|doc| filter.matches(doc))
            .cloned()
            .collect())
    }

    fn insert_one(&mut self, project: &str, mut doc: Value) -> Result<DocId, StoreError> {
        let docs = self.projects.entry(project.to_owned()).or_default();
        let id = ensure_id(project, docs, &mut doc)?;
        docs.push(doc);
        Ok(id)
    }

    fn update_one(
        &mut self,
        project: &str,
        filter: &Filter,
        update: &Update,
    ) -> Result<bool, StoreError> {
        let Some(docs) = self.projects.get_mut(project) else {
            return Ok(false);
        };
        match docs.iter_mut().find(|d| filter.matches(d)) {
            Some(doc) => {
                update.apply(doc);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn update_many(
        &mut self,
        project: &str,
        filter: &Filter,
        update: &Update,
    ) -> Result<usize, StoreError> {
        let Some(docs) = self.projects.get_mut(project) else {
            return Ok(0);
        };
        let mut count = 0;
        for doc in docs.iter_mut().filter(|d| filter.matches(d)) {
            update.apply(doc);
            count += 1;
        }
        Ok(count)
    }

    fn replace_one(
        &mut self,
        project: &str,
        filter: &Filter,
        doc: Value,
    ) -> Result<bool, StoreError> {
        let mut result = BulkWriteResult::default();
        let docs = self.projects.entry(project.to_owned()).or_default();
        apply_op(
            project,
            docs,
            WriteOp::ReplaceOne {
                filter: filter.clone(),
                doc,
            },
            &mut result,
        )?;
        Ok(result.replaced == 1)
    }

    fn bulk_write(
        &mut self,
        project: &str,
        ops: Vec<WriteOp>,
    ) -> Result<BulkWriteResult, StoreError> {
        let mut staged = self.collection(project).to_vec();
        let mut result = BulkWriteResult::default();
        for op in ops {
            apply_op(project, &mut staged, op, &mut result)?;
        }
        self.projects.insert(project.to_owned(), staged);
        tracing::debug!(
            "bulk write on {project}: {} inserted, {} replaced, {} updated, {} deleted",
            result.inserted,
            result.replaced,
            result.updated,
            result.deleted
        );
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    const P: &str = "demo";

    fn seeded() -> MemoryStore {
        let mut store = MemoryStore::new();
        store
            .insert_one(P, json!({"_id": "a", "type": "asset", "data": {"visualParent": null}}))
            .unwrap();
        store
            .insert_one(P, json!({"_id": "b", "type": "asset", "data": {"visualParent": "a"}}))
            .unwrap();
        store
    }

    #[test]
    fn null_filter_matches_missing_and_null() {
        let store = seeded();
        let roots = store
            .find(P, &Filter::new().eq("data.visualParent", Value::Null))
            .unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0]["_id"], "a");
        let missing = store
            .find(P, &Filter::new().eq("data.nothing", Value::Null))
            .unwrap();
        assert_eq!(missing.len(), 2);
    }

    #[test]
    fn any_of_matches_membership() {
        let store = seeded();
        let found = store.find(P, &Filter::new().any_of("_id", ["b", "zz"])).unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn insert_generates_missing_id_and_rejects_duplicates() {
        let mut store = seeded();
        let id = store.insert_one(P, json!({"type": "subset"})).unwrap();
        assert_eq!(store.count_documents(P, &Filter::by_id(&id)).unwrap(), 1);
        let err = store.insert_one(P, json!({"_id": "a"})).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateId { .. }));
    }

    #[test]
    fn update_creates_nested_keys() {
        let mut store = seeded();
        let update = Update::new().set("data.tasks", json!(["anim"]));
        assert!(store.update_one(P, &Filter::by_id(&"b".into()), &update).unwrap());
        let doc = store.find_one(P, &Filter::by_id(&"b".into())).unwrap().unwrap();
        assert_eq!(doc["data"]["tasks"], json!(["anim"]));
        assert_eq!(doc["data"]["visualParent"], "a");
    }

    #[test]
    fn from_nested_flattens_objects() {
        let changes = json!({"name": "x", "data": {"visualParent": "p", "fps": 24}});
        let update = Update::from_nested(changes.as_object().unwrap());
        let keys: Vec<_> = update.entries().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["data.fps", "data.visualParent", "name"]);
    }

    #[test]
    fn bulk_write_is_all_or_nothing() {
        let mut store = seeded();
        let before = store.clone();
        let err = store
            .bulk_write(
                P,
                vec![
                    WriteOp::InsertOne(json!({"_id": "c"})),
                    WriteOp::InsertOne(json!({"_id": "a"})),
                ],
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateId { .. }));
        assert_eq!(store, before, "failed batch must not leave partial writes");
    }

    #[test]
    fn save_and_load_roundtrip_cleans_tmp() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("db").join("store.json");
        let store = seeded();
        store.save_at(&path).unwrap();
        assert!(!PathBuf::from(format!("{}.tmp", path.display())).exists());
        let loaded = MemoryStore::load_at(&path).unwrap();
        assert_eq!(loaded, store);
    }

    #[test]
    fn load_corrupt_file_reports_path() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("store.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = MemoryStore::load_at(&path).unwrap_err();
        assert!(err.to_string().contains("store.json"));
    }
}
