//! Domain types shared by every pipeline crate.
//!
//! Documents mirror the shapes persisted in the project document store. All
//! of them (de)serialize with serde so they can round-trip through
//! [`crate::store::DocumentStore`] as plain JSON values.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Schema marker written on every container root.
pub const CONTAINER_SCHEMA: &str = "openpype:container-2.0";

/// Entity-class marker for loaded containers.
pub const AVALON_CONTAINER_ID: &str = "pyblish.avalon.container";

/// Entity-class marker for publish instances.
pub const AVALON_INSTANCE_ID: &str = "pyblish.avalon.instance";

pub const REPRESENTATION_SCHEMA: &str = "openpype:representation-2.0";
pub const HERO_VERSION_SCHEMA: &str = "openpype:hero_version-1.0";
pub const ASSET_SCHEMA: &str = "openpype:asset-3.0";

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Document identifier (`_id`) in the document store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocId(pub String);

impl DocId {
    /// Generate a fresh, globally unique id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for DocId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DocId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<DocId> for Value {
    fn from(id: DocId) -> Self {
        Value::String(id.0)
    }
}

impl From<&DocId> for Value {
    fn from(id: &DocId) -> Self {
        Value::String(id.0.clone())
    }
}

// ---------------------------------------------------------------------------
// Document type discriminator
// ---------------------------------------------------------------------------

/// Value of the `type` field carried by every document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocType {
    Project,
    Asset,
    ArchivedAsset,
    Subset,
    Version,
    HeroVersion,
    Representation,
    ArchivedRepresentation,
}

impl DocType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocType::Project => "project",
            DocType::Asset => "asset",
            DocType::ArchivedAsset => "archived_asset",
            DocType::Subset => "subset",
            DocType::Version => "version",
            DocType::HeroVersion => "hero_version",
            DocType::Representation => "representation",
            DocType::ArchivedRepresentation => "archived_representation",
        }
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<DocType> for Value {
    fn from(t: DocType) -> Self {
        Value::String(t.as_str().to_owned())
    }
}

// ---------------------------------------------------------------------------
// Project tree documents
// ---------------------------------------------------------------------------

/// Free-form project data plus the tracker back-reference.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectData {
    #[serde(rename = "ftrackId", default, skip_serializing_if = "Option::is_none")]
    pub ftrack_id: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectDoc {
    #[serde(rename = "_id")]
    pub id: DocId,
    #[serde(rename = "type")]
    pub doc_type: DocType,
    pub name: String,
    #[serde(default)]
    pub data: ProjectData,
    #[serde(default)]
    pub config: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskInfo {
    #[serde(rename = "type")]
    pub task_type: String,
}

/// Hierarchy data carried by an asset document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetData {
    #[serde(rename = "ftrackId", default, skip_serializing_if = "Option::is_none")]
    pub ftrack_id: Option<String>,
    #[serde(rename = "entityType", default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    /// Immediate parent asset; `None` means the project root.
    #[serde(rename = "visualParent", default)]
    pub visual_parent: Option<DocId>,
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default)]
    pub hierarchy: String,
    /// Task name -> task info.
    #[serde(default)]
    pub tasks: BTreeMap<String, TaskInfo>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// An asset (folder) in the project tree. Archived assets keep the same shape
/// with `type` flipped to `archived_asset`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetDoc {
    #[serde(rename = "_id")]
    pub id: DocId,
    #[serde(rename = "type")]
    pub doc_type: DocType,
    #[serde(default = "default_asset_schema")]
    pub schema: String,
    pub name: String,
    /// Project document id.
    pub parent: DocId,
    #[serde(default)]
    pub data: AssetData,
}

fn default_asset_schema() -> String {
    ASSET_SCHEMA.to_owned()
}

impl AssetDoc {
    pub fn is_archived(&self) -> bool {
        self.doc_type == DocType::ArchivedAsset
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubsetDoc {
    #[serde(rename = "_id")]
    pub id: DocId,
    #[serde(rename = "type")]
    pub doc_type: DocType,
    pub name: String,
    /// Asset document id.
    pub parent: DocId,
    #[serde(default)]
    pub data: BTreeMap<String, Value>,
}

// ---------------------------------------------------------------------------
// Publish documents
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionDoc {
    #[serde(rename = "_id")]
    pub id: DocId,
    #[serde(rename = "type")]
    pub doc_type: DocType,
    /// Version number.
    pub name: u32,
    /// Subset document id.
    pub parent: DocId,
    #[serde(default)]
    pub data: BTreeMap<String, Value>,
}

/// The mutable "latest stable" pointer of a subset. At most one per `parent`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeroVersionDoc {
    #[serde(rename = "_id")]
    pub id: DocId,
    #[serde(rename = "type")]
    pub doc_type: DocType,
    pub schema: String,
    /// Source (normal) version id.
    pub version_id: DocId,
    /// Subset document id.
    pub parent: DocId,
}

/// Per-site synchronization record of a single file.
///
/// `created_dt` and `last_failed_dt` are mutually exclusive: the presence of
/// one but not the other encodes success versus failure of the last attempt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SiteEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_dt: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_failed_dt: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tries: Option<u32>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub paused: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SiteEntry {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepresentationFile {
    pub path: String,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub sites: Vec<SiteEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepresentationData {
    #[serde(default)]
    pub path: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub template: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// One published file-set of a specific format for one version.
///
/// Archived representations carry the same shape plus `old_id`, the `_id` the
/// representation had before archival.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepresentationDoc {
    #[serde(rename = "_id")]
    pub id: DocId,
    #[serde(rename = "type")]
    pub doc_type: DocType,
    #[serde(default = "default_representation_schema")]
    pub schema: String,
    /// Version (or hero version) id.
    pub parent: DocId,
    pub name: String,
    #[serde(default)]
    pub files: Vec<RepresentationFile>,
    #[serde(default)]
    pub context: BTreeMap<String, Value>,
    #[serde(default)]
    pub data: RepresentationData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_id: Option<DocId>,
}

fn default_representation_schema() -> String {
    REPRESENTATION_SCHEMA.to_owned()
}

impl RepresentationDoc {
    /// Read a string value from `context` (`asset`, `subset`, `family`, ...).
    pub fn context_str(&self, key: &str) -> Option<&str> {
        self.context.get(key).and_then(Value::as_str)
    }
}

// ---------------------------------------------------------------------------
// Container metadata
// ---------------------------------------------------------------------------

/// Metadata block stamped on a container root in a scene.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerMetadata {
    pub schema: String,
    pub id: String,
    pub name: String,
    pub namespace: String,
    pub loader: String,
    pub representation: String,
    pub libpath: String,
    pub asset_name: String,
    pub parent: String,
    pub family: String,
    #[serde(rename = "objectName")]
    pub object_name: String,
}

impl ContainerMetadata {
    pub fn is_container(&self) -> bool {
        self.id == AVALON_CONTAINER_ID
    }
}

/// Metadata block stamped on a publish instance (e.g. the animation instance
/// created alongside a rig).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceMetadata {
    pub id: String,
    pub family: String,
    pub asset: String,
    pub subset: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_group: Option<String>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doc_id_display_and_generate() {
        assert_eq!(DocId::from("abc").to_string(), "abc");
        let a = DocId::generate();
        let b = DocId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
    }

    #[test]
    fn doc_type_serializes_snake_case() {
        let v = serde_json::to_value(DocType::ArchivedRepresentation).unwrap();
        assert_eq!(v, Value::from("archived_representation"));
        assert_eq!(DocType::HeroVersion.to_string(), "hero_version");
    }

    #[test]
    fn container_metadata_uses_object_name_key() {
        let meta = ContainerMetadata {
            schema: CONTAINER_SCHEMA.into(),
            id: AVALON_CONTAINER_ID.into(),
            name: "rigMain".into(),
            namespace: "hero_01".into(),
            loader: "BlendRigLoader".into(),
            representation: "r1".into(),
            libpath: "/lib/rig.blend".into(),
            asset_name: "hero_rigMain".into(),
            parent: "v1".into(),
            family: "rig".into(),
            object_name: "hero_rigMain_01".into(),
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["objectName"], "hero_rigMain_01");
        assert!(meta.is_container());
    }

    #[test]
    fn asset_data_keeps_unknown_keys() {
        let raw = serde_json::json!({
            "_id": "a1",
            "type": "asset",
            "name": "sh010",
            "parent": "p1",
            "data": {"visualParent": null, "ftrackId": "f1", "fps": 25}
        });
        let asset: AssetDoc = serde_json::from_value(raw).unwrap();
        assert_eq!(asset.data.ftrack_id.as_deref(), Some("f1"));
        assert_eq!(asset.data.extra.get("fps"), Some(&Value::from(25)));
        assert!(!asset.is_archived());
    }
}
