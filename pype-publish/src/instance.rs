//! Publish instance data handed to the hero integrator by the publish host.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use pype_anatomy::TemplateData;
use pype_core::types::{RepresentationDoc, VersionDoc};

/// One representation produced by the normal publish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedRepresentation {
    /// The representation document as integrated for the new version.
    pub representation: RepresentationDoc,
    /// Absolute paths of the files written for it.
    #[serde(default)]
    pub published_files: Vec<PathBuf>,
    /// Template data the representation was published with.
    #[serde(default)]
    pub anatomy_data: TemplateData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishInstance {
    pub subset: String,
    #[serde(default)]
    pub family: Option<String>,
    #[serde(default)]
    pub families: Vec<String>,
    /// Host application the publish ran in.
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub anatomy_data: TemplateData,
    /// Directory of the normal (versioned) publish.
    pub publish_dir: PathBuf,
    /// Version created by the normal publish, when the host passes it along.
    #[serde(default)]
    pub version: Option<VersionDoc>,
    #[serde(default)]
    pub published_representations: Vec<PublishedRepresentation>,
    /// `(source, destination)` pairs copied by the normal publish.
    #[serde(default)]
    pub transfers: Vec<(PathBuf, PathBuf)>,
    /// `(source, destination)` pairs hardlinked by the normal publish.
    #[serde(default)]
    pub hardlinks: Vec<(PathBuf, PathBuf)>,
}

impl PublishInstance {
    /// `family`, or the first of `families`.
    pub fn main_family(&self) -> &str {
        self.family
            .as_deref()
            .or_else(|| self.families.first().map(String::as_str))
            .unwrap_or_default()
    }

    /// `task.name` / `task.type` from the anatomy data.
    pub fn task_field(&self, field: &str) -> &str {
        self.anatomy_data
            .get("task")
            .and_then(|task| task.get(field))
            .and_then(Value::as_str)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn family_and_task_fall_back_quietly() {
        let instance: PublishInstance = serde_json::from_value(json!({
            "subset": "modelMain",
            "families": ["model", "review"],
            "publish_dir": "/pub/v001",
            "anatomy_data": {"task": {"name": "modeling", "type": "Modeling"}}
        }))
        .unwrap();
        assert_eq!(instance.main_family(), "model");
        assert_eq!(instance.task_field("name"), "modeling");
        assert_eq!(instance.task_field("type"), "Modeling");
        assert_eq!(instance.task_field("short"), "");
        assert!(instance.version.is_none());
    }
}
