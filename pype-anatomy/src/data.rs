//! Template data: the key/value payload a template is filled with.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Flat-or-nested values available to anatomy templates.
///
/// Typical keys: `project.{name,code}`, `asset`, `hierarchy`, `subset`,
/// `family`, `task.{name,type}`, `version`, `representation`, `ext`,
/// `frame`. The `root` key is reserved and injected by the anatomy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateData(Map<String, Value>);

impl TemplateData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a representation `context` block.
    pub fn from_context(context: &BTreeMap<String, Value>) -> Self {
        Self(context.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub(crate) fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for TemplateData {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}
