//! Name validation against per-schema patterns, compiled once per event.

use std::collections::{BTreeMap, HashMap};

use regex::Regex;

use crate::error::SyncError;

pub const DEFAULT_NAME_PATTERN: &str = "^[a-zA-Z0-9_.]*$";

/// Kind of document a name is checked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NameKind {
    Project,
    Asset,
    Task,
}

impl NameKind {
    pub fn schema(&self) -> &'static str {
        match self {
            NameKind::Project => "project-2.1",
            NameKind::Asset => "asset-3.0",
            NameKind::Task => "task",
        }
    }
}

#[derive(Debug, Default)]
pub struct SchemaPatterns {
    overrides: BTreeMap<String, String>,
    compiled: HashMap<&'static str, Regex>,
}

impl SchemaPatterns {
    /// `overrides` maps a schema name (`asset-3.0`, `task`...) to a pattern.
    pub fn new(overrides: BTreeMap<String, String>) -> Self {
        Self {
            overrides,
            compiled: HashMap::new(),
        }
    }

    /// Whether `name` matches the pattern of its schema. Like a prefix match,
    /// the pattern only has to match starting at the first character.
    pub fn check(&mut self, name: &str, kind: NameKind) -> Result<bool, SyncError> {
        let schema = kind.schema();
        if !self.compiled.contains_key(schema) {
            let pattern = self
                .overrides
                .get(schema)
                .map(String::as_str)
                .unwrap_or(DEFAULT_NAME_PATTERN);
            let regex = Regex::new(pattern).map_err(|source| SyncError::InvalidPattern {
                schema: schema.to_owned(),
                source,
            })?;
            self.compiled.insert(schema, regex);
        }
        Ok(self.compiled[schema]
            .find(name)
            .is_some_and(|m| m.start() == 0))
    }
}
