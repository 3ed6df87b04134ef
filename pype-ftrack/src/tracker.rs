//! Production-tracker session seam.
//!
//! The processor only talks to the tracker through [`TrackerSession`].
//! [`MemoryTracker`] keeps a whole project in memory and backs the tests and
//! offline replays of recorded events.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Custom attribute holding the document id an entity is bound to.
pub const CUST_ATTR_ID_KEY: &str = "avalon_mongo_id";

/// Project custom attribute that enables event synchronisation.
pub const CUST_ATTR_AUTO_SYNC: &str = "avalon_auto_sync";

/// A tracker call failed. Writes failing this way are reported, not fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct TrackerError(pub String);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerProject {
    pub id: String,
    pub full_name: String,
    #[serde(default)]
    pub custom_attributes: BTreeMap<String, Value>,
}

/// A non-task entity of the project tree (sequence, shot, asset build...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerEntity {
    pub id: String,
    pub name: String,
    pub entity_type: String,
    /// Parent entity id; the project id for top-level entities.
    pub parent_id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub custom_attributes: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerTask {
    pub id: String,
    pub name: String,
    pub parent_id: String,
    pub task_type: String,
}

/// How a custom attribute value is converted before it is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum AttributeKind {
    Text,
    Boolean,
    Number { decimal: bool },
    Enumerator { multi_select: bool },
    Date,
    /// Expressions, notification types, dynamic enumerators.
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomAttribute {
    pub key: String,
    #[serde(default)]
    pub hierarchical: bool,
    pub kind: AttributeKind,
    #[serde(default)]
    pub default: Value,
}

impl CustomAttribute {
    /// Convert a raw event value the way the attribute's type dictates.
    /// `None` means the value is not synchronised.
    pub fn convert(&self, value: &Value) -> Option<Value> {
        match self.kind {
            AttributeKind::Ignored => None,
            AttributeKind::Text | AttributeKind::Date => Some(value.clone()),
            AttributeKind::Boolean => Some(Value::Bool(match value {
                Value::String(s) => s == "1" || s.eq_ignore_ascii_case("true"),
                Value::Bool(b) => *b,
                Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
                _ => false,
            })),
            AttributeKind::Number { decimal } => {
                let number = match value {
                    Value::Number(n) => n.as_f64(),
                    Value::String(s) => s.trim().parse::<f64>().ok(),
                    _ => None,
                }?;
                if decimal {
                    serde_json::Number::from_f64(number).map(Value::Number)
                } else {
                    Some(Value::from(number as i64))
                }
            }
            AttributeKind::Enumerator { multi_select } => match value {
                Value::String(s) if multi_select => Some(Value::from(
                    s.split(", ").map(str::to_owned).collect::<Vec<_>>(),
                )),
                other => Some(other.clone()),
            },
        }
    }
}

pub trait TrackerSession {
    fn project(&self) -> Result<TrackerProject, TrackerError>;

    fn entity(&self, id: &str) -> Result<Option<TrackerEntity>, TrackerError>;

    /// Entities (tasks excluded) whose name is one of `names`.
    fn entities_named(&self, names: &[String]) -> Result<Vec<TrackerEntity>, TrackerError>;

    /// Direct non-task children of an entity.
    fn children(&self, id: &str) -> Result<Vec<TrackerEntity>, TrackerError>;

    /// Names from the project down to the entity, both included.
    fn link(&self, id: &str) -> Result<Vec<String>, TrackerError>;

    fn tasks_of(&self, parent_ids: &BTreeSet<String>) -> Result<Vec<TrackerTask>, TrackerError>;

    fn custom_attributes(&self) -> Result<Vec<CustomAttribute>, TrackerError>;

    fn create_entity(
        &mut self,
        entity_type: &str,
        name: &str,
        parent_id: &str,
    ) -> Result<TrackerEntity, TrackerError>;

    fn set_name(&mut self, id: &str, name: &str) -> Result<(), TrackerError>;

    fn set_parent(&mut self, id: &str, parent_id: &str) -> Result<(), TrackerError>;

    /// Set a custom attribute on an entity or, given the project id, on the
    /// project.
    fn set_custom_attribute(&mut self, id: &str, key: &str, value: Value)
        -> Result<(), TrackerError>;
}

// ---------------------------------------------------------------------------
// In-memory session
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryTracker {
    project: TrackerProject,
    #[serde(default)]
    entities: BTreeMap<String, TrackerEntity>,
    #[serde(default)]
    tasks: Vec<TrackerTask>,
    #[serde(default)]
    attributes: Vec<CustomAttribute>,
    /// When set every write fails.
    #[serde(default)]
    read_only: bool,
    #[serde(default)]
    created: usize,
}

impl MemoryTracker {
    pub fn new(id: &str, full_name: &str) -> Self {
        Self {
            project: TrackerProject {
                id: id.to_owned(),
                full_name: full_name.to_owned(),
                custom_attributes: BTreeMap::from([(
                    CUST_ATTR_AUTO_SYNC.to_owned(),
                    Value::Bool(true),
                )]),
            },
            entities: BTreeMap::new(),
            tasks: Vec::new(),
            attributes: Vec::new(),
            read_only: false,
            created: 0,
        }
    }

    pub fn with_entity(mut self, id: &str, entity_type: &str, name: &str, parent_id: &str) -> Self {
        self.insert(TrackerEntity {
            id: id.to_owned(),
            name: name.to_owned(),
            entity_type: entity_type.to_owned(),
            parent_id: parent_id.to_owned(),
            description: String::new(),
            custom_attributes: BTreeMap::new(),
        });
        self
    }

    pub fn with_task(mut self, id: &str, name: &str, parent_id: &str, task_type: &str) -> Self {
        self.tasks.push(TrackerTask {
            id: id.to_owned(),
            name: name.to_owned(),
            parent_id: parent_id.to_owned(),
            task_type: task_type.to_owned(),
        });
        self
    }

    pub fn with_attribute(mut self, attribute: CustomAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn insert(&mut self, entity: TrackerEntity) {
        self.entities.insert(entity.id.clone(), entity);
    }

    pub fn remove(&mut self, id: &str) -> Option<TrackerEntity> {
        self.tasks.retain(|t| t.parent_id != id);
        self.entities.remove(id)
    }

    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    pub fn get(&self, id: &str) -> Option<&TrackerEntity> {
        self.entities.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut TrackerEntity> {
        self.entities.get_mut(id)
    }

    pub fn project_attributes_mut(&mut self) -> &mut BTreeMap<String, Value> {
        &mut self.project.custom_attributes
    }

    pub fn tasks_mut(&mut self) -> &mut Vec<TrackerTask> {
        &mut self.tasks
    }

    fn check_writable(&self) -> Result<(), TrackerError> {
        if self.read_only {
            return Err(TrackerError("session is read-only".into()));
        }
        Ok(())
    }

    fn existing(&mut self, id: &str) -> Result<&mut TrackerEntity, TrackerError> {
        self.entities
            .get_mut(id)
            .ok_or_else(|| TrackerError(format!("no entity {id}")))
    }
}

impl TrackerSession for MemoryTracker {
    fn project(&self) -> Result<TrackerProject, TrackerError> {
        Ok(self.project.clone())
    }

    fn entity(&self, id: &str) -> Result<Option<TrackerEntity>, TrackerError> {
        Ok(self.entities.get(id).cloned())
    }

    fn entities_named(&self, names: &[String]) -> Result<Vec<TrackerEntity>, TrackerError> {
        Ok(self
            .entities
            .values()
            .filter(|e| names.contains(&e.name))
            .cloned()
            .collect())
    }

    fn children(&self, id: &str) -> Result<Vec<TrackerEntity>, TrackerError> {
        Ok(self
            .entities
            .values()
            .filter(|e| e.parent_id == id)
            .cloned()
            .collect())
    }

    fn link(&self, id: &str) -> Result<Vec<String>, TrackerError> {
        let mut names = Vec::new();
        let mut current = id.to_owned();
        let mut seen = BTreeSet::new();
        while current != self.project.id {
            if !seen.insert(current.clone()) {
                return Err(TrackerError(format!("entity {id} has a parent cycle")));
            }
            let entity = self
                .entities
                .get(&current)
                .ok_or_else(|| TrackerError(format!("no entity {current}")))?;
            names.push(entity.name.clone());
            current = entity.parent_id.clone();
        }
        names.push(self.project.full_name.clone());
        names.reverse();
        Ok(names)
    }

    fn tasks_of(&self, parent_ids: &BTreeSet<String>) -> Result<Vec<TrackerTask>, TrackerError> {
        Ok(self
            .tasks
            .iter()
            .filter(|t| parent_ids.contains(&t.parent_id))
            .cloned()
            .collect())
    }

    fn custom_attributes(&self) -> Result<Vec<CustomAttribute>, TrackerError> {
        Ok(self.attributes.clone())
    }

    fn create_entity(
        &mut self,
        entity_type: &str,
        name: &str,
        parent_id: &str,
    ) -> Result<TrackerEntity, TrackerError> {
        self.check_writable()?;
        if parent_id != self.project.id && !self.entities.contains_key(parent_id) {
            return Err(TrackerError(format!("no parent {parent_id}")));
        }
        self.created += 1;
        let entity = TrackerEntity {
            id: format!("{}-new-{}", self.project.id, self.created),
            name: name.to_owned(),
            entity_type: entity_type.to_owned(),
            parent_id: parent_id.to_owned(),
            description: String::new(),
            custom_attributes: BTreeMap::new(),
        };
        self.insert(entity.clone());
        Ok(entity)
    }

    fn set_name(&mut self, id: &str, name: &str) -> Result<(), TrackerError> {
        self.check_writable()?;
        self.existing(id)?.name = name.to_owned();
        Ok(())
    }

    fn set_parent(&mut self, id: &str, parent_id: &str) -> Result<(), TrackerError> {
        self.check_writable()?;
        self.existing(id)?.parent_id = parent_id.to_owned();
        Ok(())
    }

    fn set_custom_attribute(
        &mut self,
        id: &str,
        key: &str,
        value: Value,
    ) -> Result<(), TrackerError> {
        self.check_writable()?;
        if id == self.project.id {
            self.project.custom_attributes.insert(key.to_owned(), value);
            return Ok(());
        }
        self.existing(id)?
            .custom_attributes
            .insert(key.to_owned(), value);
        Ok(())
    }
}
