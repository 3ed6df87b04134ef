//! Tracker event payloads and their classification into per-action batches.
//!
//! A raw event lists entity changes of every kind. [`classify`] keeps the
//! ones the document tree cares about and sorts them by action:
//!
//! | Raw change                               | Result                             |
//! |------------------------------------------|------------------------------------|
//! | entity class not of interest             | dropped                            |
//! | ignored or missing entity type           | dropped                            |
//! | `remove` of the project                  | whole event ignored                |
//! | any task change                          | parent id queued for task refresh  |
//! | `move` carrying other keys               | split into a move and an update    |
//! | `update` of ignored / `avalon_*` keys    | those keys dropped                 |
//! | `update` of `name`                       | split out as a rename              |

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use pype_core::settings::FtrackSettings;

use crate::tracker::CUST_ATTR_AUTO_SYNC;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Add,
    Update,
    Move,
    Remove,
}

/// `entityId` arrives as a plain id or, occasionally, as a list of ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityIds {
    One(String),
    Many(Vec<String>),
}

impl EntityIds {
    pub fn first(&self) -> Option<&str> {
        match self {
            EntityIds::One(id) => Some(id),
            EntityIds::Many(ids) => ids.first().map(String::as_str),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Change {
    #[serde(default)]
    pub old: Value,
    #[serde(default)]
    pub new: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityChange {
    /// Entity class: `show` for the project, `task` for typed context.
    #[serde(rename = "entityType")]
    pub entity_class: String,
    /// Concrete type (`Shot`, `Task`, `Project`...).
    #[serde(rename = "entity_type", default)]
    pub entity_type: Option<String>,
    pub action: Action,
    #[serde(rename = "entityId")]
    pub entity_id: EntityIds,
    #[serde(rename = "parentId", default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub changes: BTreeMap<String, Change>,
}

impl EntityChange {
    pub fn entity_type(&self) -> &str {
        self.entity_type.as_deref().unwrap_or_default()
    }

    pub fn is_task(&self) -> bool {
        self.entity_type().eq_ignore_ascii_case("task")
    }

    pub fn is_project(&self) -> bool {
        self.entity_class == "show"
    }

    fn change_str(&self, key: &str, new: bool) -> Option<&str> {
        let change = self.changes.get(key)?;
        let value = if new { &change.new } else { &change.old };
        value.as_str()
    }

    pub fn new_value(&self, key: &str) -> Option<&str> {
        self.change_str(key, true)
    }

    pub fn old_value(&self, key: &str) -> Option<&str> {
        self.change_str(key, false)
    }

    /// Split the listed keys off into a copy; `self` keeps the rest.
    fn split_off(&mut self, keys: &[&str]) -> EntityChange {
        let mut split = self.clone();
        split.keys.retain(|k| keys.contains(&k.as_str()));
        split.changes.retain(|k, _| keys.contains(&k.as_str()));
        self.keys.retain(|k| !keys.contains(&k.as_str()));
        self.changes.retain(|k, _| !keys.contains(&k.as_str()));
        split
    }
}

/// One tracker notification as delivered on the event hub.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackerEvent {
    #[serde(default)]
    pub entities: Vec<EntityChange>,
}

/// Changes by tracker id, per action.
pub type ChangeMap = BTreeMap<String, EntityChange>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventBatch {
    pub removed: ChangeMap,
    pub renamed: ChangeMap,
    pub moved: ChangeMap,
    pub added: ChangeMap,
    pub updated: ChangeMap,
    /// Entities whose task list has to be refreshed.
    pub task_parents: BTreeSet<String>,
    /// `Some(state)` when the event toggled project auto-sync.
    pub auto_sync_toggled: Option<bool>,
    pub project_removed: bool,
}

impl EventBatch {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty()
            && self.renamed.is_empty()
            && self.moved.is_empty()
            && self.added.is_empty()
            && self.updated.is_empty()
            && self.task_parents.is_empty()
    }
}

/// Sort the changes of `event` into an [`EventBatch`].
pub fn classify(event: &TrackerEvent, settings: &FtrackSettings) -> EventBatch {
    let mut batch = EventBatch::default();
    let mut updated = ChangeMap::new();

    for change in &event.entities {
        if !settings.interest_entity_classes.contains(&change.entity_class) {
            continue;
        }
        let Some(entity_type) = change.entity_type.as_deref() else {
            continue;
        };
        if settings
            .ignore_entity_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(entity_type))
        {
            continue;
        }
        if let EntityIds::Many(ids) = &change.entity_id {
            tracing::warn!("entity change carries a list of ids {ids:?}");
        }
        let Some(id) = change.entity_id.first() else {
            continue;
        };
        let id = id.to_owned();

        if change.action == Action::Remove && change.is_project() {
            tracing::debug!("project {id} was removed, ignoring event");
            return EventBatch {
                project_removed: true,
                ..EventBatch::default()
            };
        }

        if change.is_task() {
            if change.action == Action::Move {
                if let Some(parent) = change.changes.get("parent_id") {
                    for side in [&parent.old, &parent.new] {
                        if let Some(p) = side.as_str() {
                            batch.task_parents.insert(p.to_owned());
                        }
                    }
                }
            } else if change.changes.contains_key("typeid") || change.changes.contains_key("name")
                || matches!(change.action, Action::Add | Action::Remove)
            {
                if let Some(parent) = &change.parent_id {
                    batch.task_parents.insert(parent.clone());
                }
            }
            continue;
        }

        let mut change = change.clone();
        change.entity_id = EntityIds::One(id.clone());
        match change.action {
            Action::Move => {
                if change.keys.len() > 1 {
                    let mut extra = change.clone();
                    change = extra.split_off(&["parent_id"]);
                    extra.action = Action::Update;
                    updated.insert(id.clone(), extra);
                }
                batch.moved.insert(id, change);
            }
            Action::Update => {
                updated.insert(id, change);
            }
            Action::Add => {
                batch.added.insert(id, change);
            }
            Action::Remove => {
                batch.removed.insert(id, change);
            }
        }
    }

    for change in updated.values() {
        if !change.is_project() {
            continue;
        }
        if let Some(toggle) = change.changes.get(CUST_ATTR_AUTO_SYNC) {
            let on = matches!(&toggle.new, Value::String(s) if s == "1")
                || toggle.new == Value::Bool(true);
            batch.auto_sync_toggled = Some(on);
            return batch;
        }
    }

    for (id, mut change) in filter_updated(updated, settings) {
        if change.keys.iter().any(|k| k == "name") {
            let rename = change.split_off(&["name"]);
            batch.renamed.insert(id.clone(), rename);
            if change.keys.is_empty() {
                continue;
            }
        }
        batch.updated.insert(id, change);
    }
    batch
}

/// Drop ignored keys and `avalon_*` custom attributes; updates left without
/// keys disappear.
fn filter_updated(updated: ChangeMap, settings: &FtrackSettings) -> ChangeMap {
    updated
        .into_iter()
        .filter_map(|(id, mut change)| {
            let dropped = |key: &str| {
                settings.ignore_keys.iter().any(|k| k == key) || key.starts_with("avalon_")
            };
            change.keys.retain(|k| !dropped(k));
            change.changes.retain(|k, _| !dropped(k));
            if change.keys.is_empty() {
                return None;
            }
            Some((id, change))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(entities: Value) -> TrackerEvent {
        serde_json::from_value(json!({ "entities": entities })).unwrap()
    }

    #[test]
    fn move_with_extra_keys_is_split() {
        let batch = classify(
            &event(json!([{
                "entityType": "task", "entity_type": "Shot", "action": "move",
                "entityId": "sh", "keys": ["parent_id", "description"],
                "changes": {
                    "parent_id": {"old": "sq1", "new": "sq2"},
                    "description": {"old": "", "new": "hello"}
                }
            }])),
            &FtrackSettings::default(),
        );
        assert_eq!(batch.moved["sh"].keys, vec!["parent_id"]);
        assert_eq!(batch.updated["sh"].keys, vec!["description"]);
        assert_eq!(batch.updated["sh"].action, Action::Update);
    }

    #[test]
    fn rename_is_split_from_update() {
        let batch = classify(
            &event(json!([{
                "entityType": "task", "entity_type": "Shot", "action": "update",
                "entityId": ["sh"], "keys": ["name", "statusid", "avalon_mongo_id"],
                "changes": {
                    "name": {"old": "sh010", "new": "sh020"},
                    "statusid": {"old": "a", "new": "b"},
                    "avalon_mongo_id": {"old": "", "new": "x"}
                }
            }])),
            &FtrackSettings::default(),
        );
        assert_eq!(batch.renamed["sh"].new_value("name"), Some("sh020"));
        assert!(batch.updated.is_empty());
    }

    #[test]
    fn ignored_types_and_classes_are_dropped() {
        let batch = classify(
            &event(json!([
                {"entityType": "task", "entity_type": "Milestone", "action": "add", "entityId": "m"},
                {"entityType": "user", "entity_type": "User", "action": "add", "entityId": "u"},
                {"entityType": "task", "action": "add", "entityId": "x"},
                {"entityType": "task", "entity_type": "Shot", "action": "add", "entityId": []}
            ])),
            &FtrackSettings::default(),
        );
        assert!(batch.is_empty());
    }

    #[test]
    fn task_changes_queue_parents() {
        let batch = classify(
            &event(json!([
                {"entityType": "task", "entity_type": "Task", "action": "move", "entityId": "t1",
                 "keys": ["parent_id"], "changes": {"parent_id": {"old": "a", "new": "b"}}},
                {"entityType": "task", "entity_type": "Task", "action": "update", "entityId": "t2",
                 "parentId": "c", "keys": ["name"], "changes": {"name": {"old": "x", "new": "y"}}}
            ])),
            &FtrackSettings::default(),
        );
        let parents: Vec<_> = batch.task_parents.iter().cloned().collect();
        assert_eq!(parents, vec!["a", "b", "c"]);
        assert!(batch.renamed.is_empty());
    }

    #[test]
    fn project_removal_and_auto_sync_toggle() {
        let removed = classify(
            &event(json!([{"entityType": "show", "entity_type": "Project", "action": "remove", "entityId": "p"}])),
            &FtrackSettings::default(),
        );
        assert!(removed.project_removed);

        let toggled = classify(
            &event(json!([{
                "entityType": "show", "entity_type": "Project", "action": "update", "entityId": "p",
                "keys": ["avalon_auto_sync"], "changes": {"avalon_auto_sync": {"old": "0", "new": "1"}}
            }])),
            &FtrackSettings::default(),
        );
        assert_eq!(toggled.auto_sync_toggled, Some(true));
    }
}
