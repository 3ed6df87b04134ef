//! Document updates collected while an event is processed.
//!
//! Each phase takes the accumulated [`Updates`] and returns them with its own
//! changes added; the last step turns them into one batch.

use std::collections::BTreeMap;

use serde_json::Value;

use pype_core::store::{Filter, Update, WriteOp};
use pype_core::types::DocId;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Updates {
    by_id: BTreeMap<DocId, Update>,
}

impl Updates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage `$set key = value` on document `id`.
    pub fn set(&mut self, id: &DocId, key: &str, value: impl Into<Value>) {
        self.by_id.entry(id.clone()).or_default().insert(key, value);
    }

    pub fn get(&self, id: &DocId) -> Option<&Update> {
        self.by_id.get(id)
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.values().all(Update::is_empty)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn merge(mut self, other: Updates) -> Self {
        for (id, update) in other.by_id {
            self.by_id.entry(id).or_default().merge(update);
        }
        self
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.by_id
            .into_iter()
            .filter(|(_, update)| !update.is_empty())
            .map(|(id, update)| WriteOp::UpdateOne {
                filter: Filter::by_id(&id),
                update,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn later_values_win_on_merge() {
        let id = DocId::from("a1");
        let mut first = Updates::new();
        first.set(&id, "name", "sh010");
        first.set(&id, "data.visualParent", "p1");
        let mut second = Updates::new();
        second.set(&id, "name", "sh020");

        let merged = first.merge(second);
        let entries: Vec<_> = merged.get(&id).unwrap().entries().collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], (&"data.visualParent".to_string(), &json!("p1")));
        assert_eq!(entries[1], (&"name".to_string(), &json!("sh020")));
        assert_eq!(merged.into_ops().len(), 1);
    }
}
