//! Next-free version lookup.
//!
//! The next version is one past the highest existing one, but another
//! publish may claim numbers concurrently, so candidates are probed until a
//! free one is found. Probing gives up after [`MAX_VERSION_ATTEMPTS`].

use std::collections::BTreeSet;

use serde_json::Value;

use pype_core::store::{DocumentStore, Filter};
use pype_core::types::{DocId, DocType};

use crate::error::PublishError;

pub const MAX_VERSION_ATTEMPTS: u32 = 100;

/// First version `>= start` for which `is_taken` is false.
pub fn next_free_version(
    start: u32,
    mut is_taken: impl FnMut(u32) -> bool,
) -> Result<u32, PublishError> {
    for attempt in 0..MAX_VERSION_ATTEMPTS {
        let candidate = start.saturating_add(attempt);
        if !is_taken(candidate) {
            if attempt > 0 {
                tracing::warn!("version {start} is taken, using {candidate}");
            }
            return Ok(candidate);
        }
    }
    Err(PublishError::VersionsExhausted {
        start,
        attempts: MAX_VERSION_ATTEMPTS,
    })
}

/// Next version number of a subset, checked against the store.
pub fn next_version_number<D: DocumentStore + ?Sized>(
    store: &D,
    project: &str,
    subset_id: &DocId,
) -> Result<u32, PublishError> {
    let filter = Filter::new()
        .eq("type", DocType::Version)
        .eq("parent", subset_id);
    let existing: BTreeSet<u32> = store
        .find(project, &filter)?
        .iter()
        .filter_map(|doc| doc.get("name").and_then(Value::as_u64))
        .filter_map(|n| u32::try_from(n).ok())
        .collect();
    let start = existing.iter().next_back().map_or(1, |last| last + 1);
    next_free_version(start, |candidate| existing.contains(&candidate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pype_core::MemoryStore;
    use serde_json::json;

    #[test]
    fn skips_taken_versions() {
        let taken = [4, 5, 6];
        assert_eq!(next_free_version(4, |v| taken.contains(&v)).unwrap(), 7);
        assert_eq!(next_free_version(1, |v| taken.contains(&v)).unwrap(), 1);
    }

    #[test]
    fn gives_up_after_limit() {
        let err = next_free_version(1, |_| true).unwrap_err();
        assert!(matches!(
            err,
            PublishError::VersionsExhausted { start: 1, attempts: 100 }
        ));
        let just_in_time = next_free_version(1, |v| v < 100).unwrap();
        assert_eq!(just_in_time, 100);
    }

    #[test]
    fn counts_from_highest_version_of_subset() {
        let mut store = MemoryStore::new();
        for (id, parent, name) in [("v1", "s1", 1), ("v3", "s1", 3), ("v9", "s2", 9)] {
            store
                .insert_one("demo", json!({"_id": id, "type": "version", "parent": parent, "name": name}))
                .unwrap();
        }
        assert_eq!(next_version_number(&store, "demo", &DocId::from("s1")).unwrap(), 4);
        assert_eq!(next_version_number(&store, "demo", &DocId::from("s0")).unwrap(), 1);
    }
}
