//! Which assets may be renamed, moved or removed.
//!
//! An asset is unchangeable when it owns subsets or has a descendant that
//! does, live or archived. The project root is never changeable.
//!
//! The cascade runs breadth-first over an explicit work list, starting at
//! every subset owner and walking up `data.visualParent`. Each entry carries
//! whether it was reached through an archived asset; an asset first reached
//! that way and later through a live one is revisited once to upgrade its
//! [`Reason`]. Any other asset is visited once, so malformed trees with
//! cycles terminate.

use std::collections::{BTreeMap, VecDeque};

use pype_core::types::DocId;

use crate::index::AssetIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Reason {
    ProjectRoot,
    /// The asset owns subsets itself.
    OwnsSubsets,
    /// A live descendant owns subsets.
    LiveDescendant,
    /// Only archived descendants own subsets.
    ArchivedDescendant,
}

impl Reason {
    pub fn describe(&self) -> &'static str {
        match self {
            Reason::ProjectRoot => "project root",
            Reason::OwnsSubsets => "contains published data",
            Reason::LiveDescendant => "a child contains published data",
            Reason::ArchivedDescendant => "an archived child contains published data",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changeability {
    unchangeable: BTreeMap<DocId, Reason>,
}

impl Changeability {
    pub fn compute(index: &AssetIndex) -> Self {
        let mut unchangeable = BTreeMap::new();
        unchangeable.insert(index.project().id.clone(), Reason::ProjectRoot);

        let mut queue: VecDeque<(DocId, bool, bool)> = index
            .subset_parents()
            .iter()
            .map(|id| (id.clone(), false, true))
            .collect();

        while let Some((id, via_archived, owner)) = queue.pop_front() {
            let reason = if owner {
                Reason::OwnsSubsets
            } else if via_archived {
                Reason::ArchivedDescendant
            } else {
                Reason::LiveDescendant
            };
            match unchangeable.get(&id) {
                Some(Reason::ArchivedDescendant) if reason < Reason::ArchivedDescendant => {}
                Some(_) => continue,
                None => {}
            }
            unchangeable.insert(id.clone(), reason);

            let (asset, archived) = match (index.get(&id), index.get_archived(&id)) {
                (Some(asset), _) => (asset, false),
                (None, Some(asset)) => (asset, true),
                (None, None) => {
                    if index.is_project(&id) {
                        unchangeable.insert(id, Reason::ProjectRoot);
                    } else if owner {
                        tracing::warn!("parent {id} of subsets does not exist");
                    } else {
                        tracing::warn!("asset {id} has no valid parent chain to the project");
                    }
                    continue;
                }
            };
            let Some(parent) = asset.data.visual_parent.clone() else {
                continue;
            };
            queue.push_back((parent, via_archived || archived, false));
        }

        Self { unchangeable }
    }

    pub fn is_changeable(&self, id: &DocId) -> bool {
        !self.unchangeable.contains_key(id)
    }

    pub fn reason(&self, id: &DocId) -> Option<Reason> {
        self.unchangeable.get(id).copied()
    }

    pub fn unchangeable(&self) -> impl Iterator<Item = (&DocId, Reason)> {
        self.unchangeable.iter().map(|(id, r)| (id, *r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pype_core::types::{AssetData, AssetDoc, DocType, ProjectData, ProjectDoc};

    fn project() -> ProjectDoc {
        ProjectDoc {
            id: "root".into(),
            doc_type: DocType::Project,
            name: "demo".into(),
            data: ProjectData::default(),
            config: Default::default(),
        }
    }

    fn asset(id: &str, parent: Option<&str>, archived: bool) -> AssetDoc {
        AssetDoc {
            id: id.into(),
            doc_type: if archived {
                DocType::ArchivedAsset
            } else {
                DocType::Asset
            },
            schema: pype_core::types::ASSET_SCHEMA.into(),
            name: id.into(),
            parent: "root".into(),
            data: AssetData {
                visual_parent: parent.map(DocId::from),
                ..AssetData::default()
            },
        }
    }

    #[test]
    fn cycle_terminates() {
        let index = AssetIndex::new(
            project(),
            [asset("a", Some("b"), false), asset("b", Some("a"), false)],
            [DocId::from("a")],
        );
        let c = Changeability::compute(&index);
        assert!(!c.is_changeable(&"a".into()));
        assert!(!c.is_changeable(&"b".into()));
    }

    #[test]
    fn live_path_upgrades_archived_reason() {
        let index = AssetIndex::new(
            project(),
            [
                asset("p", None, false),
                asset("old", Some("p"), true),
                asset("new", Some("p"), false),
            ],
            [DocId::from("old"), DocId::from("new")],
        );
        let c = Changeability::compute(&index);
        assert_eq!(c.reason(&"p".into()), Some(Reason::LiveDescendant));
    }

    #[test]
    fn missing_subset_parent_is_tolerated() {
        let index = AssetIndex::new(project(), [asset("p", None, false)], [DocId::from("ghost")]);
        let c = Changeability::compute(&index);
        assert!(c.is_changeable(&"p".into()));
        assert_eq!(c.reason(&"root".into()), Some(Reason::ProjectRoot));
    }
}
