//! Per-event view of the project's asset tree.
//!
//! Loaded once when an event starts and kept in step with every write the
//! processor makes, so later phases see the effect of earlier ones.

use std::collections::{BTreeMap, BTreeSet};

use pype_core::store::{DocumentStore, DocumentStoreExt, Filter};
use pype_core::types::{AssetDoc, DocId, DocType, ProjectDoc, SubsetDoc};

use crate::error::SyncError;

#[derive(Debug, Clone)]
pub struct AssetIndex {
    project: ProjectDoc,
    live: BTreeMap<DocId, AssetDoc>,
    archived: BTreeMap<DocId, AssetDoc>,
    /// Asset ids owning at least one subset.
    subset_parents: BTreeSet<DocId>,
}

impl AssetIndex {
    pub fn load<D: DocumentStore + ?Sized>(store: &D, project: &str) -> Result<Self, SyncError> {
        let project_doc: ProjectDoc = store
            .find_one_as(project, &Filter::new().eq("type", DocType::Project))?
            .ok_or_else(|| SyncError::ProjectMissing(project.to_owned()))?;
        let live: Vec<AssetDoc> = store.find_as(project, &Filter::new().eq("type", DocType::Asset))?;
        let archived: Vec<AssetDoc> =
            store.find_as(project, &Filter::new().eq("type", DocType::ArchivedAsset))?;
        let subsets: Vec<SubsetDoc> =
            store.find_as(project, &Filter::new().eq("type", DocType::Subset))?;
        tracing::debug!(
            "project {project}: {} asset(s), {} archived, {} subset(s)",
            live.len(),
            archived.len(),
            subsets.len()
        );
        Ok(Self::new(
            project_doc,
            live.into_iter().chain(archived),
            subsets.into_iter().map(|s| s.parent),
        ))
    }

    pub fn new(
        project: ProjectDoc,
        assets: impl IntoIterator<Item = AssetDoc>,
        subset_parents: impl IntoIterator<Item = DocId>,
    ) -> Self {
        let mut live = BTreeMap::new();
        let mut archived = BTreeMap::new();
        for asset in assets {
            if asset.is_archived() {
                archived.insert(asset.id.clone(), asset);
            } else {
                live.insert(asset.id.clone(), asset);
            }
        }
        Self {
            project,
            live,
            archived,
            subset_parents: subset_parents.into_iter().collect(),
        }
    }

    pub fn project(&self) -> &ProjectDoc {
        &self.project
    }

    pub fn is_project(&self, id: &DocId) -> bool {
        self.project.id == *id
    }

    pub fn subset_parents(&self) -> &BTreeSet<DocId> {
        &self.subset_parents
    }

    pub fn get(&self, id: &DocId) -> Option<&AssetDoc> {
        self.live.get(id)
    }

    pub fn get_archived(&self, id: &DocId) -> Option<&AssetDoc> {
        self.archived.get(id)
    }

    pub fn assets(&self) -> impl Iterator<Item = &AssetDoc> {
        self.live.values()
    }

    pub fn by_ftrack_id(&self, ftrack_id: &str) -> Option<&AssetDoc> {
        self.live
            .values()
            .find(|a| a.data.ftrack_id.as_deref() == Some(ftrack_id))
    }

    pub fn by_name(&self, name: &str) -> Option<&AssetDoc> {
        self.live.values().find(|a| a.name == name)
    }

    pub fn archived_by_name(&self, name: &str) -> Option<&AssetDoc> {
        self.archived.values().find(|a| a.name == name)
    }

    pub fn children(&self, id: &DocId) -> Vec<&AssetDoc> {
        let parent = if self.is_project(id) {
            None
        } else {
            Some(id)
        };
        self.live
            .values()
            .filter(|a| a.data.visual_parent.as_ref() == parent)
            .collect()
    }

    pub fn is_project_ftrack_id(&self, ftrack_id: &str) -> bool {
        self.project.data.ftrack_id.as_deref() == Some(ftrack_id)
    }

    /// Names of the visual ancestors of `id`, top first.
    pub fn parents_of(&self, id: &DocId) -> Vec<String> {
        let mut names = Vec::new();
        let mut seen = BTreeSet::new();
        let mut current = self.get(id).and_then(|a| a.data.visual_parent.clone());
        while let Some(parent_id) = current {
            if !seen.insert(parent_id.clone()) {
                tracing::warn!("asset {id} has a visual parent cycle");
                break;
            }
            let Some(parent) = self.get(&parent_id) else {
                break;
            };
            names.push(parent.name.clone());
            current = parent.data.visual_parent.clone();
        }
        names.reverse();
        names
    }

    /// `<project>/<parents...>/<name>` for reports.
    pub fn path(&self, asset: &AssetDoc) -> String {
        let mut items = vec![self.project.name.clone()];
        items.extend(asset.data.parents.iter().cloned());
        items.push(asset.name.clone());
        items.join("/")
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    pub fn insert(&mut self, asset: AssetDoc) {
        self.archived.remove(&asset.id);
        self.live.insert(asset.id.clone(), asset);
    }

    pub fn archive(&mut self, id: &DocId) {
        if let Some(mut asset) = self.live.remove(id) {
            asset.doc_type = DocType::ArchivedAsset;
            self.archived.insert(id.clone(), asset);
        }
    }

    pub fn get_mut(&mut self, id: &DocId) -> Option<&mut AssetDoc> {
        self.live.get_mut(id)
    }
}
