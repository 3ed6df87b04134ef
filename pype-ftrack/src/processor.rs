//! Applies tracker events to the project's asset documents.
//!
//! # Phases
//!
//! 1. **Removed**: changeable assets are archived (`type: archived_asset`);
//!    unchangeable ones are recreated in the tracker and rebound.
//! 2. **Renamed**: changeable assets take the new name when it is free and
//!    valid; unchangeable ones are renamed back in the tracker.
//! 3. **Added**: new entities get asset documents, parents first.
//! 4. **Moved**: changeable assets take the new visual parent; unchangeable
//!    ones are moved back in the tracker.
//! 5. **Updated**: description and custom attribute values.
//! 6. **Hierarchy**: `data.parents` of moved/renamed subtrees and inherited
//!    hierarchical attribute values.
//! 7. **Tasks**: `data.tasks` of every entity whose tasks changed.
//!
//! Removal goes first so later phases do not collide with stale names; field
//! updates go last because they may target assets created or moved earlier
//! in the same event. Archival, creation and rebinding are written as they
//! happen; everything else is collected in [`Updates`] and written as one
//! batch at the end.
//!
//! Tracker writes (renaming back, moving back, storing ids) may fail; such
//! failures land in the [`SyncReport`] and processing continues.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde_json::Value;

use pype_core::settings::{FtrackSettings, UnchangeableRemovePolicy};
use pype_core::store::{DocumentStore, Filter, Update, WriteOp};
use pype_core::types::{AssetData, AssetDoc, DocId, DocType, TaskInfo, ASSET_SCHEMA};

use crate::changeability::Changeability;
use crate::error::SyncError;
use crate::event::{classify, ChangeMap, EventBatch, TrackerEvent};
use crate::index::AssetIndex;
use crate::patterns::{NameKind, SchemaPatterns};
use crate::report::SyncReport;
use crate::tracker::{
    CustomAttribute, TrackerEntity, TrackerSession, CUST_ATTR_AUTO_SYNC, CUST_ATTR_ID_KEY,
};
use crate::updates::Updates;

/// Custom attributes holding a frame rate.
const FPS_KEYS: [&str; 2] = ["fps", "fps_string"];

pub const MSG_RECREATED: &str = "Deleted entity was recreated";
pub const MSG_RECREATE_FAILED: &str = "Couldn't recreate entity in Ftrack";
pub const MSG_RECREATE_ATTRS_FAILED: &str =
    "Couldn't update custom attributes after recreation of entity in Ftrack";
pub const MSG_REMOVE_REFUSED: &str = "Removed entity contains published data and was kept";
pub const MSG_RENAMED_BACK: &str = "Entity renamed back";
pub const MSG_RENAME_BACK_FAILED: &str = "Couldn't rename the entity back to its original name";
pub const MSG_MOVED_BACK: &str = "Entity was moved back";
pub const MSG_MOVE_BACK_FAILED: &str = "Couldn't move the entity back to its original parent";
pub const MSG_PARENT_NOT_SYNCED: &str = "New parent of entity is not synchronized";
pub const MSG_ID_STORE_FAILED: &str = "Failed to store document id to entity's custom attribute";
pub const MSG_INVALID_FPS: &str = "These entities have invalid fps value in custom attributes";
pub const MSG_SYNC_FAILED: &str = "An error has happened during synchronization";
pub const MSG_AUTO_SYNC_MISSING: &str = "Custom attribute \"avalon_auto_sync\" is not accessible";

/// Where an entity sits in the document tree: under the project root or
/// under an asset.
type VisualParent = Option<DocId>;

/// State of one event. Created per event and dropped with it.
struct EventState {
    index: AssetIndex,
    changeability: Changeability,
    patterns: SchemaPatterns,
    attributes: Vec<CustomAttribute>,
    project_ftrack_id: String,
    report: SyncReport,
    moved_in_db: Vec<DocId>,
    renamed_in_db: Vec<DocId>,
    /// Hierarchical attribute key -> tracker ids whose value changed.
    hier_changes: BTreeMap<String, BTreeSet<String>>,
    task_parents: BTreeSet<String>,
    duplicated: Vec<String>,
    regex_failed: Vec<String>,
}

impl EventState {
    fn attribute(&self, key: &str) -> Option<&CustomAttribute> {
        self.attributes.iter().find(|a| a.key == key)
    }
}

pub struct SyncProcessor<'a, D: DocumentStore + ?Sized, T: TrackerSession + ?Sized> {
    store: &'a mut D,
    tracker: &'a mut T,
    settings: &'a FtrackSettings,
    project: String,
}

impl<'a, D: DocumentStore + ?Sized, T: TrackerSession + ?Sized> SyncProcessor<'a, D, T> {
    pub fn new(
        store: &'a mut D,
        tracker: &'a mut T,
        settings: &'a FtrackSettings,
        project: impl Into<String>,
    ) -> Self {
        Self {
            store,
            tracker,
            settings,
            project: project.into(),
        }
    }

    /// Process one event. Failures inside the phases are recorded in the
    /// report; only failing to load the project is returned as an error.
    pub fn process(&mut self, event: &TrackerEvent) -> Result<SyncReport, SyncError> {
        let mut batch = classify(event, self.settings);
        let mut report = SyncReport::default();
        if batch.project_removed {
            return Ok(report);
        }
        if let Some(on) = batch.auto_sync_toggled {
            if on {
                tracing::info!(
                    "auto sync was turned on for project {}, full synchronization requested",
                    self.project
                );
                report.full_sync_requested = true;
            }
            return Ok(report);
        }
        if batch.is_empty() {
            tracing::debug!("nothing to synchronize in event");
            return Ok(report);
        }

        let tracker_project = self.tracker.project()?;
        match tracker_project.custom_attributes.get(CUST_ATTR_AUTO_SYNC) {
            None => {
                tracing::error!(
                    "custom attribute {CUST_ATTR_AUTO_SYNC} is missing on project {}",
                    tracker_project.full_name
                );
                report.error(MSG_AUTO_SYNC_MISSING, tracker_project.full_name);
                return Ok(report);
            }
            Some(Value::Bool(true)) => {}
            Some(_) => {
                tracing::debug!("auto sync is off for project {}", tracker_project.full_name);
                return Ok(report);
            }
        }

        let index = AssetIndex::load(&*self.store, &self.project)?;
        let mut state = EventState {
            changeability: Changeability::compute(&index),
            index,
            patterns: SchemaPatterns::new(self.settings.name_patterns.clone()),
            attributes: self.tracker.custom_attributes()?,
            project_ftrack_id: tracker_project.id,
            report,
            moved_in_db: Vec::new(),
            renamed_in_db: Vec::new(),
            hier_changes: BTreeMap::new(),
            task_parents: std::mem::take(&mut batch.task_parents),
            duplicated: Vec::new(),
            regex_failed: Vec::new(),
        };
        tracing::debug!(
            "project changes <{}>: updated {} | renamed {} | created {} | removed {} | moved {}",
            self.project,
            batch.updated.len(),
            batch.renamed.len(),
            batch.added.len(),
            batch.removed.len(),
            batch.moved.len()
        );

        if let Err(err) = self.run(&mut state, batch) {
            tracing::error!("synchronization of project {} failed: {err}", self.project);
            state.report.error(MSG_SYNC_FAILED, err.to_string());
        }
        self.finish_report(&mut state);
        Ok(state.report)
    }

    fn run(&mut self, state: &mut EventState, batch: EventBatch) -> Result<(), SyncError> {
        let EventBatch {
            removed,
            renamed,
            moved,
            mut added,
            updated,
            ..
        } = batch;
        let updates = self.process_removed(state, &removed, Updates::new())?;
        let updates = self.process_renamed(state, &renamed, &mut added, updates)?;
        let updates = self.process_added(state, &added, updates)?;
        let updates = self.process_moved(state, &moved, updates)?;
        let updates = self.process_updated(state, &updated, updates)?;
        let updates = self.process_hierarchy(state, updates)?;
        let updates = self.process_tasks(state, updates)?;
        self.commit(updates)
    }

    fn commit(&mut self, updates: Updates) -> Result<(), SyncError> {
        if updates.is_empty() {
            return Ok(());
        }
        let ops: Vec<WriteOp> = updates.into_ops();
        tracing::debug!("writing {} document update(s)", ops.len());
        self.store.bulk_write(&self.project, ops)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Removed
    // -----------------------------------------------------------------------

    fn process_removed(
        &mut self,
        state: &mut EventState,
        removed: &ChangeMap,
        updates: Updates,
    ) -> Result<Updates, SyncError> {
        if removed.is_empty() {
            return Ok(updates);
        }
        tracing::debug!("processing {} removed entities", removed.len());
        let mut removable = Vec::new();
        let mut removed_names = Vec::new();
        let mut recreate = Vec::new();
        for (ftrack_id, change) in removed {
            if change.is_task() {
                continue;
            }
            let Some(asset) = state.index.by_ftrack_id(ftrack_id) else {
                continue;
            };
            if state.changeability.is_changeable(&asset.id) {
                removable.push(asset.id.clone());
                removed_names.push(change.old_value("name").unwrap_or(&asset.name).to_owned());
            } else {
                recreate.push(asset.clone());
            }
        }

        if !removable.is_empty() {
            tracing::debug!("assets marked as archived <{}>", removed_names.join(", "));
            self.store.update_many(
                &self.project,
                &Filter::new()
                    .any_of("_id", removable.iter())
                    .eq("type", DocType::Asset),
                &Update::new().set("type", DocType::ArchivedAsset),
            )?;
            for id in &removable {
                state.index.archive(id);
            }
        }

        let updates = self.recreate_removed(state, recreate, updates)?;
        if !removed_names.is_empty() {
            self.check_names_synchronizable(state, &removed_names)?;
        }
        Ok(updates)
    }

    /// Give assets whose tracker entity was removed a new tracker entity,
    /// keeping the asset document and everything published under it.
    fn recreate_removed(
        &mut self,
        state: &mut EventState,
        mut recreate: Vec<AssetDoc>,
        mut updates: Updates,
    ) -> Result<Updates, SyncError> {
        if recreate.is_empty() {
            return Ok(updates);
        }
        if self.settings.unchangeable_remove_policy == UnchangeableRemovePolicy::ReportOnly {
            for asset in &recreate {
                let path = state.index.path(asset);
                tracing::warn!("removed entity contains published data <{path}>");
                state.report.warn(MSG_REMOVE_REFUSED, path);
            }
            return Ok(updates);
        }

        recreate.sort_by_key(|a| a.data.parents.len());
        for asset in recreate {
            let path = state.index.path(&asset);
            let parent_ftrack_id = match &asset.data.visual_parent {
                None => Some(state.project_ftrack_id.clone()),
                Some(parent) => state.index.get(parent).and_then(|p| p.data.ftrack_id.clone()),
            };
            let Some(parent_ftrack_id) = parent_ftrack_id else {
                tracing::warn!("parent of {path} is not bound to the tracker");
                state.report.warn(MSG_RECREATE_FAILED, path);
                continue;
            };
            let entity_type = asset.data.entity_type.as_deref().unwrap_or("Folder");
            let created = match self
                .tracker
                .create_entity(entity_type, &asset.name, &parent_ftrack_id)
            {
                Ok(created) => created,
                Err(err) => {
                    tracing::warn!("{MSG_RECREATE_FAILED} <{path}>: {err}");
                    state.report.warn(MSG_RECREATE_FAILED, path);
                    continue;
                }
            };

            let mut values: Vec<(String, Value)> = asset
                .data
                .extra
                .iter()
                .filter(|(key, value)| {
                    !key.starts_with("avalon_")
                        && !is_empty_value(value)
                        && state.attribute(key).is_some()
                })
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            values.push((CUST_ATTR_ID_KEY.to_owned(), Value::from(asset.id.as_str())));
            let failed = values.into_iter().any(|(key, value)| {
                self.tracker
                    .set_custom_attribute(&created.id, &key, value)
                    .is_err()
            });
            if failed {
                tracing::warn!("{MSG_RECREATE_ATTRS_FAILED} <{path}>");
                state.report.warn(MSG_RECREATE_ATTRS_FAILED, path);
                continue;
            }

            state.report.info(MSG_RECREATED, path);
            if let Some(old) = &asset.data.ftrack_id {
                state.report.recreated.insert(old.clone(), created.id.clone());
            }
            updates.set(&asset.id, "data.ftrackId", created.id.clone());
            if let Some(doc) = state.index.get_mut(&asset.id) {
                doc.data.ftrack_id = Some(created.id);
            }
        }
        Ok(updates)
    }

    /// After names were freed by removal or renaming, synchronise tracker
    /// entities that carry one of them and were blocked as duplicates.
    fn check_names_synchronizable(
        &mut self,
        state: &mut EventState,
        names: &[String],
    ) -> Result<(), SyncError> {
        let mut by_name: BTreeMap<String, Vec<TrackerEntity>> = BTreeMap::new();
        for entity in self.tracker.entities_named(names)? {
            by_name.entry(entity.name.clone()).or_default().push(entity);
        }

        let mut ready = Vec::new();
        for (name, entities) in by_name {
            if entities.len() != 1 {
                tracing::debug!("name \"{name}\" still has {} entities", entities.len());
                continue;
            }
            let Some(entity) = entities.into_iter().next() else {
                continue;
            };
            if state.index.by_ftrack_id(&entity.id).is_some() {
                continue;
            }
            let Some(parent) = self.resolve_parent(state, &entity.parent_id) else {
                tracing::debug!("parent of \"{name}\" is not synchronized, skipping");
                continue;
            };
            let depth = self.tracker.link(&entity.id)?.len();
            ready.push((depth, entity, parent));
        }
        ready.sort_by_key(|(depth, ..)| *depth);

        let mut queue = VecDeque::new();
        for (_, entity, parent) in ready {
            if self.create_asset(state, &entity, parent)?.is_some() {
                queue.extend(self.tracker.children(&entity.id)?);
            }
        }
        while let Some(entity) = queue.pop_front() {
            if state.index.by_ftrack_id(&entity.id).is_some() {
                tracing::error!(
                    "entity {} is already synchronized below a freshly created parent",
                    entity.id
                );
                continue;
            }
            if state.index.by_name(&entity.name).is_some() {
                continue;
            }
            if !state.patterns.check(&entity.name, NameKind::Asset)? {
                continue;
            }
            let Some(parent) = self.resolve_parent(state, &entity.parent_id) else {
                continue;
            };
            if self.create_asset(state, &entity, parent)?.is_some() {
                queue.extend(self.tracker.children(&entity.id)?);
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Renamed
    // -----------------------------------------------------------------------

    fn process_renamed(
        &mut self,
        state: &mut EventState,
        renamed: &ChangeMap,
        added: &mut ChangeMap,
        mut updates: Updates,
    ) -> Result<Updates, SyncError> {
        if renamed.is_empty() {
            return Ok(updates);
        }
        tracing::debug!("processing {} renamed entities", renamed.len());
        let mut queue: VecDeque<(String, DocId, String)> = VecDeque::new();
        for (ftrack_id, change) in renamed {
            if change.is_task() || change.is_project() {
                continue;
            }
            let Some(new_name) = change.new_value("name") else {
                continue;
            };
            let Some(asset) = state.index.by_ftrack_id(ftrack_id) else {
                tracing::debug!("renamed entity {ftrack_id} is not synchronized, adding it");
                added.insert(ftrack_id.clone(), change.clone());
                continue;
            };
            if asset.name == new_name {
                continue;
            }
            if state.changeability.is_changeable(&asset.id) {
                queue.push_back((ftrack_id.clone(), asset.id.clone(), new_name.to_owned()));
                continue;
            }
            let path = state.index.path(asset);
            match self.tracker.set_name(ftrack_id, &asset.name) {
                Ok(()) => {
                    tracing::warn!("{MSG_RENAMED_BACK} <{path}>");
                    state.report.info(MSG_RENAMED_BACK, path);
                }
                Err(err) => {
                    tracing::warn!("{MSG_RENAME_BACK_FAILED} <{path}>: {err}");
                    state.report.warn(MSG_RENAME_BACK_FAILED, path);
                }
            }
        }

        let mut old_names: Vec<String> = Vec::new();
        // Entries waiting for a name another queued entry is about to free.
        let mut deferred = 0;
        while let Some((ftrack_id, id, new_name)) = queue.pop_front() {
            if !state.patterns.check(&new_name, NameKind::Asset)? {
                state.regex_failed.push(ftrack_id);
                continue;
            }
            if let Some(holder) = state.index.by_name(&new_name) {
                let holder_pending = holder
                    .data
                    .ftrack_id
                    .as_deref()
                    .is_some_and(|f| queue.iter().any(|(queued, ..)| queued == f));
                if holder_pending && deferred < queue.len() {
                    deferred += 1;
                    queue.push_back((ftrack_id, id, new_name));
                } else {
                    state.duplicated.push(ftrack_id);
                }
                continue;
            }
            let Some(asset) = state.index.get_mut(&id) else {
                continue;
            };
            let old_name = std::mem::replace(&mut asset.name, new_name.clone());
            tracing::debug!("name of asset {id} will be changed from \"{old_name}\" to \"{new_name}\"");
            updates.set(&id, "name", new_name.clone());
            state.renamed_in_db.push(id);
            old_names.retain(|n| *n != new_name);
            old_names.push(old_name);
            deferred = 0;
        }

        if !old_names.is_empty() {
            self.check_names_synchronizable(state, &old_names)?;
        }
        Ok(updates)
    }

    // -----------------------------------------------------------------------
    // Added
    // -----------------------------------------------------------------------

    fn process_added(
        &mut self,
        state: &mut EventState,
        added: &ChangeMap,
        updates: Updates,
    ) -> Result<Updates, SyncError> {
        if added.is_empty() {
            return Ok(updates);
        }
        tracing::debug!("processing {} added entities", added.len());
        let mut pending = Vec::new();
        for (ftrack_id, change) in added {
            if state.index.by_ftrack_id(ftrack_id).is_some() {
                tracing::warn!("added entity {ftrack_id} is already synchronized");
                continue;
            }
            if change.is_task() {
                continue;
            }
            let Some(mut entity) = self.tracker.entity(ftrack_id)? else {
                tracing::debug!("added entity {ftrack_id} no longer exists");
                continue;
            };
            let link = self.tracker.link(ftrack_id)?;
            let parents = parents_from_link(&link);

            let unbound = state
                .index
                .by_name(&entity.name)
                .filter(|a| a.data.ftrack_id.is_none() && a.data.parents == parents)
                .map(|a| a.id.clone());
            if let Some(id) = unbound {
                self.store.update_one(
                    &self.project,
                    &Filter::by_id(&id),
                    &Update::new()
                        .set("data.ftrackId", ftrack_id.as_str())
                        .set("data.entityType", entity.entity_type.as_str()),
                )?;
                if let Some(asset) = state.index.get_mut(&id) {
                    asset.data.ftrack_id = Some(ftrack_id.clone());
                    asset.data.entity_type = Some(entity.entity_type.clone());
                }
                tracing::debug!("asset {id} bound to tracker entity {ftrack_id}");
                continue;
            }

            // A copied entity carries the document id of its source.
            if let Err(err) =
                self.tracker
                    .set_custom_attribute(ftrack_id, CUST_ATTR_ID_KEY, Value::from(""))
            {
                tracing::warn!("could not unset document id of {ftrack_id}: {err}");
            }
            entity
                .custom_attributes
                .insert(CUST_ATTR_ID_KEY.to_owned(), Value::from(""));
            pending.push((link.len(), entity));
        }
        pending.sort_by_key(|(depth, _)| *depth);

        for (_, entity) in pending {
            if entity.entity_type.eq_ignore_ascii_case("project") {
                state
                    .report
                    .error("Project can't be created with event handler", entity.name);
                continue;
            }
            let Some(parent) = self.resolve_parent(state, &entity.parent_id) else {
                tracing::debug!(
                    "skipping {} because its parent is not synchronized",
                    entity.name
                );
                continue;
            };
            let mut synchronizable = true;
            if !state.patterns.check(&entity.name, NameKind::Asset)? {
                state.regex_failed.push(entity.id.clone());
                synchronizable = false;
            }
            if state.index.by_name(&entity.name).is_some() {
                state.duplicated.push(entity.id.clone());
                synchronizable = false;
            }
            if synchronizable {
                self.create_asset(state, &entity, parent)?;
            }
        }
        Ok(updates)
    }

    /// Where `parent_ftrack_id` sits in the document tree, `None` when it is
    /// not synchronised.
    fn resolve_parent(&self, state: &EventState, parent_ftrack_id: &str) -> Option<VisualParent> {
        if parent_ftrack_id == state.project_ftrack_id
            || state.index.is_project_ftrack_id(parent_ftrack_id)
        {
            return Some(None);
        }
        state
            .index
            .by_ftrack_id(parent_ftrack_id)
            .map(|a| Some(a.id.clone()))
    }

    /// Insert (or unarchive) the asset document for `entity`.
    fn create_asset(
        &mut self,
        state: &mut EventState,
        entity: &TrackerEntity,
        visual_parent: VisualParent,
    ) -> Result<Option<AssetDoc>, SyncError> {
        let link = self.tracker.link(&entity.id)?;
        let parents = parents_from_link(&link);
        let path = link.join("/");
        tracing::debug!("trying to synchronize entity <{path}>");
        state.task_parents.insert(entity.id.clone());

        let mut extra = BTreeMap::new();
        extra.insert("description".to_owned(), Value::from(entity.description.as_str()));
        let mut invalid_fps = Vec::new();
        for (key, value) in self.attribute_values(state, entity)? {
            if FPS_KEYS.contains(&key.as_str()) {
                match convert_fps(&value) {
                    Some(fps) => {
                        extra.insert(key, fps);
                    }
                    None => invalid_fps.push(format!("{path} - \"{value}\"")),
                }
                continue;
            }
            extra.insert(key, value);
        }
        for item in invalid_fps {
            state.report.error(MSG_INVALID_FPS, item);
        }

        let mut id = DocId::generate();
        if let Some(Value::String(bound)) = entity.custom_attributes.get(CUST_ATTR_ID_KEY) {
            let bound = DocId::from(bound.as_str());
            if !bound.as_str().is_empty()
                && state.index.get(&bound).is_none()
                && state.index.get_archived(&bound).is_none()
            {
                id = bound;
            }
        }

        let mut asset = AssetDoc {
            id,
            doc_type: DocType::Asset,
            schema: ASSET_SCHEMA.to_owned(),
            name: entity.name.clone(),
            parent: state.index.project().id.clone(),
            data: AssetData {
                ftrack_id: Some(entity.id.clone()),
                entity_type: Some(entity.entity_type.clone()),
                visual_parent,
                hierarchy: parents.join("/"),
                parents: parents.clone(),
                tasks: BTreeMap::new(),
                extra,
            },
        };
        if asset.name.is_empty() {
            tracing::error!("refusing to create an asset without a name <{path}>");
            state
                .report
                .error("Schema validation failed for new entity", path);
            return Ok(None);
        }

        let unarchive = state
            .index
            .archived_by_name(&asset.name)
            .filter(|archived| {
                archived.data.parents == parents
                    || state.changeability.is_changeable(&archived.id)
            })
            .map(|archived| archived.id.clone());
        match unarchive {
            Some(archived_id) => {
                tracing::debug!("entity was unarchived instead of created <{path}>");
                asset.id = archived_id;
                self.store.replace_one(
                    &self.project,
                    &Filter::by_id(&asset.id),
                    serde_json::to_value(&asset)?,
                )?;
            }
            None => {
                self.store.insert_one(&self.project, serde_json::to_value(&asset)?)?;
                tracing::debug!("entity was synchronized <{path}>");
            }
        }

        let stored = entity
            .custom_attributes
            .get(CUST_ATTR_ID_KEY)
            .and_then(Value::as_str);
        if stored != Some(asset.id.as_str()) {
            if let Err(err) = self.tracker.set_custom_attribute(
                &entity.id,
                CUST_ATTR_ID_KEY,
                Value::from(asset.id.as_str()),
            ) {
                tracing::error!("{MSG_ID_STORE_FAILED} <{path}>: {err}");
                state.report.warn(MSG_ID_STORE_FAILED, path);
            }
        }

        state.index.insert(asset.clone());
        Ok(Some(asset))
    }

    /// Custom attribute values to store on a new asset: the entity's own
    /// values plus the inherited value of every hierarchical attribute.
    fn attribute_values(
        &self,
        state: &EventState,
        entity: &TrackerEntity,
    ) -> Result<BTreeMap<String, Value>, SyncError> {
        let mut values = BTreeMap::new();
        for attr in &state.attributes {
            if attr.key.starts_with("avalon_") {
                continue;
            }
            let value = if attr.hierarchical {
                match own_value(entity, attr) {
                    Some(value) => Some(value),
                    None => Some(self.inherited_value(state, &entity.parent_id, attr)?),
                }
            } else {
                own_value(entity, attr)
            };
            if let Some(value) = value.filter(|v| !v.is_null()) {
                values.insert(attr.key.clone(), value);
            }
        }
        Ok(values)
    }

    /// Value of a hierarchical attribute as inherited from `ftrack_id` and its
    /// ancestors, falling back to the project value and then the default.
    fn inherited_value(
        &self,
        state: &EventState,
        ftrack_id: &str,
        attr: &CustomAttribute,
    ) -> Result<Value, SyncError> {
        let mut current = ftrack_id.to_owned();
        let mut seen = BTreeSet::new();
        while current != state.project_ftrack_id && seen.insert(current.clone()) {
            let Some(entity) = self.tracker.entity(&current)? else {
                break;
            };
            if let Some(value) = own_value(&entity, attr) {
                return Ok(value);
            }
            current = entity.parent_id;
        }
        let project = self.tracker.project()?;
        Ok(project
            .custom_attributes
            .get(&attr.key)
            .filter(|v| !v.is_null())
            .and_then(|v| attr.convert(v))
            .unwrap_or_else(|| attr.default.clone()))
    }

    // -----------------------------------------------------------------------
    // Moved
    // -----------------------------------------------------------------------

    fn process_moved(
        &mut self,
        state: &mut EventState,
        moved: &ChangeMap,
        mut updates: Updates,
    ) -> Result<Updates, SyncError> {
        if moved.is_empty() {
            return Ok(updates);
        }
        tracing::debug!("processing {} moved entities", moved.len());
        let mut assets: Vec<(AssetDoc, String)> = moved
            .iter()
            .filter_map(|(ftrack_id, change)| {
                let asset = state.index.by_ftrack_id(ftrack_id)?.clone();
                let new_parent = change.new_value("parent_id")?.to_owned();
                Some((asset, new_parent))
            })
            .collect();
        assets.sort_by_key(|(asset, _)| asset.data.parents.len());

        for (asset, new_parent) in assets {
            let path = state.index.path(&asset);
            let Some(ftrack_id) = asset.data.ftrack_id.clone() else {
                continue;
            };
            if state.changeability.is_changeable(&asset.id) {
                let Some(parent) = self.resolve_parent(state, &new_parent) else {
                    tracing::warn!("{MSG_PARENT_NOT_SYNCED} <{path}>");
                    state.report.warn(MSG_PARENT_NOT_SYNCED, path);
                    continue;
                };
                updates.set(
                    &asset.id,
                    "data.visualParent",
                    parent.clone().map(Value::from).unwrap_or(Value::Null),
                );
                if let Some(doc) = state.index.get_mut(&asset.id) {
                    doc.data.visual_parent = parent;
                }
                tracing::debug!("parent of asset {} was changed <{path}>", asset.id);
                state.moved_in_db.push(asset.id);
                continue;
            }

            let original_parent = match &asset.data.visual_parent {
                None => Some(state.project_ftrack_id.clone()),
                Some(parent) => state.index.get(parent).and_then(|p| p.data.ftrack_id.clone()),
            };
            let Some(mut original_parent) = original_parent else {
                tracing::warn!("original parent of {path} is not bound to the tracker");
                state.report.warn(MSG_MOVE_BACK_FAILED, path);
                continue;
            };
            if let Some(recreated) = state.report.recreated.get(&original_parent) {
                original_parent = recreated.clone();
            }
            let Some(entity) = self.tracker.entity(&ftrack_id)? else {
                continue;
            };
            if entity.parent_id == original_parent {
                continue;
            }
            match self.tracker.set_parent(&ftrack_id, &original_parent) {
                Ok(()) => {
                    tracing::warn!("{MSG_MOVED_BACK} <{path}>");
                    state.report.info(MSG_MOVED_BACK, path);
                }
                Err(err) => {
                    tracing::warn!("{MSG_MOVE_BACK_FAILED} <{path}>: {err}");
                    state.report.warn(MSG_MOVE_BACK_FAILED, path);
                }
            }
        }
        Ok(updates)
    }

    // -----------------------------------------------------------------------
    // Updated
    // -----------------------------------------------------------------------

    fn process_updated(
        &mut self,
        state: &mut EventState,
        updated: &ChangeMap,
        mut updates: Updates,
    ) -> Result<Updates, SyncError> {
        if updated.is_empty() {
            return Ok(updates);
        }
        tracing::debug!("processing {} updated entities", updated.len());
        for (ftrack_id, change) in updated {
            let id = if change.is_project() {
                state.index.project().id.clone()
            } else {
                match state.index.by_ftrack_id(ftrack_id) {
                    Some(asset) => asset.id.clone(),
                    None => continue,
                }
            };

            if let Some(description) = change.changes.get("description") {
                let text = description.new.as_str().unwrap_or_default();
                updates.set(&id, "data.description", text);
            }
            for (key, values) in &change.changes {
                let Some(attr) = state.attribute(key) else {
                    continue;
                };
                if attr.hierarchical {
                    state
                        .hier_changes
                        .entry(key.clone())
                        .or_default()
                        .insert(ftrack_id.clone());
                    continue;
                }
                let Some(value) = attr.convert(&values.new) else {
                    continue;
                };
                if change.is_project() && key == "applications" {
                    updates.set(&id, "config.apps", project_apps(&value));
                    continue;
                }
                tracing::debug!("setting data value of \"{key}\" to {value} on {id}");
                updates.set(&id, &format!("data.{key}"), value);
            }
        }
        Ok(updates)
    }

    // -----------------------------------------------------------------------
    // Hierarchy
    // -----------------------------------------------------------------------

    fn process_hierarchy(
        &mut self,
        state: &mut EventState,
        mut updates: Updates,
    ) -> Result<Updates, SyncError> {
        if state.moved_in_db.is_empty()
            && state.renamed_in_db.is_empty()
            && state.hier_changes.is_empty()
        {
            return Ok(updates);
        }
        tracing::debug!("updating parents and hierarchy because of name/parenting changes");

        let mut queue: VecDeque<DocId> = state
            .moved_in_db
            .iter()
            .chain(&state.renamed_in_db)
            .cloned()
            .collect();
        let mut seen = BTreeSet::new();
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id.clone()) {
                continue;
            }
            let parents = state.index.parents_of(&id);
            queue.extend(state.index.children(&id).into_iter().map(|c| c.id.clone()));
            let Some(asset) = state.index.get_mut(&id) else {
                continue;
            };
            if asset.data.parents == parents {
                continue;
            }
            let hierarchy = parents.join("/");
            updates.set(&id, "data.parents", parents.clone());
            updates.set(&id, "data.hierarchy", hierarchy.as_str());
            asset.data.parents = parents;
            asset.data.hierarchy = hierarchy;
        }

        let mut keys_by_root: BTreeMap<DocId, BTreeSet<String>> = BTreeMap::new();
        let hier_keys: Vec<String> = state
            .attributes
            .iter()
            .filter(|a| a.hierarchical && !a.key.starts_with("avalon_"))
            .map(|a| a.key.clone())
            .collect();
        for id in &state.moved_in_db {
            keys_by_root
                .entry(id.clone())
                .or_default()
                .extend(hier_keys.iter().cloned());
        }
        for (key, ftrack_ids) in &state.hier_changes {
            for ftrack_id in ftrack_ids {
                let roots: Vec<DocId> = if *ftrack_id == state.project_ftrack_id {
                    state
                        .index
                        .children(&state.index.project().id)
                        .into_iter()
                        .map(|a| a.id.clone())
                        .collect()
                } else {
                    state
                        .index
                        .by_ftrack_id(ftrack_id)
                        .map(|a| vec![a.id.clone()])
                        .unwrap_or_default()
                };
                for root in roots {
                    keys_by_root.entry(root).or_default().insert(key.clone());
                }
            }
        }

        for (root, keys) in keys_by_root {
            for key in keys {
                let Some(attr) = state.attribute(&key).cloned() else {
                    continue;
                };
                updates = self.push_down(state, &root, &attr, updates)?;
            }
        }
        Ok(updates)
    }

    /// Resolve a hierarchical attribute for `root` and hand it down to every
    /// descendant without its own value.
    fn push_down(
        &mut self,
        state: &mut EventState,
        root: &DocId,
        attr: &CustomAttribute,
        mut updates: Updates,
    ) -> Result<Updates, SyncError> {
        let parent_ftrack_id = match state.index.get(root).and_then(|a| a.data.visual_parent.clone()) {
            None => state.project_ftrack_id.clone(),
            Some(parent) => match state.index.get(&parent).and_then(|p| p.data.ftrack_id.clone()) {
                Some(id) => id,
                None => state.project_ftrack_id.clone(),
            },
        };
        let inherited = self.inherited_value(state, &parent_ftrack_id, attr)?;

        let mut queue = VecDeque::from([(root.clone(), inherited)]);
        let mut seen = BTreeSet::new();
        while let Some((id, inherited)) = queue.pop_front() {
            if !seen.insert(id.clone()) {
                continue;
            }
            let Some(asset) = state.index.get(&id) else {
                continue;
            };
            let own = match &asset.data.ftrack_id {
                Some(ftrack_id) => self
                    .tracker
                    .entity(ftrack_id)?
                    .and_then(|entity| own_value(&entity, attr)),
                None => None,
            };
            let mut value = own.unwrap_or(inherited);
            if FPS_KEYS.contains(&attr.key.as_str()) && !value.is_null() {
                match convert_fps(&value) {
                    Some(fps) => value = fps,
                    None => {
                        let item = format!("{} - \"{value}\"", state.index.path(asset));
                        state.report.error(MSG_INVALID_FPS, item);
                        continue;
                    }
                }
            }
            queue.extend(
                state
                    .index
                    .children(&id)
                    .into_iter()
                    .map(|c| (c.id.clone(), value.clone())),
            );
            if value.is_null() || asset.data.extra.get(&attr.key) == Some(&value) {
                continue;
            }
            tracing::debug!("hierarchical {} of {id}: {value}", attr.key);
            updates.set(&id, &format!("data.{}", attr.key), value.clone());
            if let Some(asset) = state.index.get_mut(&id) {
                asset.data.extra.insert(attr.key.clone(), value);
            }
        }
        Ok(updates)
    }

    // -----------------------------------------------------------------------
    // Tasks
    // -----------------------------------------------------------------------

    fn process_tasks(
        &mut self,
        state: &mut EventState,
        mut updates: Updates,
    ) -> Result<Updates, SyncError> {
        if state.task_parents.is_empty() {
            return Ok(updates);
        }
        tracing::debug!("processing task changes for parents {:?}", state.task_parents);
        let mut by_parent: BTreeMap<String, BTreeMap<String, TaskInfo>> = state
            .task_parents
            .iter()
            .map(|id| (id.clone(), BTreeMap::new()))
            .collect();
        for task in self.tracker.tasks_of(&state.task_parents)? {
            if !state.patterns.check(&task.name, NameKind::Task)? {
                state.regex_failed.push(task.id);
                continue;
            }
            by_parent.entry(task.parent_id).or_default().insert(
                task.name,
                TaskInfo {
                    task_type: task.task_type,
                },
            );
        }
        for (ftrack_id, tasks) in by_parent {
            let Some(asset) = state.index.by_ftrack_id(&ftrack_id) else {
                continue;
            };
            if asset.data.tasks == tasks {
                continue;
            }
            let id = asset.id.clone();
            updates.set(&id, "data.tasks", serde_json::to_value(&tasks)?);
            if let Some(asset) = state.index.get_mut(&id) {
                asset.data.tasks = tasks;
            }
        }
        Ok(updates)
    }

    // -----------------------------------------------------------------------
    // Report
    // -----------------------------------------------------------------------

    fn finish_report(&self, state: &mut EventState) {
        for ftrack_id in std::mem::take(&mut state.duplicated) {
            let name = match self.tracker.entity(&ftrack_id) {
                Ok(Some(entity)) => entity.name,
                _ => ftrack_id,
            };
            if !state.report.duplicated.contains(&name) {
                state.report.duplicated.push(name);
            }
        }
        for ftrack_id in std::mem::take(&mut state.regex_failed) {
            let path = match self.tracker.link(&ftrack_id) {
                Ok(link) => link.join("/"),
                Err(_) => ftrack_id,
            };
            if !state.report.regex_failed.contains(&path) {
                state.report.regex_failed.push(path);
            }
        }
        if !state.report.is_empty() {
            tracing::info!("synchronization report for {}:\n{}", self.project, state.report);
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Ancestor names between the project and the entity, both excluded.
fn parents_from_link(link: &[String]) -> Vec<String> {
    match link {
        [_, middle @ .., _] => middle.to_vec(),
        _ => Vec::new(),
    }
}

fn own_value(entity: &TrackerEntity, attr: &CustomAttribute) -> Option<Value> {
    entity
        .custom_attributes
        .get(&attr.key)
        .filter(|v| !v.is_null())
        .and_then(|v| attr.convert(v))
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Number(n) => n.as_f64() == Some(0.0),
    }
}

/// Frame rate as a number; `None` for values that are not one.
fn convert_fps(value: &Value) -> Option<Value> {
    let fps = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if fps <= 0.0 {
        return None;
    }
    serde_json::Number::from_f64(fps).map(Value::Number)
}

/// `applications` attribute value as the project's `config.apps` list.
fn project_apps(value: &Value) -> Value {
    let names: Vec<String> = match value {
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_owned)
            .collect(),
        Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect(),
        _ => Vec::new(),
    };
    Value::from(
        names
            .into_iter()
            .map(|name| serde_json::json!({ "name": name }))
            .collect::<Vec<_>>(),
    )
}
