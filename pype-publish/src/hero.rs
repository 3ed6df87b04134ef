//! Hero version integrator.
//!
//! Promotes the representations of a fresh publish into the subset's hero
//! slot: a version-less copy of the files plus a `hero_version` document
//! that always points at the latest publish.
//!
//! # Sequence
//!
//! 1. Drop ignored representations; nothing left means nothing to do.
//! 2. Resolve the source version (instance data, else the store).
//! 3. Compute the hero directory and collect extra resources copied under the
//!    instance publish directory.
//! 4. Load the current hero version and its representations.
//! 5. Move the current hero directory to `<dir>.BACKUP[N]`. Failing to do so
//!    aborts before anything is written.
//! 6. Stage every document write and compute source/destination file pairs.
//! 7. Transfer files, then commit the staged batch and drop the backup.
//!
//! Any error in steps 6-7 deletes the partial hero directory and renames the
//! backup back into place before the error is returned. The store is only
//! written by the final batch, so it never needs undoing.
//!
//! # Representation fate
//!
//! | Old hero has same name | Archived entry with name | Result                      |
//! |------------------------|--------------------------|-----------------------------|
//! | yes                    | -                        | replaced, id kept           |
//! | no                     | yes                      | unarchived, original id     |
//! | no                     | no                       | created with a new id       |
//!
//! Old hero representations not matched by name are archived.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};

use pype_anatomy::{Anatomy, TemplateData};
use pype_core::settings::HeroSettings;
use pype_core::store::{DocumentStore, DocumentStoreExt, Filter, WriteOp};
use pype_core::types::{
    DocId, DocType, HeroVersionDoc, RepresentationData, RepresentationDoc, VersionDoc,
    HERO_VERSION_SCHEMA,
};

use crate::error::PublishError;
use crate::instance::{PublishInstance, PublishedRepresentation};
use crate::sequence::{assemble, Collection};
use crate::transfer::{FileTransfer, HardlinkTransfer};
use crate::validate::{validate_hero_version, validate_representation};

pub const BACKUP_SUFFIX: &str = ".BACKUP";

/// Highest numeric suffix tried for a backup directory.
pub const MAX_BACKUP_INDEX: usize = 10;

/// Why an instance produced no hero version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NothingPublished,
    AllIgnored,
    MissingTemplate(String),
    MissingPathTemplate(String),
}

/// What a successful integration did, by representation name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeroSummary {
    pub hero_version_id: DocId,
    pub hero_dir: PathBuf,
    pub replaced: Vec<String>,
    pub unarchived: Vec<String>,
    pub created: Vec<String>,
    pub archived: Vec<String>,
    pub files: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeroOutcome {
    Skipped(SkipReason),
    Integrated(HeroSummary),
}

/// Lexically normalised path (`.` dropped, `..` folded).
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

fn file_name_of(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

fn stem_of(path: &str) -> &str {
    let name = file_name_of(path);
    match name.rfind('.') {
        Some(dot) if dot > 0 => &name[..dot],
        _ => name,
    }
}

/// Carry over sites the old hero files were synced to.
fn merge_sites(new: &mut RepresentationDoc, old: &RepresentationDoc) {
    for file in &mut new.files {
        let Some(old_file) = old.files.iter().find(|f| f.path == file.path) else {
            continue;
        };
        for site in &old_file.sites {
            if !file.sites.iter().any(|s| s.name == site.name) {
                file.sites.push(site.clone());
            }
        }
    }
}

/// Everything decided before the first file is touched.
struct Plan {
    hero_id: DocId,
    hero_dir: PathBuf,
    ops: Vec<WriteOp>,
    to_replace: BTreeMap<String, RepresentationDoc>,
    to_archive: BTreeMap<String, RepresentationDoc>,
    archived_by_name: BTreeMap<String, RepresentationDoc>,
    other_files: Vec<(PathBuf, PathBuf)>,
}

pub struct HeroIntegrator<'a, T: FileTransfer = HardlinkTransfer> {
    anatomy: &'a Anatomy,
    settings: &'a HeroSettings,
    transfer: T,
}

impl<'a> HeroIntegrator<'a> {
    pub fn new(anatomy: &'a Anatomy, settings: &'a HeroSettings) -> Self {
        Self {
            anatomy,
            settings,
            transfer: HardlinkTransfer,
        }
    }
}

impl<'a, T: FileTransfer> HeroIntegrator<'a, T> {
    /// Use another file-transfer primitive.
    pub fn with_transfer<U: FileTransfer>(self, transfer: U) -> HeroIntegrator<'a, U> {
        HeroIntegrator {
            anatomy: self.anatomy,
            settings: self.settings,
            transfer,
        }
    }

    /// Template key selected by the template-name profiles.
    pub fn template_key(&self, instance: &PublishInstance) -> &'a str {
        self.settings.template_name_for(
            instance.main_family(),
            instance.task_field("name"),
            instance.task_field("type"),
            &instance.host,
        )
    }

    /// Check the anatomy for the selected template and integrate.
    pub fn process<D: DocumentStore + ?Sized>(
        &self,
        store: &mut D,
        project: &str,
        instance: &PublishInstance,
    ) -> Result<HeroOutcome, PublishError> {
        tracing::debug!("hero version integration for subset {} begins", instance.subset);
        if instance.published_representations.is_empty() {
            tracing::debug!("no published representations on {}", instance.subset);
            return Ok(HeroOutcome::Skipped(SkipReason::NothingPublished));
        }
        let key = self.template_key(instance);
        if !self.anatomy.has_template(key) {
            tracing::warn!("anatomy of project {project} has no \"{key}\" template");
            return Ok(HeroOutcome::Skipped(SkipReason::MissingTemplate(key.to_owned())));
        }
        let Ok(hero_template) = self.anatomy.path_template(key) else {
            tracing::warn!("anatomy template \"{key}\" of project {project} has no path");
            return Ok(HeroOutcome::Skipped(SkipReason::MissingPathTemplate(
                key.to_owned(),
            )));
        };
        self.integrate_instance(store, project, instance, key, hero_template)
    }

    pub fn integrate_instance<D: DocumentStore + ?Sized>(
        &self,
        store: &mut D,
        project: &str,
        instance: &PublishInstance,
        template_key: &str,
        hero_template: &str,
    ) -> Result<HeroOutcome, PublishError> {
        let repres: Vec<&PublishedRepresentation> = instance
            .published_representations
            .iter()
            .filter(|r| {
                let ignored = self.settings.is_ignored(&r.representation.name);
                if ignored {
                    tracing::debug!("filtering representation {}", r.representation.name);
                }
                !ignored
            })
            .collect();
        if repres.is_empty() {
            tracing::debug!("all published representations were filtered by name");
            return Ok(HeroOutcome::Skipped(SkipReason::AllIgnored));
        }

        let version = match &instance.version {
            Some(version) => version.clone(),
            None => version_from_representations(store, project, &repres)?.ok_or_else(|| {
                PublishError::VersionNotFound {
                    subset: instance.subset.clone(),
                }
            })?,
        };

        let mut plan = self.plan(store, project, instance, &repres, template_key, &version)?;
        let backup = if plan.hero_dir.exists() {
            Some(move_aside(&plan.hero_dir)?)
        } else {
            None
        };

        match self.stage_and_commit(store, project, &repres, template_key, hero_template, &mut plan)
        {
            Ok(summary) => {
                if let Some(backup) = backup.filter(|b| b.exists()) {
                    if let Err(err) = std::fs::remove_dir_all(&backup) {
                        tracing::warn!("could not remove backup {}: {err}", backup.display());
                    }
                }
                tracing::info!(
                    "hero version of {} integrated: {} replaced, {} created, {} unarchived, {} archived",
                    instance.subset,
                    summary.replaced.len(),
                    summary.created.len(),
                    summary.unarchived.len(),
                    summary.archived.len()
                );
                Ok(HeroOutcome::Integrated(summary))
            }
            Err(err) => {
                restore(&plan.hero_dir, backup.as_deref());
                tracing::error!(
                    "creating hero version of {} failed: {err}",
                    instance.subset
                );
                Err(err)
            }
        }
    }

    fn plan<D: DocumentStore + ?Sized>(
        &self,
        store: &D,
        project: &str,
        instance: &PublishInstance,
        repres: &[&PublishedRepresentation],
        template_key: &str,
        version: &VersionDoc,
    ) -> Result<Plan, PublishError> {
        let hero_dir = normalize(Path::new(
            &self.anatomy.publish_folder(template_key, &instance.anatomy_data)?,
        ));
        tracing::debug!("hero publish dir: {}", hero_dir.display());

        let mut copied: Vec<PathBuf> = Vec::new();
        for (_, dst) in instance.transfers.iter().chain(&instance.hardlinks) {
            let dst = normalize(dst);
            if !copied.contains(&dst) {
                copied.push(dst);
            }
        }
        let repre_files: BTreeSet<PathBuf> = instance
            .published_representations
            .iter()
            .flat_map(|r| r.published_files.iter().map(|p| normalize(p)))
            .collect();
        let publish_dir = normalize(&instance.publish_dir);
        let other_files = copied
            .into_iter()
            .filter(|path| !repre_files.contains(path))
            .filter_map(|path| {
                let relative = path.strip_prefix(&publish_dir).ok()?.to_path_buf();
                Some((path, hero_dir.join(relative)))
            })
            .collect();

        let old_hero: Option<HeroVersionDoc> = store.find_one_as(
            project,
            &Filter::new()
                .eq("parent", &version.parent)
                .eq("type", DocType::HeroVersion),
        )?;
        let old_repres: Vec<RepresentationDoc> = match &old_hero {
            Some(hero) => store.find_as(
                project,
                &Filter::new()
                    .eq("parent", &hero.id)
                    .eq("type", DocType::Representation),
            )?,
            None => Vec::new(),
        };
        let mut old_by_name: BTreeMap<String, RepresentationDoc> = old_repres
            .into_iter()
            .map(|r| (r.name.to_lowercase(), r))
            .collect();

        let hero_id = old_hero
            .as_ref()
            .map(|h| h.id.clone())
            .unwrap_or_else(DocId::generate);
        let new_hero = HeroVersionDoc {
            id: hero_id.clone(),
            doc_type: DocType::HeroVersion,
            schema: HERO_VERSION_SCHEMA.to_owned(),
            version_id: version.id.clone(),
            parent: version.parent.clone(),
        };
        let new_hero = serde_json::to_value(&new_hero)?;
        validate_hero_version(&new_hero)?;
        let ops = match old_hero {
            Some(_) => {
                tracing::debug!("replacing old hero version {hero_id}");
                vec![WriteOp::ReplaceOne {
                    filter: Filter::by_id(&hero_id),
                    doc: new_hero,
                }]
            }
            None => {
                tracing::debug!("creating first hero version {hero_id}");
                vec![WriteOp::InsertOne(new_hero)]
            }
        };

        let mut to_replace = BTreeMap::new();
        for repre in repres {
            let name = repre.representation.name.to_lowercase();
            if let Some(old) = old_by_name.remove(&name) {
                to_replace.insert(name, old);
            }
        }

        let archived: Vec<RepresentationDoc> = store.find_as(
            project,
            &Filter::new()
                .eq("type", DocType::ArchivedRepresentation)
                .eq("parent", &hero_id),
        )?;
        let archived_by_name = archived
            .into_iter()
            .map(|r| (r.name.to_lowercase(), r))
            .collect();

        Ok(Plan {
            hero_id,
            hero_dir,
            ops,
            to_replace,
            to_archive: old_by_name,
            archived_by_name,
            other_files,
        })
    }

    fn stage_and_commit<D: DocumentStore + ?Sized>(
        &self,
        store: &mut D,
        project: &str,
        repres: &[&PublishedRepresentation],
        template_key: &str,
        hero_template: &str,
        plan: &mut Plan,
    ) -> Result<HeroSummary, PublishError> {
        let mut summary = HeroSummary {
            hero_version_id: plan.hero_id.clone(),
            hero_dir: plan.hero_dir.clone(),
            replaced: Vec::new(),
            unarchived: Vec::new(),
            created: Vec::new(),
            archived: Vec::new(),
            files: 0,
        };
        let mut ops = std::mem::take(&mut plan.ops);
        let mut pairs: Vec<(PathBuf, PathBuf)> = Vec::new();

        for published in repres {
            if published.published_files.is_empty() {
                continue;
            }
            let mut data = published.anatomy_data.clone();
            data.remove("version");
            let filled = self.anatomy.format_path(template_key, &data)?;

            let mut repre = published.representation.clone();
            repre.doc_type = DocType::Representation;
            repre.parent = plan.hero_id.clone();
            repre.context = self.context(template_key, &data)?;
            repre.data = RepresentationData {
                path: filled.clone(),
                template: hero_template.to_owned(),
                extra: BTreeMap::new(),
            };
            repre.old_id = None;

            let repre_pairs = self.file_pairs(template_key, &data, published, &filled)?;
            for file in &mut repre.files {
                let file_name = file_name_of(&file.path).to_owned();
                for (src, dst) in &repre_pairs {
                    let src = src.to_string_lossy();
                    if file_name_of(&src) != file_name {
                        continue;
                    }
                    let dst = dst.to_string_lossy();
                    file.path = self.rewrite_path(&file.path, &src, &dst);
                    file.hash = file.hash.replace(stem_of(&src), stem_of(&dst));
                }
            }

            let name = repre.name.clone();
            let lowered = name.to_lowercase();
            let filter = if let Some(old) = plan.to_replace.remove(&lowered) {
                merge_sites(&mut repre, &old);
                repre.id = old.id.clone();
                summary.replaced.push(name);
                Some(Filter::by_id(&old.id))
            } else if let Some(archived) = plan.archived_by_name.remove(&lowered) {
                repre.id = archived.old_id.clone().unwrap_or_else(|| archived.id.clone());
                summary.unarchived.push(name);
                Some(Filter::by_id(&archived.id))
            } else {
                repre.id = DocId::generate();
                summary.created.push(name);
                None
            };

            let doc = serde_json::to_value(&repre)?;
            validate_representation(&doc)?;
            ops.push(match filter {
                Some(filter) => WriteOp::ReplaceOne { filter, doc },
                None => WriteOp::InsertOne(doc),
            });
            pairs.extend(repre_pairs);
        }

        for (lowered, mut old) in std::mem::take(&mut plan.to_archive) {
            let live_id = old.id.clone();
            old.old_id = Some(live_id.clone());
            old.doc_type = DocType::ArchivedRepresentation;
            summary.archived.push(old.name.clone());
            match plan.archived_by_name.remove(&lowered) {
                Some(previous) => {
                    old.id = previous.id.clone();
                    ops.push(WriteOp::ReplaceOne {
                        filter: Filter::by_id(&previous.id),
                        doc: serde_json::to_value(&old)?,
                    });
                }
                None => {
                    old.id = DocId::generate();
                    ops.push(WriteOp::InsertOne(serde_json::to_value(&old)?));
                }
            }
            ops.push(WriteOp::DeleteOne {
                filter: Filter::by_id(&live_id),
            });
        }

        for (src, dst) in pairs.iter().chain(&plan.other_files) {
            self.transfer.transfer(src, dst)?;
            summary.files += 1;
        }

        store.bulk_write(project, ops)?;
        Ok(summary)
    }

    /// Values the hero path template used, plus the configured extra keys.
    fn context(
        &self,
        template_key: &str,
        data: &TemplateData,
    ) -> Result<BTreeMap<String, serde_json::Value>, PublishError> {
        let mut context = BTreeMap::new();
        for key in self.anatomy.used_keys(template_key)? {
            if let Some(value) = data.get(&key) {
                context.insert(key, value.clone());
            }
        }
        for key in &self.settings.db_representation_context_keys {
            if context.contains_key(key) {
                continue;
            }
            if let Some(value) = data.get(key) {
                context.insert(key.clone(), value.clone());
            }
        }
        Ok(context)
    }

    /// Source/destination pairs of one representation. A single file maps
    /// onto the filled path; several files must form exactly one frame
    /// sequence, mapped frame by frame with the template's padding.
    fn file_pairs(
        &self,
        template_key: &str,
        data: &TemplateData,
        published: &PublishedRepresentation,
        filled: &str,
    ) -> Result<Vec<(PathBuf, PathBuf)>, PublishError> {
        let files = &published.published_files;
        if let [single] = files.as_slice() {
            return Ok(vec![(single.clone(), PathBuf::from(filled))]);
        }
        let names: Vec<String> = files
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        let (collections, remainders) = assemble(&names);
        if !remainders.is_empty() || collections.len() != 1 {
            return Err(PublishError::Integrity {
                representation: published.representation.name.clone(),
                reason: format!(
                    "files combine {} frame collection(s) and {} single file(s)",
                    collections.len(),
                    remainders.len()
                ),
            });
        }
        let source = &collections[0];
        let (head, tail) = self.anatomy.frame_parts(template_key, data)?;
        let mut destination = Collection::new(head, self.anatomy.frame_padding(template_key)?, tail);
        destination.indexes = source.indexes.clone();
        Ok(source
            .paths()
            .into_iter()
            .zip(destination.paths())
            .map(|(src, dst)| (PathBuf::from(src), PathBuf::from(dst)))
            .collect())
    }

    /// Swap the rootless source location inside `path` for the hero one.
    fn rewrite_path(&self, path: &str, src: &str, dst: &str) -> String {
        let rootless = |p: &str| {
            self.anatomy
                .rootless(p)
                .unwrap_or_else(|| p.replace('\\', "/"))
        };
        path.replace(&rootless(src), &rootless(dst))
    }
}

fn version_from_representations<D: DocumentStore + ?Sized>(
    store: &D,
    project: &str,
    repres: &[&PublishedRepresentation],
) -> Result<Option<VersionDoc>, PublishError> {
    tracing::debug!("version was not passed along, querying the store");
    for repre in repres {
        let filter = Filter::by_id(&repre.representation.parent).eq("type", DocType::Version);
        if let Some(version) = store.find_one_as::<VersionDoc>(project, &filter)? {
            return Ok(Some(version));
        }
    }
    Ok(None)
}

/// Rename `hero_dir` to the first usable backup slot.
fn move_aside(hero_dir: &Path) -> Result<PathBuf, PublishError> {
    let base = format!("{}{BACKUP_SUFFIX}", hero_dir.display());
    let mut candidate = PathBuf::from(&base);
    let mut index = 0;
    while candidate.exists() {
        tracing::debug!("backup folder {} exists, removing it", candidate.display());
        match std::fs::remove_dir_all(&candidate) {
            Ok(()) => break,
            Err(err) => tracing::info!("could not remove {}: {err}", candidate.display()),
        }
        if index > MAX_BACKUP_INDEX {
            return Err(PublishError::BackupSlotsExhausted {
                path: hero_dir.to_path_buf(),
                max: MAX_BACKUP_INDEX,
            });
        }
        candidate = PathBuf::from(format!("{base}{index}"));
        index += 1;
    }
    tracing::debug!("backup folder path is {}", candidate.display());
    std::fs::rename(hero_dir, &candidate).map_err(|source| PublishError::BackupFailed {
        path: hero_dir.to_path_buf(),
        source,
    })?;
    Ok(candidate)
}

/// Put the previous hero directory back after a failure. A first hero
/// publish has no backup; its partial directory is removed.
fn restore(hero_dir: &Path, backup: Option<&Path>) {
    if hero_dir.exists() {
        if let Err(err) = std::fs::remove_dir_all(hero_dir) {
            tracing::error!("could not remove partial hero dir {}: {err}", hero_dir.display());
            return;
        }
    }
    let Some(backup) = backup.filter(|b| b.exists()) else {
        return;
    };
    if let Err(err) = std::fs::rename(backup, hero_dir) {
        tracing::error!(
            "could not restore {} from {}: {err}",
            hero_dir.display(),
            backup.display()
        );
    }
}
