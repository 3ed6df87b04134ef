//! Representation table of a project: filtered, sorted and paged summaries.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::str::FromStr;

use pype_core::settings::SyncServerSettings;
use pype_core::store::{DocumentStore, DocumentStoreExt, Filter};
use pype_core::{DocId, DocType, RepresentationDoc, SiteEntry};

use crate::aggregate::{file_rows, summarize, FileSummary, RepresentationSummary, SitePair};
use crate::error::SyncServerError;
use crate::status::SyncStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortColumn {
    Asset,
    Subset,
    Version,
    Representation,
    LocalUpdated,
    RemoteUpdated,
    FilesCount,
    FilesSize,
    Priority,
    Status,
}

impl FromStr for SortColumn {
    type Err = SyncServerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "asset" => SortColumn::Asset,
            "subset" => SortColumn::Subset,
            "version" => SortColumn::Version,
            "representation" => SortColumn::Representation,
            "local" | "local_site" | "updated_dt_local" => SortColumn::LocalUpdated,
            "remote" | "remote_site" | "updated_dt_remote" => SortColumn::RemoteUpdated,
            "files" | "files_count" => SortColumn::FilesCount,
            "size" | "files_size" => SortColumn::FilesSize,
            "priority" => SortColumn::Priority,
            "status" => SortColumn::Status,
            _ => {
                return Err(SyncServerError::UnknownName {
                    kind: "column",
                    name: s.to_owned(),
                })
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Row filter. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowFilter {
    pub statuses: BTreeSet<SyncStatus>,
    /// Case-insensitive text searched in asset, subset and representation.
    pub text: Option<String>,
}

impl RowFilter {
    pub fn matches(&self, row: &RepresentationSummary) -> bool {
        if !self.statuses.is_empty() && !self.statuses.contains(&row.status) {
            return false;
        }
        let Some(text) = self.text.as_deref().map(str::to_lowercase) else {
            return true;
        };
        [&row.asset, &row.subset, &row.representation]
            .iter()
            .any(|field| field.to_lowercase().contains(&text))
    }
}

#[derive(Debug, Clone)]
pub struct SyncRepresentationModel {
    project: String,
    sites: SitePair,
    settings: SyncServerSettings,
    filter: RowFilter,
    /// Primary criterion first; the previous primary stays as secondary.
    sort: Vec<(SortColumn, SortOrder)>,
    rows: Vec<RepresentationSummary>,
}

impl SyncRepresentationModel {
    pub fn new(project: impl Into<String>, sites: SitePair, settings: SyncServerSettings) -> Self {
        Self {
            project: project.into(),
            sites,
            settings,
            filter: RowFilter::default(),
            sort: vec![(SortColumn::RemoteUpdated, SortOrder::Descending)],
            rows: Vec::new(),
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn sites(&self) -> &SitePair {
        &self.sites
    }

    /// Re-read all representations present on either site.
    pub fn refresh<D: DocumentStore + ?Sized>(&mut self, store: &D) -> Result<(), SyncServerError> {
        let docs: Vec<RepresentationDoc> = store.find_as(
            &self.project,
            &Filter::new().eq("type", DocType::Representation),
        )?;
        self.rows = docs
            .iter()
            .filter(|repre| self.on_either_site(repre))
            .filter_map(|repre| summarize(repre, &self.sites, &self.settings))
            .collect();
        tracing::debug!(
            "{} representation(s) of {} on {} / {}",
            self.rows.len(),
            self.project,
            self.sites.local,
            self.sites.remote
        );
        Ok(())
    }

    fn on_either_site(&self, repre: &RepresentationDoc) -> bool {
        repre.files.iter().any(|file| {
            file.sites
                .iter()
                .any(|s| s.name == self.sites.local || s.name == self.sites.remote)
        })
    }

    pub fn set_filter(&mut self, filter: RowFilter) {
        self.filter = filter;
    }

    /// Sort by `column`; the previous primary column becomes the tie-breaker.
    pub fn sort_by(&mut self, column: SortColumn, order: SortOrder) {
        let previous = self.sort.first().copied();
        self.sort = vec![(column, order)];
        if let Some(previous) = previous.filter(|(c, _)| *c != column) {
            self.sort.push(previous);
        }
    }

    /// Filtered and sorted rows. Ties fall back to the representation id.
    pub fn rows(&self) -> Vec<&RepresentationSummary> {
        let mut rows: Vec<&RepresentationSummary> =
            self.rows.iter().filter(|r| self.filter.matches(r)).collect();
        rows.sort_by(|a, b| {
            self.sort
                .iter()
                .map(|(column, order)| {
                    let ordering = compare(a, b, *column);
                    match order {
                        SortOrder::Ascending => ordering,
                        SortOrder::Descending => ordering.reverse(),
                    }
                })
                .find(|o| o.is_ne())
                .unwrap_or_else(|| a.id.cmp(&b.id))
        });
        rows
    }

    pub fn page_count(&self) -> usize {
        self.rows().len().div_ceil(self.settings.page_size.max(1))
    }

    /// Rows of page `index`, counted from 0. Past the end is empty.
    pub fn page(&self, index: usize) -> Vec<&RepresentationSummary> {
        let size = self.settings.page_size.max(1);
        self.rows().into_iter().skip(index * size).take(size).collect()
    }

    /// Per-file rows of one representation.
    pub fn details<D: DocumentStore + ?Sized>(
        &self,
        store: &D,
        id: &DocId,
    ) -> Result<Vec<FileSummary>, SyncServerError> {
        let repre = self.load(store, id)?;
        Ok(file_rows(&repre, &self.sites, &self.settings))
    }

    /// Set the priority of every file of a representation on the local site.
    pub fn set_priority<D: DocumentStore + ?Sized>(
        &mut self,
        store: &mut D,
        id: &DocId,
        priority: i64,
    ) -> Result<(), SyncServerError> {
        let mut repre = self.load(&*store, id)?;
        for file in &mut repre.files {
            match file.sites.iter_mut().find(|s| s.name == self.sites.local) {
                Some(site) => site.priority = Some(priority),
                None => {
                    let mut site = SiteEntry::named(self.sites.local.clone());
                    site.priority = Some(priority);
                    file.sites.push(site);
                }
            }
        }
        store.replace_one(&self.project, &Filter::by_id(id), serde_json::to_value(&repre)?)?;
        tracing::info!("priority of representation {id} on {} set to {priority}", self.sites.local);

        if let Some(row) = self.rows.iter_mut().find(|r| r.id == *id) {
            if let Some(updated) = summarize(&repre, &self.sites, &self.settings) {
                *row = updated;
            }
        }
        Ok(())
    }

    fn load<D: DocumentStore + ?Sized>(
        &self,
        store: &D,
        id: &DocId,
    ) -> Result<RepresentationDoc, SyncServerError> {
        store
            .find_one_as(
                &self.project,
                &Filter::by_id(id).eq("type", DocType::Representation),
            )?
            .ok_or_else(|| SyncServerError::RepresentationNotFound(id.clone()))
    }
}

fn compare(a: &RepresentationSummary, b: &RepresentationSummary, column: SortColumn) -> Ordering {
    match column {
        SortColumn::Asset => a.asset.cmp(&b.asset),
        SortColumn::Subset => a.subset.cmp(&b.subset),
        SortColumn::Version => a.version.cmp(&b.version),
        SortColumn::Representation => a.representation.cmp(&b.representation),
        SortColumn::LocalUpdated => a.local.updated_dt.cmp(&b.local.updated_dt),
        SortColumn::RemoteUpdated => a.remote.updated_dt.cmp(&b.remote.updated_dt),
        SortColumn::FilesCount => a.files_count.cmp(&b.files_count),
        SortColumn::FilesSize => a.files_size.cmp(&b.files_size),
        SortColumn::Priority => a.priority.cmp(&b.priority),
        SortColumn::Status => a.status.cmp(&b.status),
    }
}
