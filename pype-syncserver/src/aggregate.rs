//! Per-representation summary of file states for one pair of sites.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use pype_core::settings::SyncServerSettings;
use pype_core::{DocId, RepresentationDoc, RepresentationFile, SiteEntry};

use crate::status::{derive, SideState, SyncStatus};

/// The sites whose copies are compared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitePair {
    /// Site of the current workstation.
    pub local: String,
    pub remote: String,
}

impl SitePair {
    pub fn new(local: impl Into<String>, remote: impl Into<String>) -> Self {
        Self {
            local: local.into(),
            remote: remote.into(),
        }
    }

    fn entries<'a>(&self, file: &'a RepresentationFile) -> (Option<&'a SiteEntry>, Option<&'a SiteEntry>) {
        let find = |name: &str| file.sites.iter().find(|s| s.name == name);
        (find(&self.local), find(&self.remote))
    }
}

/// Aggregate over all files of a representation at one site.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SideSummary {
    pub avg_progress: f64,
    pub paused: bool,
    pub failed: bool,
    pub max_tries: u32,
    /// Latest success or failure of any file.
    pub updated_dt: Option<DateTime<Utc>>,
}

impl SideSummary {
    fn as_state(&self) -> SideState {
        SideState {
            progress: self.avg_progress,
            paused: self.paused,
            failed: self.failed,
            tries: self.max_tries,
        }
    }
}

/// One row of the representation table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepresentationSummary {
    pub id: DocId,
    pub asset: String,
    pub subset: String,
    pub version: Option<i64>,
    pub representation: String,
    pub files_count: usize,
    pub files_size: u64,
    pub local: SideSummary,
    pub remote: SideSummary,
    pub priority: i64,
    pub status: SyncStatus,
}

/// One row of the per-file detail table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileSummary {
    pub path: String,
    pub size: u64,
    pub local_progress: f64,
    pub remote_progress: f64,
    pub tries: u32,
    pub priority: i64,
    pub errors: Vec<String>,
    pub status: SyncStatus,
}

/// Summarise a representation; `None` when it has no files.
pub fn summarize(
    repre: &RepresentationDoc,
    sites: &SitePair,
    settings: &SyncServerSettings,
) -> Option<RepresentationSummary> {
    if repre.files.is_empty() {
        return None;
    }
    let mut local = SideAccumulator::default();
    let mut remote = SideAccumulator::default();
    let mut priority = None;
    for file in &repre.files {
        let (local_entry, remote_entry) = sites.entries(file);
        local.add(local_entry);
        remote.add(remote_entry);
        let file_priority = local_entry
            .and_then(|e| e.priority)
            .unwrap_or(settings.default_priority);
        priority = Some(priority.map_or(file_priority, |p: i64| p.max(file_priority)));
    }

    let count = repre.files.len();
    let local = local.finish(count);
    let remote = remote.finish(count);
    let status = derive(&local.as_state(), &remote.as_state(), settings.max_tries);
    Some(RepresentationSummary {
        id: repre.id.clone(),
        asset: context_string(repre, "asset"),
        subset: context_string(repre, "subset"),
        version: repre.context.get("version").and_then(Value::as_i64),
        representation: repre
            .context_str("representation")
            .unwrap_or(&repre.name)
            .to_owned(),
        files_count: count,
        files_size: repre.files.iter().map(|f| f.size).sum(),
        local,
        remote,
        priority: priority.unwrap_or(settings.default_priority),
        status,
    })
}

/// Per-file rows of a representation.
pub fn file_rows(
    repre: &RepresentationDoc,
    sites: &SitePair,
    settings: &SyncServerSettings,
) -> Vec<FileSummary> {
    repre
        .files
        .iter()
        .map(|file| {
            let (local_entry, remote_entry) = sites.entries(file);
            let local = SideState::of(local_entry);
            let remote = SideState::of(remote_entry);
            let errors = [local_entry, remote_entry]
                .into_iter()
                .flatten()
                .filter_map(|e| e.error.clone())
                .collect();
            FileSummary {
                path: file.path.clone(),
                size: file.size,
                local_progress: local.progress,
                remote_progress: remote.progress,
                tries: local.tries.max(remote.tries),
                priority: local_entry
                    .and_then(|e| e.priority)
                    .unwrap_or(settings.default_priority),
                errors,
                status: derive(&local, &remote, settings.max_tries),
            }
        })
        .collect()
}

fn context_string(repre: &RepresentationDoc, key: &str) -> String {
    repre.context_str(key).unwrap_or_default().to_owned()
}

#[derive(Default)]
struct SideAccumulator {
    progress: f64,
    paused: bool,
    failed: bool,
    max_tries: u32,
    updated_dt: Option<DateTime<Utc>>,
}

impl SideAccumulator {
    fn add(&mut self, entry: Option<&SiteEntry>) {
        let state = SideState::of(entry);
        self.progress += state.progress;
        self.paused |= state.paused;
        self.failed |= state.failed;
        self.max_tries = self.max_tries.max(state.tries);
        let touched = entry.and_then(|e| e.created_dt.or(e.last_failed_dt));
        self.updated_dt = self.updated_dt.max(touched);
    }

    fn finish(self, count: usize) -> SideSummary {
        SideSummary {
            avg_progress: self.progress / count as f64,
            paused: self.paused,
            failed: self.failed,
            max_tries: self.max_tries,
            updated_dt: self.updated_dt,
        }
    }
}
