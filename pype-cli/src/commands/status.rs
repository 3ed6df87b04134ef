//! `pype status`: representation sync state between a local and a remote site.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use pype_core::DocId;
use pype_syncserver::{
    FileSummary, RepresentationSummary, RowFilter, SitePair, SortColumn, SortOrder,
    SyncRepresentationModel, SyncStatus,
};

use super::{print_json, PathArgs};

/// Arguments for `pype status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Project whose representations are listed.
    #[arg(long)]
    pub project: String,

    /// Site of this workstation.
    #[arg(long, default_value = "studio")]
    pub local: String,

    #[arg(long, default_value = "gdrive")]
    pub remote: String,

    /// Only show rows with this status (repeatable), e.g. `queued`, `failed`.
    #[arg(long = "status", value_name = "STATUS")]
    pub statuses: Vec<String>,

    /// Case-insensitive text matched against asset, subset and representation.
    #[arg(long)]
    pub filter: Option<String>,

    /// Sort column (asset, subset, version, representation, local, remote,
    /// files, size, priority, status). Defaults to latest remote change first.
    #[arg(long)]
    pub sort: Option<String>,

    /// Sort descending.
    #[arg(long, requires = "sort")]
    pub desc: bool,

    /// Page to show, counted from 0.
    #[arg(long, default_value_t = 0)]
    pub page: usize,

    /// Show per-file details of one representation instead of the table.
    #[arg(long, value_name = "ID")]
    pub representation: Option<String>,

    /// Set the local site priority of `--representation` before showing it.
    #[arg(long, requires = "representation")]
    pub priority: Option<i64>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self, paths: &PathArgs) -> Result<()> {
        let settings = paths.load_settings()?;
        let (store_path, mut store) = paths.load_store()?;

        let mut model = SyncRepresentationModel::new(
            self.project.clone(),
            SitePair::new(self.local.clone(), self.remote.clone()),
            settings.sync_server,
        );
        model
            .refresh(&store)
            .with_context(|| format!("Failed to read representations of '{}'", self.project))?;

        if let Some(id) = self.representation.as_deref() {
            let id = DocId::from(id);
            if let Some(priority) = self.priority {
                model.set_priority(&mut store, &id, priority)?;
                store
                    .save_at(&store_path)
                    .with_context(|| format!("Failed to save {}", store_path.display()))?;
            }
            let files = model.details(&store, &id)?;
            if self.json {
                return print_json(&files);
            }
            print_files(&id, &files);
            return Ok(());
        }

        model.set_filter(self.row_filter()?);
        if let Some(column) = self.sort.as_deref() {
            let order = if self.desc {
                SortOrder::Descending
            } else {
                SortOrder::Ascending
            };
            model.sort_by(column.parse::<SortColumn>()?, order);
        }

        let total = model.rows().len();
        let pages = model.page_count();
        if pages > 0 && self.page >= pages {
            bail!("Page {} is out of range ({} page(s))", self.page, pages);
        }
        let rows = model.page(self.page);

        if self.json {
            return print_json(&StatusReportJson {
                summary: StatusSummaryJson {
                    project: &self.project,
                    local_site: &self.local,
                    remote_site: &self.remote,
                    representations: total,
                    page: self.page,
                    pages,
                },
                representations: rows,
            });
        }

        print_table(&self, &rows, total, pages);
        Ok(())
    }

    fn row_filter(&self) -> Result<RowFilter> {
        let statuses = self
            .statuses
            .iter()
            .map(|s| s.parse::<SyncStatus>())
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(RowFilter {
            statuses,
            text: self.filter.clone(),
        })
    }
}

#[derive(Serialize)]
struct StatusReportJson<'a> {
    summary: StatusSummaryJson<'a>,
    representations: Vec<&'a RepresentationSummary>,
}

#[derive(Serialize)]
struct StatusSummaryJson<'a> {
    project: &'a str,
    local_site: &'a str,
    remote_site: &'a str,
    representations: usize,
    page: usize,
    pages: usize,
}

#[derive(Tabled)]
struct RepresentationRow {
    #[tabled(rename = "asset")]
    asset: String,
    #[tabled(rename = "subset")]
    subset: String,
    #[tabled(rename = "version")]
    version: String,
    #[tabled(rename = "repre")]
    representation: String,
    #[tabled(rename = "local")]
    local: String,
    #[tabled(rename = "remote")]
    remote: String,
    #[tabled(rename = "files")]
    files: usize,
    #[tabled(rename = "size")]
    size: String,
    #[tabled(rename = "priority")]
    priority: i64,
    #[tabled(rename = "status")]
    status: String,
}

#[derive(Tabled)]
struct FileRow {
    #[tabled(rename = "file")]
    path: String,
    #[tabled(rename = "size")]
    size: String,
    #[tabled(rename = "local")]
    local: String,
    #[tabled(rename = "remote")]
    remote: String,
    #[tabled(rename = "tries")]
    tries: u32,
    #[tabled(rename = "priority")]
    priority: i64,
    #[tabled(rename = "status")]
    status: String,
}

fn print_table(args: &StatusArgs, rows: &[&RepresentationSummary], total: usize, pages: usize) {
    println!(
        "Pype v{} | {} | {} -> {} | {} representations | page {}/{}",
        env!("CARGO_PKG_VERSION"),
        args.project,
        args.local,
        args.remote,
        total,
        (args.page + 1).min(pages.max(1)),
        pages.max(1),
    );

    if rows.is_empty() {
        println!("No representations on either site.");
        return;
    }

    let separator = "■".repeat(67).bright_black().to_string();
    let mut counts = BTreeMap::<SyncStatus, usize>::new();
    for row in rows {
        *counts.entry(row.status).or_default() += 1;
    }

    println!("{separator}");
    let indicators: Vec<String> = counts
        .iter()
        .map(|(status, count)| format!("{} {} {}", status_indicator(*status), count, status))
        .collect();
    println!("{}", indicators.join("  "));
    println!("{separator}");

    let table_rows: Vec<RepresentationRow> = rows
        .iter()
        .map(|row| RepresentationRow {
            asset: row.asset.clone(),
            subset: row.subset.clone(),
            version: row
                .version
                .map(|v| format!("v{v:03}"))
                .unwrap_or_else(|| "-".to_string()),
            representation: row.representation.clone(),
            local: percent(row.local.avg_progress),
            remote: percent(row.remote.avg_progress),
            files: row.files_count,
            size: human_size(row.files_size),
            priority: row.priority,
            status: row.status.to_string(),
        })
        .collect();
    let mut table = Table::new(table_rows);
    table.with(Style::rounded());
    println!("{table}");
}

fn print_files(id: &DocId, files: &[FileSummary]) {
    println!("{} {}", "Representation".bold(), id);
    let table_rows: Vec<FileRow> = files
        .iter()
        .map(|file| FileRow {
            path: file.path.clone(),
            size: human_size(file.size),
            local: percent(file.local_progress),
            remote: percent(file.remote_progress),
            tries: file.tries,
            priority: file.priority,
            status: file.status.to_string(),
        })
        .collect();
    let mut table = Table::new(table_rows);
    table.with(Style::rounded());
    println!("{table}");

    for file in files.iter().filter(|f| !f.errors.is_empty()) {
        for error in &file.errors {
            println!("{} {}: {}", status_indicator(SyncStatus::Failed), file.path, error);
        }
    }
}

fn status_indicator(status: SyncStatus) -> String {
    match status {
        SyncStatus::SyncedOk => "■".green().bold().to_string(),
        SyncStatus::InProgress => "■".cyan().bold().to_string(),
        SyncStatus::Queued => "■".yellow().bold().to_string(),
        SyncStatus::Paused => "■".magenta().bold().to_string(),
        SyncStatus::Failed => "■".red().bold().to_string(),
        SyncStatus::NotAvailable => "■".bright_black().bold().to_string(),
    }
}

fn percent(progress: f64) -> String {
    format!("{:.0}%", progress * 100.0)
}

fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.1} {}", UNITS[unit])
    }
}
