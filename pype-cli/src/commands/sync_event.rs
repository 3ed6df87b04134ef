//! `pype sync-event`: replay a recorded tracker event.
//!
//! The tracker side is a JSON snapshot; corrections made by the processor
//! (recreated or renamed-back entities) are written back to it.

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use pype_ftrack::{MemoryTracker, SyncProcessor, TrackerEvent};

use super::{write_json, PathArgs};

#[derive(Args, Debug)]
pub struct SyncEventArgs {
    /// Recorded event (JSON with an `entities` list).
    pub event: PathBuf,

    #[arg(long)]
    pub project: String,

    /// Tracker snapshot (JSON).
    #[arg(long, value_name = "FILE")]
    pub tracker: PathBuf,

    /// Process the event without saving the store or the tracker snapshot.
    #[arg(long)]
    pub dry_run: bool,
}

impl SyncEventArgs {
    pub fn run(self, paths: &PathArgs) -> Result<()> {
        let settings = paths.load_settings()?;
        let (store_path, mut store) = paths.load_store()?;

        let raw = fs::read_to_string(&self.event)
            .with_context(|| format!("Failed to read event {}", self.event.display()))?;
        let event: TrackerEvent = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse event {}", self.event.display()))?;
        let raw = fs::read_to_string(&self.tracker)
            .with_context(|| format!("Failed to read tracker {}", self.tracker.display()))?;
        let mut tracker: MemoryTracker = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse tracker {}", self.tracker.display()))?;

        let report = SyncProcessor::new(&mut store, &mut tracker, &settings.ftrack, &self.project)
            .process(&event)?;

        if self.dry_run {
            println!("{}", "Dry run, nothing saved.".yellow());
        } else {
            store
                .save_at(&store_path)
                .with_context(|| format!("Failed to save {}", store_path.display()))?;
            write_json(&self.tracker, &tracker)?;
        }

        if report.is_empty() && !report.full_sync_requested {
            println!("{}", "Nothing to synchronize.".green());
        } else {
            print!("{report}");
        }
        if report.full_sync_requested {
            println!("{}", "Auto-sync was enabled; run a full synchronization.".yellow());
        }
        if report.has_errors() {
            bail!("Synchronization of '{}' finished with errors", self.project);
        }
        Ok(())
    }
}
