pub mod changeability;
pub mod status;
pub mod sync_event;
pub mod update_metadata;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use pype_core::{MemoryStore, PipelineSettings};

/// Locations of the document store and settings, shared by every command.
#[derive(Args, Debug, Clone)]
pub struct PathArgs {
    /// Document store file (defaults to ~/.pype/store.json)
    #[arg(long, global = true, value_name = "FILE")]
    pub store: Option<PathBuf>,

    /// Pipeline settings file (defaults to ~/.pype/settings.yaml)
    #[arg(long, global = true, value_name = "FILE")]
    pub settings: Option<PathBuf>,
}

impl PathArgs {
    pub fn store_path(&self) -> Result<PathBuf> {
        match &self.store {
            Some(path) => Ok(path.clone()),
            None => Ok(pype_dir()?.join("store.json")),
        }
    }

    pub fn load_store(&self) -> Result<(PathBuf, MemoryStore)> {
        let path = self.store_path()?;
        let store = MemoryStore::load_at(&path)
            .with_context(|| format!("Failed to load document store {}", path.display()))?;
        Ok((path, store))
    }

    pub fn load_settings(&self) -> Result<PipelineSettings> {
        let path = match &self.settings {
            Some(path) => path.clone(),
            None => pype_dir()?.join("settings.yaml"),
        };
        pype_core::settings::load_at(&path)
            .with_context(|| format!("Failed to load settings {}", path.display()))
    }
}

fn pype_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".pype"))
}

/// Write JSON next to `path` and rename it into place.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let contents = serde_json::to_string_pretty(value).context("Failed to serialize JSON")?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, contents).with_context(|| format!("Failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize JSON output")?;
    println!("{json}");
    Ok(())
}
