//! `pype changeability`: assets protected from tracker-side edits.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use pype_ftrack::{AssetIndex, Changeability};

use super::{print_json, PathArgs};

#[derive(Args, Debug)]
pub struct ChangeabilityArgs {
    #[arg(long)]
    pub project: String,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct ChangeabilityJson {
    project: String,
    changeable: usize,
    unchangeable: Vec<EntryJson>,
}

#[derive(Serialize, Tabled)]
struct EntryJson {
    #[tabled(rename = "id")]
    id: String,
    #[tabled(rename = "path")]
    path: String,
    #[tabled(rename = "reason")]
    reason: String,
}

impl ChangeabilityArgs {
    pub fn run(self, paths: &PathArgs) -> Result<()> {
        let (_, store) = paths.load_store()?;
        let index = AssetIndex::load(&store, &self.project)
            .with_context(|| format!("Failed to index assets of '{}'", self.project))?;
        let changeability = Changeability::compute(&index);

        let unchangeable: Vec<EntryJson> = changeability
            .unchangeable()
            .map(|(id, reason)| {
                let path = if index.is_project(id) {
                    index.project().name.clone()
                } else {
                    index
                        .get(id)
                        .or_else(|| index.get_archived(id))
                        .map(|asset| index.path(asset))
                        .unwrap_or_else(|| id.to_string())
                };
                EntryJson {
                    id: id.to_string(),
                    path,
                    reason: reason.describe().to_string(),
                }
            })
            .collect();
        let changeable = index
            .assets()
            .filter(|asset| changeability.is_changeable(&asset.id))
            .count();

        if self.json {
            return print_json(&ChangeabilityJson {
                project: self.project,
                changeable,
                unchangeable,
            });
        }

        println!(
            "{} | {} unchangeable | {} changeable",
            self.project.to_uppercase().bold(),
            unchangeable.len(),
            changeable,
        );
        let mut table = Table::new(unchangeable);
        table.with(Style::rounded());
        println!("{table}");
        Ok(())
    }
}
