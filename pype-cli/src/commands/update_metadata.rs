//! `pype update-metadata`: the follow-up process a host spawns after publishing.
//!
//! Success or failure is reported only through the exit code.

use anyhow::{bail, Context, Result};
use clap::Args;

use pype_loader::{apply_metadata_update, MetadataUpdateArgs};

use super::PathArgs;

#[derive(Args, Debug)]
pub struct UpdateMetadataArgs {
    #[arg(long)]
    pub project: String,

    #[arg(long)]
    pub subset: String,

    /// Datablock names, paired in order with `--datapaths`.
    #[arg(long, num_args = 1.., required = true)]
    pub datablocks: Vec<String>,

    #[arg(long, num_args = 1.., required = true)]
    pub datapaths: Vec<String>,

    /// Id of the published representation.
    #[arg(long)]
    pub representation: String,
}

impl UpdateMetadataArgs {
    pub fn run(self, paths: &PathArgs) -> Result<()> {
        let (store_path, mut store) = paths.load_store()?;
        let args = MetadataUpdateArgs {
            subset: self.subset,
            datablocks: self.datablocks,
            datapaths: self.datapaths,
            representation: self.representation,
        };

        let found = apply_metadata_update(&mut store, &self.project, &args)?;
        if !found {
            bail!(
                "Representation '{}' not found in project '{}'",
                args.representation,
                self.project
            );
        }
        store
            .save_at(&store_path)
            .with_context(|| format!("Failed to save {}", store_path.display()))?;
        tracing::info!(
            "recorded {} datablock(s) on representation {}",
            args.datablocks.len(),
            args.representation
        );
        Ok(())
    }
}
