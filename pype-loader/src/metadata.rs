//! Follow-up metadata update run as a separate process.
//!
//! After a publish, a host may spawn `<program> --subset <s> --datablocks
//! <names...> --datapaths <paths...> --representation <id>` to record which
//! datablocks live where in the published file. The only response channel is
//! the exit code.

use std::path::PathBuf;
use std::process::Command;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use pype_core::store::{DocumentStore, Filter, Update};
use pype_core::types::DocId;

use crate::error::LoaderError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataUpdateArgs {
    pub subset: String,
    pub datablocks: Vec<String>,
    pub datapaths: Vec<String>,
    pub representation: String,
}

impl MetadataUpdateArgs {
    pub fn validate(&self) -> Result<(), LoaderError> {
        if self.datablocks.len() != self.datapaths.len() {
            return Err(LoaderError::MismatchedDatablocks {
                datablocks: self.datablocks.len(),
                datapaths: self.datapaths.len(),
            });
        }
        Ok(())
    }

    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec!["--subset".to_string(), self.subset.clone(), "--datablocks".into()];
        args.extend(self.datablocks.iter().cloned());
        args.push("--datapaths".into());
        args.extend(self.datapaths.iter().cloned());
        args.push("--representation".into());
        args.push(self.representation.clone());
        args
    }

    /// `[{name, path}, ...]` in argument order.
    pub fn datablock_entries(&self) -> Value {
        Value::Array(
            self.datablocks
                .iter()
                .zip(&self.datapaths)
                .map(|(name, path)| json!({"name": name, "path": path}))
                .collect(),
        )
    }
}

/// Spawns the metadata-update process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataUpdateCommand {
    program: PathBuf,
    leading_args: Vec<String>,
    args: MetadataUpdateArgs,
}

impl MetadataUpdateCommand {
    pub fn new(program: impl Into<PathBuf>, args: MetadataUpdateArgs) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
            args,
        }
    }

    /// Argument placed before the update flags (e.g. a subcommand name).
    pub fn leading_arg(mut self, arg: impl Into<String>) -> Self {
        self.leading_args.push(arg.into());
        self
    }

    pub fn argv(&self) -> Vec<String> {
        let mut argv = self.leading_args.clone();
        argv.extend(self.args.to_args());
        argv
    }

    /// Run to completion. Exit code 0 is success.
    pub fn run(&self) -> Result<(), LoaderError> {
        self.args.validate()?;
        tracing::debug!("running {} {:?}", self.program.display(), self.argv());
        let status = Command::new(&self.program)
            .args(self.argv())
            .status()
            .map_err(LoaderError::MetadataSpawn)?;
        if status.success() {
            Ok(())
        } else {
            Err(LoaderError::MetadataUpdateFailed {
                code: status.code(),
            })
        }
    }
}

/// Record the datablock mapping on the representation document
/// (`data.datablocks`). Returns whether the representation was found.
pub fn apply_metadata_update<D: DocumentStore + ?Sized>(
    store: &mut D,
    project: &str,
    args: &MetadataUpdateArgs,
) -> Result<bool, LoaderError> {
    args.validate()?;
    let filter = Filter::by_id(&DocId::from(args.representation.as_str()));
    let update = Update::new()
        .set("data.datablocks", args.datablock_entries())
        .set("data.subset", args.subset.clone());
    let found = store.update_one(project, &filter, &update)?;
    if !found {
        tracing::warn!("representation {} not found in {project}", args.representation);
    }
    Ok(found)
}
