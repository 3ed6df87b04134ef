mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::PathArgs;

#[derive(Parser)]
#[command(name = "pype")]
#[command(version)]
#[command(about = "Pipeline tools: site sync status, tracker sync replay, asset metadata", long_about = None)]
struct Cli {
    #[command(flatten)]
    paths: PathArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show synchronisation status of representations between two sites
    Status(commands::status::StatusArgs),

    /// List assets that must not be renamed, moved or removed
    Changeability(commands::changeability::ChangeabilityArgs),

    /// Record which datablocks live where in a published representation
    UpdateMetadata(commands::update_metadata::UpdateMetadataArgs),

    /// Replay a recorded tracker event against the document store
    SyncEvent(commands::sync_event::SyncEventArgs),
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Status(args) => args.run(&cli.paths),
        Commands::Changeability(args) => args.run(&cli.paths),
        Commands::UpdateMetadata(args) => args.run(&cli.paths),
        Commands::SyncEvent(args) => args.run(&cli.paths),
    }
}
