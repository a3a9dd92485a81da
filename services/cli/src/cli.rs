use crate::demo::{run_demo, DemoArgs};
use crate::infra::{clear_progress, migrate, show_progress};
use background_intake::config::{AppConfig, StorageConfig};
use background_intake::error::AppError;
use background_intake::telemetry;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(
    name = "Background Check Intake",
    about = "Drive and inspect the background-check intake wizard from the command line",
    version
)]
struct Cli {
    #[command(flatten)]
    overrides: StorageOverrides,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a scripted wizard session end to end against the local stores
    Demo(DemoArgs),
    /// Inspect or discard saved wizard progress
    Progress {
        #[command(subcommand)]
        command: ProgressCommand,
    },
    /// Create the submissions table and exit
    Migrate,
}

#[derive(Subcommand, Debug)]
enum ProgressCommand {
    /// Print the saved progress snapshot
    Show {
        /// Print the stored JSON instead of a summary
        #[arg(long)]
        raw: bool,
    },
    /// Delete the saved progress snapshot
    Clear,
}

#[derive(Args, Debug, Default)]
struct StorageOverrides {
    /// Override the configured progress directory
    #[arg(long, global = true)]
    progress_dir: Option<PathBuf>,
    /// Override the configured object store directory
    #[arg(long, global = true)]
    object_store_dir: Option<PathBuf>,
    /// Override the configured database URL
    #[arg(long, global = true)]
    database_url: Option<String>,
    /// Override the configured submissions table
    #[arg(long, global = true)]
    table: Option<String>,
}

impl StorageOverrides {
    fn apply(self, storage: &mut StorageConfig) {
        if let Some(dir) = self.progress_dir {
            storage.progress_dir = dir;
        }
        if let Some(dir) = self.object_store_dir {
            storage.object_store_dir = dir;
        }
        if let Some(url) = self.database_url {
            storage.database_url = url;
        }
        if let Some(table) = self.table {
            storage.submissions_table = table;
        }
    }
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let mut config = AppConfig::load()?;
    cli.overrides.apply(&mut config.storage);

    telemetry::init(&config.telemetry)?;
    debug!(?config.environment, "configuration loaded");

    match cli.command {
        Command::Demo(args) => run_demo(&config, args).await,
        Command::Progress {
            command: ProgressCommand::Show { raw },
        } => show_progress(&config.storage, raw),
        Command::Progress {
            command: ProgressCommand::Clear,
        } => clear_progress(&config.storage),
        Command::Migrate => migrate(&config.storage).await,
    }
}
