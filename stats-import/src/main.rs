//! stats-import - Statistics import command
//!
//! Reads CSV and MCF inputs from an input directory (or the roots listed in a
//! config file), imports them into SQLite or a static catalog, and writes a
//! status report to `<output_dir>/process/report.json`.
//!
//! Exits with status 1 if the run fails; the report names the failing file.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use stats_import::services::runner::{run_import, RunMode, RunnerOptions};

/// Command-line arguments for stats-import
#[derive(Parser, Debug)]
#[command(name = "stats-import")]
#[command(about = "Import CSV and MCF statistics into a triple store")]
#[command(version)]
#[command(group(
    clap::ArgGroup::new("input")
        .required(true)
        .args(["config_file", "input_dir"])
        .multiple(true)
))]
struct Args {
    /// Config file listing input roots in `dataDownloadUrl`
    #[arg(long, env = "CONFIG_FILE")]
    config_file: Option<PathBuf>,

    /// Input directory (or single file); its config.json is used if present
    #[arg(long, env = "INPUT_DIR")]
    input_dir: Option<PathBuf>,

    /// Output directory
    #[arg(long, env = "OUTPUT_DIR")]
    output_dir: PathBuf,

    #[arg(long, value_enum, default_value_t = RunMode::CustomDc)]
    mode: RunMode,

    /// SQLite database file (default: <output_dir>/datacommons.db)
    #[arg(long, env = "SQLITE_PATH")]
    sqlite_path: Option<PathBuf>,

    /// Entity type for files that don't configure one (e.g. Country, City)
    #[arg(long)]
    entity_type: Option<String>,

    /// Input columns to ignore, comma separated
    #[arg(long, value_delimiter = ',')]
    ignore_columns: Vec<String>,

    /// Keep importing after a file fails (the failure is still reported)
    #[arg(long)]
    continue_on_file_error: bool,
}

impl From<Args> for RunnerOptions {
    fn from(args: Args) -> Self {
        Self {
            config_file: args.config_file,
            input_dir: args.input_dir,
            output_dir: args.output_dir,
            mode: args.mode,
            sqlite_path: args.sqlite_path,
            entity_type: args.entity_type,
            ignore_columns: args.ignore_columns,
            continue_on_file_error: args.continue_on_file_error,
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!(
        "Starting stats-import v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let args = Args::parse();
    info!("Output directory: {}", args.output_dir.display());

    match run_import(args.into()).await {
        Ok(report) => {
            info!(
                run_id = %report.run_id,
                "Import finished: {} file(s)",
                report.import_files.len()
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!("Import failed: {}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}
