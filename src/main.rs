use anyhow::{Context, Result};
use cclf_import::{
    import_directory, pipeline::ImportSummary, retention, store::ParquetStore, ImportError,
    PipelineConfig,
};
use clap::{Parser, Subcommand};
use std::{path::PathBuf, process::ExitCode};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "cclf-import")]
#[command(about = "Validate and load CCLF deliveries from a landing directory")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Import every CCLF group found in the landing directory
    Import {
        /// Directory CCLF archives are delivered into
        #[arg(long, env = "LANDING_DIR")]
        landing_dir: PathBuf,

        /// Where finished and unrecognised files are moved
        #[arg(long, env = "PENDING_DELETION_DIR")]
        pending_deletion_dir: PathBuf,

        /// Root of the Parquet tables imported rows are written to
        #[arg(long, env = "CCLF_STORE_DIR", default_value = "cclf_store")]
        store_dir: PathBuf,

        /// Hours an un-imported file stays before it is moved anyway
        #[arg(long, env = "CCLF_RETENTION_HOURS", default_value_t = retention::DEFAULT_RETENTION_HOURS)]
        retention_hours: i64,

        /// Print the run summary as JSON on stdout
        #[arg(long)]
        json: bool,
    },
    /// Delete everything in the pending deletion directory
    Purge {
        #[arg(long, env = "PENDING_DELETION_DIR")]
        dir: PathBuf,
    },
}

fn main() -> Result<ExitCode> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();

    match Cli::parse().command {
        Command::Import {
            landing_dir,
            pending_deletion_dir,
            store_dir,
            retention_hours,
            json,
        } => {
            let config = PipelineConfig::new(landing_dir, pending_deletion_dir)
                .with_retention_hours(retention_hours);
            config.prepare()?;
            let store = ParquetStore::open(&store_dir)
                .with_context(|| format!("opening store at {}", store_dir.display()))?;

            let (summary, failed) = match import_directory(&config, &store) {
                Ok(summary) => (summary, false),
                Err(ImportError::BatchImport { summary }) => (summary, true),
                Err(err) => return Err(err).context("import aborted"),
            };
            report(&summary, json)?;
            if failed {
                error!("one or more files failed to import correctly");
                return Ok(ExitCode::FAILURE);
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Purge { dir } => {
            let deleted = retention::purge_directory(&dir)
                .with_context(|| format!("purging {}", dir.display()))?;
            info!(deleted, dir = %dir.display(), "purge complete");
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn report(summary: &ImportSummary, json: bool) -> Result<()> {
    info!(
        success = summary.success,
        failure = summary.failure,
        skipped = summary.skipped,
        "completed CCLF import"
    );
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
    }
    Ok(())
}
