//! dlwp-proc - batch driver for the Doppler lidar wind profiler
//!
//! Subcommands: `init-db` bootstraps the store, `qc` runs one QC tagging
//! batch, `wind` runs one VAD retrieval batch. Ctrl-C requests a
//! cooperative cancel that takes effect between batch units.

use anyhow::Result;
use clap::{Parser, Subcommand};
use dlwp_common::config::{resolve_db_path, Config};
use dlwp_common::db::init_database;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "dlwp-proc", version, about = "Doppler lidar wind profiler batch processor")]
struct Cli {
    /// Path to a TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Database file path (overrides DLWP_DB and the config file)
    #[arg(long)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the database schema and seed the standard QC rules
    InitDb,
    /// Run one QC tagging batch over all pending headers
    Qc,
    /// Run one VAD wind-retrieval batch over all solvable gates
    Wind {
        /// Provenance tag stamped on this run's fits
        #[arg(long)]
        rule_tag: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Starting dlwp-proc v{}", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    let db_path = resolve_db_path(cli.db.as_deref(), &config);
    info!("Database path: {}", db_path.display());

    let pool = init_database(&db_path).await?;

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received, finishing current unit then stopping");
            signal_cancel.cancel();
        }
    });

    match cli.command {
        Command::InitDb => {
            info!("Database initialized");
        }
        Command::Qc => {
            let summary = dlwp_proc::run_qc_pass(&pool, &config.qc, &cancel).await?;
            info!(
                headers_processed = summary.headers_processed,
                headers_failed = summary.headers_failed,
                rows_passed = summary.rows_passed,
                rows_failed = summary.rows_failed,
                cancelled = summary.cancelled,
                "QC batch finished"
            );
        }
        Command::Wind { rule_tag } => {
            let mut params = config.solver.clone();
            if let Some(tag) = rule_tag {
                params.rule_tag = tag;
            }
            let summary = dlwp_proc::run_wind_pass(&pool, &params, &cancel).await?;
            info!(
                run_id = summary.run_id,
                gates_solved = summary.gates_solved,
                gates_failed = summary.gates_failed,
                chunks_failed = summary.chunks_failed,
                cancelled = summary.cancelled,
                "wind batch finished"
            );
        }
    }

    Ok(())
}
