//! reportflow - scheduled analytics report pipeline
//!
//! Main entry point for the reportflow CLI.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tracing::debug;

mod commands;

use commands::{jobs, run, schedule, validate};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// reportflow - query an analytics API on a schedule and render reports
#[derive(Parser)]
#[command(name = "reportflow")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Settings document (JSON, TOML or YAML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log every rendered document
    #[arg(long, global = true)]
    pub show_output: bool,

    /// Log the resolved settings document
    #[arg(long, global = true)]
    pub show_config: bool,

    /// OAuth client id (overrides env and settings)
    #[arg(long, global = true)]
    pub client_id: Option<String>,

    /// OAuth client secret (overrides env and settings)
    #[arg(long, global = true)]
    pub client_secret: Option<String>,

    /// Directory for rolling JSON log files
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run jobs once, now
    Run(run::RunArgs),

    /// Run jobs on their cron schedules until interrupted
    Schedule(schedule::ScheduleArgs),

    /// Validate the settings document without contacting the API
    Validate(validate::ValidateArgs),

    /// List configured jobs
    Jobs(jobs::JobsArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let path = reportflow_config::discover_config_path(cli.config.as_deref())
        .context("cannot locate a settings document")?;
    let document = reportflow_config::load_document(&path)
        .with_context(|| format!("cannot load {}", path.display()))?;
    let settings = reportflow_config::Settings::from_value(&document.root)
        .with_context(|| format!("invalid settings in {}", path.display()))?;

    // Console (human-readable) + rotating JSON file
    let console_filter = if cli.verbose {
        "reportflow=debug,reportflow_pipeline=debug,reportflow_client=debug,reportflow_config=debug,info".to_string()
    } else {
        settings.logging.level.clone().unwrap_or_else(|| {
            "reportflow=info,reportflow_pipeline=info,reportflow_client=info,reportflow_config=info,warn"
                .to_string()
        })
    };
    let log_dir = cli
        .log_dir
        .clone()
        .or_else(|| {
            settings
                .logging
                .directory
                .as_ref()
                .map(|dir| document.base_dir.join(dir))
        })
        .unwrap_or_else(reportflow_config::default_log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "reportflow.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&console_filter)),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "reportflow=trace,reportflow_pipeline=trace,reportflow_client=debug,reportflow_config=debug,info",
                )),
        )
        .init();

    debug!(path = %document.path.display(), format = ?document.format, "Settings loaded");
    if cli.show_config {
        debug!(
            "Resolved settings:\n{}",
            serde_json::to_string_pretty(&commands::redacted(&document.root))?
        );
    }

    let ctx = commands::Context {
        document,
        settings,
        verbose: cli.verbose,
        show_output: cli.show_output,
        client_id: cli.client_id,
        client_secret: cli.client_secret,
    };

    // Dispatch to command handlers
    match cli.command {
        Commands::Run(args) => run::run(args, &ctx).await,
        Commands::Schedule(args) => schedule::run(args, &ctx).await,
        Commands::Validate(args) => validate::run(args, &ctx).await,
        Commands::Jobs(args) => jobs::run(args, &ctx).await,
    }
}
