mod cli;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use taskslot_core::Config;
use taskslot_scheduler::{CycleReport, SchedulerSession};
use taskslot_store::JsonFileTaskStore;

use crate::cli::{CliArgs, RunMode};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();
    let config = load_config(&args)?;
    config.log_summary();

    let store = Arc::new(JsonFileTaskStore::from_config(&args.tasks, &config));
    info!(tasks = %args.tasks.display(), "Using task file");
    let session = SchedulerSession::new(config.scheduler, store);

    if args.mode.is_single_cycle() {
        let report = session.run_cycle().await;
        print_report(&report)?;
        return Ok(if report.is_success() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    }

    session
        .run_continuous(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await;
    Ok(ExitCode::SUCCESS)
}

/// Resolve the effective configuration for a run.
///
/// A `--config` file replaces environment lookup entirely. `test` mode
/// always forces a dry run.
fn load_config(args: &CliArgs) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load_toml(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => {
            taskslot_core::config::load_dotenv();
            Config::from_env()
        }
    };
    if args.mode == RunMode::Test {
        config.scheduler.dry_run = true;
    }
    config.validate().context("invalid scheduler configuration")?;
    Ok(config)
}

fn print_report(report: &CycleReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("failed to render cycle report")?;
    println!("{json}");
    Ok(())
}
