//! Command line surface

use crate::duration::parse_duration;
use anyhow::Context;
use bootstrap_plan::{LocalApplyEngine, run_probes};
use bootstrapper::{
    BootstrapOutcome, BootstrapSettings, Bootstrapper, DEFAULT_CONFIG_FILE, DEFAULT_DATA_DIR, RetryRunner,
    SLEEP_FIRST_DELAY, collect_info,
};
use clap::{Args, Parser, Subcommand};
use node_config::ConfigResolver;
use node_planner::{PlanBuilder, RuntimeLayout, VersionResolver, plan_file};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Top-level command line.
#[derive(Debug, Parser)]
#[command(name = "nodestrap", version, about = "Bootstrap a k3s node from its config")]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Bootstrap the node once and record completion
    Bootstrap(BootstrapArgs),
    /// Print the configured and installed versions
    Info,
    /// Wait until the probes of a plan file are healthy
    Probe(ProbeArgs),
    /// Run a command until it succeeds
    Retry(RetryArgs),
}

#[derive(Debug, Args, Clone)]
struct BootstrapArgs {
    /// Bootstrap even if the node was bootstrapped before
    #[arg(short, long)]
    force: bool,
}

#[derive(Debug, Args, Clone)]
struct ProbeArgs {
    #[arg(long, default_value = "5s", value_parser = parse_duration)]
    interval: Duration,
    #[arg(long, default_value_os_t = default_plan_file())]
    file: PathBuf,
}

#[derive(Debug, Args, Clone)]
struct RetryArgs {
    /// Wait before the first attempt
    #[arg(short = 's', long = "sleep-first")]
    sleep_first: bool,
    #[arg(value_name = "COMMAND", required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

fn default_plan_file() -> PathBuf {
    plan_file(Path::new(DEFAULT_DATA_DIR))
}

impl Cli {
    /// Runs the selected subcommand until it finishes or `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) -> anyhow::Result<()> {
        match self.command {
            Command::Bootstrap(args) => bootstrap(args, &cancel).await,
            Command::Info => {
                let planner = plan_builder()?;
                let info = collect_info(
                    &ConfigResolver::default(),
                    &planner,
                    Path::new(DEFAULT_CONFIG_FILE),
                )
                .await;
                print!("{info}");
                Ok(())
            }
            Command::Probe(args) => run_probes(&args.file, args.interval, &cancel)
                .await
                .with_context(|| format!("probing {}", args.file.display())),
            Command::Retry(args) => {
                let mut runner = RetryRunner::default();
                if args.sleep_first {
                    runner = runner.with_initial_delay(SLEEP_FIRST_DELAY);
                }
                let attempts = runner.run(&args.command, &cancel).await?;
                info!("Command {:?} succeeded after {} attempt(s)", args.command, attempts);
                Ok(())
            }
        }
    }
}

async fn bootstrap(args: BootstrapArgs, cancel: &CancellationToken) -> anyhow::Result<()> {
    let settings = BootstrapSettings {
        force: args.force,
        ..Default::default()
    };
    let bootstrapper = Bootstrapper::new(
        settings,
        ConfigResolver::default(),
        plan_builder()?,
        Arc::new(LocalApplyEngine::default()),
    );

    match bootstrapper.run(cancel).await? {
        BootstrapOutcome::Bootstrapped { version } => info!("Node bootstrapped with {}", version),
        BootstrapOutcome::AlreadyBootstrapped | BootstrapOutcome::Skipped => {}
    }
    Ok(())
}

fn plan_builder() -> anyhow::Result<PlanBuilder> {
    let versions = Arc::new(VersionResolver::new().context("building version resolver")?);
    let self_exe = std::env::current_exe().context("locating own executable")?;
    Ok(PlanBuilder::new(versions, RuntimeLayout::default(), self_exe))
}
