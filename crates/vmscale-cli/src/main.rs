//! vmscale: provisions a scaling test bed, runs a load test against it
//! and tears every resource down again.
//!
//! # Usage
//!
//! ```text
//! vmscale horizontal --config run.json --log-dir ./logs
//! vmscale autoscale --config run.json --lg-endpoint lg.internal:8080
//! vmscale --json horizontal --provider sim --sim-duration 600
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;
use vmscale_orchestrator::Scenario;

mod commands;

#[derive(Parser)]
#[command(
    name = "vmscale",
    about = "VM scaling test bed orchestrator",
    version,
    propagate_version = true
)]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Grow a fleet of web instances one window at a time.
    Horizontal(RunArgs),
    /// Run behind a load balancer and scaling group driven by CPU alarms.
    Autoscale(RunArgs),
}

#[derive(Args, Debug, Clone)]
pub(crate) struct RunArgs {
    /// JSON run configuration. Placeholder images are used when omitted.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Use an already running load generator instead of provisioning one.
    #[arg(long)]
    pub lg_endpoint: Option<String>,

    /// Mirror load-generator logs into this directory.
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Cloud provider backend.
    #[arg(long, value_enum, default_value_t = ProviderKind::Sim)]
    pub provider: ProviderKind,

    /// Virtual test length for the simulated load generator, in seconds.
    #[arg(long, default_value = "300")]
    pub sim_duration: u64,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProviderKind {
    /// In-memory provider with virtual time.
    Sim,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json)?;

    match cli.command {
        Command::Horizontal(args) => commands::run::run(Scenario::Horizontal, &args).await,
        Command::Autoscale(args) => commands::run::run(Scenario::AutoScaling, &args).await,
    }
}

fn init_tracing(json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,vmscale=debug"))?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}
