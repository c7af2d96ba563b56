//! Dataplane agent entry point.
//!
//! Loads the agent configuration, builds the simulated device, runs the
//! startup resync against a desired-state document and prints the result
//! as JSON.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use dpagent::audit::init_logging;
use dpagent::config::{AgentConfig, ResyncStrategy, DEFAULT_CONFIG_PATH};
use dpagent::{Agent, DesiredState, SimDevice};
use tracing::{error, info, warn};

/// Dataplane reconciliation agent
#[derive(Parser, Debug)]
#[command(name = "dpagent")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Agent configuration file (TOML)
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Desired state document (JSON); empty desired state if omitted
    #[arg(short = 'd', long)]
    desired: Option<PathBuf>,

    /// Override the configured resync strategy
    #[arg(short = 's', long, value_enum)]
    strategy: Option<ResyncStrategy>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Keep running after the resync until interrupted
    #[arg(long)]
    wait: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    init_logging(&args.log_level, args.json_logs);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("dpagent failed: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = AgentConfig::load_or_default(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(strategy) = args.strategy {
        config.agent.resync_strategy = strategy;
    }
    config.validate()?;

    let desired = match &args.desired {
        Some(path) => DesiredState::load(path)
            .with_context(|| format!("loading desired state from {}", path.display()))?,
        None => DesiredState::default(),
    };

    info!("====================================================================");
    info!("Starting dpagent");
    info!("====================================================================");
    info!("Resync strategy: {}", config.agent.resync_strategy);
    info!("Device timeout: {}ms", config.agent.device_timeout_ms);
    info!("Desired objects: {}", desired.len());

    let device = SimDevice::from_config(&config.simulation);
    let agent = Arc::new(Agent::new(config, device.handlers()));

    let token = agent.cancellation_token();
    let shutdown_handle = tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Received SIGINT, shutting down gracefully...");
                token.cancel();
            }
            Err(err) => error!("Failed to listen for ctrl-c: {}", err),
        }
    });

    // Device calls block; keep them off the runtime threads
    let worker = Arc::clone(&agent);
    let report = tokio::task::spawn_blocking(move || worker.resync(desired))
        .await
        .context("resync task failed")??;

    let output = serde_json::json!({
        "resync": report,
        "state": agent.snapshot(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    if args.wait {
        info!("Resync complete; waiting for SIGINT");
        agent.cancellation_token().cancelled().await;
    }
    shutdown_handle.abort();

    info!(mutations = device.mutations(), "dpagent shutdown complete");
    Ok(())
}
