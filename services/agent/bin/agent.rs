//! Main entrypoint for the werewolf agent.
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Initializing logging.
//! 3. Running the session supervisor with the built-in policy.

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use wolf_agent::{
    config::Config,
    policy::{DecisionPolicy, PolicyFactory, SilentPolicy},
    session,
};

#[derive(Parser, Debug)]
#[command(about = "Automated participant for the werewolf game server")]
struct Args {
    /// Overrides the AGENT_INDEX environment variable.
    #[arg(long)]
    index: Option<u32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // --- 1. Load Configuration ---
    let mut config = Config::from_env().context("Failed to load configuration")?;
    if let Some(index) = args.index {
        config.agent_index = index;
    }

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .init();
    info!(
        agent = %config.agent_name(),
        url = %config.websocket_url,
        auto_reconnect = config.auto_reconnect,
        "configuration loaded"
    );

    // --- 3. Run the Session Supervisor ---
    let build_policy: PolicyFactory =
        Arc::new(|| Box::new(SilentPolicy) as Box<dyn DecisionPolicy>);
    session::run_agent(config, build_policy).await
}
