//! Netcheck agent - distributed reachability probe
//!
//! Run one agent per vantage point. The agent registers with the
//! controller using its provisioning token, then executes checks
//! pulled from its queue until stopped.
//!
//! Usage:
//!   netcheck-agent --registration-token <uuid>
//!
//! Environment variables:
//!   REGISTRATION_URL - Controller registration endpoint
//!   REGISTRATION_TOKEN - One-time key from agent creation (required)
//!   REGION - Region label reported with host facts (default: default)
//!   GET_IP_API_URL - Public address lookup service (default: https://api.ipify.org)
//!   NUM_WORKERS - Concurrent check workers (default: 4)
//!   CHECK_TIMEOUT_SECS - Hard cap per check (default: 30)
//!   LOG_LEVEL - Log level (default: info)

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use netcheck::agent::{AgentArgs, AgentRuntime};

#[tokio::main]
async fn main() {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = AgentArgs::parse();

    // Initialize logging
    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("netcheck={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!(
        "Starting netcheck agent (controller: {}, region: {}, workers: {})",
        args.registration_url, args.region, args.num_workers
    );

    let runtime = AgentRuntime::new(args);
    if let Err(e) = runtime.run().await {
        error!("Agent error: {}", e);
        std::process::exit(1);
    }
}
