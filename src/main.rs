//! Netcheck controller - agent fleet orchestration and check dispatch

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use netcheck::{
    broker::{BrokerAdminClient, BrokerClient, CredentialProvisioner},
    cache::spawn_liveness_cleanup_task,
    config::Args,
    dispatch::ResponseCorrelator,
    server::{self, AppState},
};

/// How often expired heartbeat entries are swept
const LIVENESS_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing/logging
    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("netcheck={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Validate configuration
    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    // Print startup banner
    info!("======================================");
    info!("  Netcheck Controller");
    info!("======================================");
    info!("Node ID: {}", args.node_id);
    info!("Listen: {}", args.listen);
    info!("Public URL: {}", args.public_url);
    info!("NATS: {}", args.nats.nats_url);
    info!("NATS admin: {}", args.nats.nats_admin_url);
    info!(
        "Heartbeat: every {}s, timeout {}s",
        args.agent_heartbeat_interval_sec, args.agent_heartbeat_timeout_sec
    );
    info!("======================================");

    // Connect to NATS
    let broker =
        match BrokerClient::connect(&args.nats, &format!("netcheck-{}", args.node_id)).await {
            Ok(client) => {
                info!("NATS connected successfully");
                client
            }
            Err(e) => {
                error!("NATS connection failed: {}", e);
                std::process::exit(1);
            }
        };

    // Provisioner owns stream setup and per-agent broker identities
    let admin = BrokerAdminClient::new(
        &args.nats.nats_admin_url,
        args.nats.nats_admin_user.clone(),
        args.nats.nats_admin_password.clone(),
    );
    let provisioner =
        CredentialProvisioner::new(&broker, admin, args.nats.public_url().to_string());

    if let Err(e) = provisioner.ensure_streams().await {
        error!("Failed to ensure broker streams: {}", e);
        std::process::exit(1);
    }
    info!("Broker streams ready");

    let state = Arc::new(AppState::new(args, broker, provisioner));

    // Expire stale heartbeat entries in the background
    spawn_liveness_cleanup_task(Arc::clone(&state.liveness), LIVENESS_CLEANUP_INTERVAL);

    // Pull agent replies into the check store
    let correlator = Arc::new(ResponseCorrelator::new(&state.broker, Arc::clone(&state.checks)));
    let correlator_task = Arc::clone(&correlator);
    let correlator_handle = tokio::spawn(async move {
        if let Err(e) = correlator_task.run().await {
            error!("Response correlator error: {}", e);
        }
    });

    // Serve until the process is told to stop
    tokio::select! {
        result = server::run(Arc::clone(&state)) => {
            if let Err(e) = result {
                error!("Server error: {:?}", e);
                std::process::exit(1);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    correlator.stop().await;
    if tokio::time::timeout(Duration::from_secs(10), correlator_handle)
        .await
        .is_err()
    {
        warn!("Correlator did not stop in time");
    }

    if let Err(e) = state.broker.flush().await {
        warn!("Broker flush failed during shutdown: {}", e);
    }
    info!("Shutdown complete");
    Ok(())
}
