//! Agent process lifecycle

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::broker::BrokerClient;
use crate::checker::CheckerSet;
use crate::types::{NetcheckError, Result};

use super::heartbeat::HeartbeatSender;
use super::registration::RegistrationClient;
use super::sysinfo;
use super::worker::CheckWorker;

/// How long to wait for workers to finish their batch at shutdown
const WORKER_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Command-line arguments for the probe agent
#[derive(Parser, Debug, Clone)]
#[command(
    name = "netcheck-agent",
    about = "Network reachability probe agent",
    version
)]
pub struct AgentArgs {
    /// Controller registration endpoint
    #[arg(
        long,
        env = "REGISTRATION_URL",
        default_value = "http://localhost:8080/api/v1/agents/register"
    )]
    pub registration_url: String,

    /// Provisioning token issued when the agent was created
    #[arg(long, env = "REGISTRATION_TOKEN")]
    pub registration_token: Uuid,

    /// Region label reported with host facts
    #[arg(long, env = "REGION", default_value = "default")]
    pub region: String,

    /// External service answering with this host's public address
    #[arg(long, env = "GET_IP_API_URL", default_value = "https://api.ipify.org")]
    pub get_ip_api_url: String,

    /// Number of concurrent check workers
    #[arg(long, env = "NUM_WORKERS", default_value = "4")]
    pub num_workers: usize,

    /// Hard cap on a single check execution in seconds
    #[arg(long, env = "CHECK_TIMEOUT_SECS", default_value = "30")]
    pub check_timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl AgentArgs {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.num_workers == 0 {
            return Err("NUM_WORKERS must be at least 1".to_string());
        }
        if self.check_timeout_secs == 0 {
            return Err("CHECK_TIMEOUT_SECS must be at least 1".to_string());
        }
        url::Url::parse(&self.registration_url)
            .map_err(|e| format!("REGISTRATION_URL is not a valid URL: {}", e))?;
        Ok(())
    }

    fn check_timeout(&self) -> Duration {
        Duration::from_secs(self.check_timeout_secs)
    }
}

/// Wires registration, workers, and the heartbeat loop together
pub struct AgentRuntime {
    args: AgentArgs,
}

impl AgentRuntime {
    pub fn new(args: AgentArgs) -> Self {
        Self { args }
    }

    /// Register, connect to the broker, and run workers until shutdown
    pub async fn run(&self) -> Result<()> {
        let info = sysinfo::gather(&self.args.region, &self.args.get_ip_api_url).await;
        info!(
            hostname = %info.hostname,
            region = %info.region,
            local_ip = %info.local_ip,
            public_ip = %info.public_ip,
            "Gathered host facts"
        );

        let registration = RegistrationClient::new(
            self.args.registration_url.clone(),
            self.args.registration_token,
        );
        let response = registration.register(&info).await?;
        let agent_id = response.agent_id;
        let credentials = response.broker_credentials;

        let broker = BrokerClient::connect_with_credentials(
            &credentials.server_url,
            &credentials.username,
            &credentials.password,
            "netcheck-agent",
        )
        .await?;
        info!(
            server_url = %credentials.server_url,
            username = %credentials.username,
            "Connected to broker"
        );

        let checkers = Arc::new(CheckerSet::new()?);
        let running = Arc::new(RwLock::new(true));

        let mut workers = Vec::with_capacity(self.args.num_workers);
        for worker_id in 0..self.args.num_workers {
            let worker = CheckWorker::new(
                worker_id,
                agent_id,
                &credentials,
                broker.clone(),
                Arc::clone(&checkers),
                self.args.check_timeout(),
                Arc::clone(&running),
            );
            workers.push(tokio::spawn(async move {
                if let Err(e) = worker.run().await {
                    error!(worker_id, error = %e, "Worker exited with error");
                }
            }));
        }

        let heartbeat = Arc::new(HeartbeatSender::new(
            response.heartbeat_endpoint.clone(),
            agent_id,
            Duration::from_secs(response.heartbeat_interval_sec),
        ));
        let heartbeat_handle = Arc::clone(&heartbeat).start();

        info!(
            agent_id = %agent_id,
            workers = self.args.num_workers,
            "Agent running, press Ctrl+C to stop"
        );

        tokio::signal::ctrl_c()
            .await
            .map_err(|e| NetcheckError::Internal(format!("Failed to listen for shutdown: {}", e)))?;
        info!("Shutdown signal received, draining workers");

        *running.write().await = false;
        heartbeat.stop().await;

        for (worker_id, handle) in workers.into_iter().enumerate() {
            match tokio::time::timeout(WORKER_DRAIN_TIMEOUT, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(worker_id, error = %e, "Worker task failed"),
                Err(_) => warn!(worker_id, "Worker did not drain in time"),
            }
        }
        heartbeat_handle.abort();

        broker.flush().await?;
        info!("Shutdown complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> AgentArgs {
        AgentArgs::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_defaults_validate() {
        let args = parse(&[
            "netcheck-agent",
            "--registration-token",
            "5f0c4f0a-9204-4f58-a2b3-6091e9e0c2a6",
        ]);
        assert!(args.validate().is_ok());
        assert_eq!(args.num_workers, 4);
        assert_eq!(args.check_timeout_secs, 30);
        assert_eq!(args.region, "default");
    }

    #[test]
    fn test_zero_workers_rejected() {
        let args = parse(&[
            "netcheck-agent",
            "--registration-token",
            "5f0c4f0a-9204-4f58-a2b3-6091e9e0c2a6",
            "--num-workers",
            "0",
        ]);
        assert!(args.validate().unwrap_err().contains("NUM_WORKERS"));
    }

    #[test]
    fn test_malformed_registration_url_rejected() {
        let args = parse(&[
            "netcheck-agent",
            "--registration-token",
            "5f0c4f0a-9204-4f58-a2b3-6091e9e0c2a6",
            "--registration-url",
            "not a url",
        ]);
        assert!(args.validate().unwrap_err().contains("REGISTRATION_URL"));
    }

    #[test]
    fn test_token_is_required() {
        assert!(AgentArgs::try_parse_from(["netcheck-agent"]).is_err());
    }
}
