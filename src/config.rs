//! Configuration for the netcheck controller
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;
use uuid::Uuid;

/// Netcheck - controller for distributed network reachability checks
#[derive(Parser, Debug, Clone)]
#[command(name = "netcheck")]
#[command(about = "Controller for a fleet of distributed network probe agents")]
pub struct Args {
    /// Unique node identifier for this controller instance
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Public base URL of this controller, as reachable by agents
    /// Used to build the heartbeat endpoint handed out at registration
    #[arg(long, env = "PUBLIC_URL", default_value = "http://localhost:8080")]
    pub public_url: String,

    /// NATS configuration
    #[command(flatten)]
    pub nats: NatsArgs,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Interval in seconds between agent heartbeats
    /// Communicated to agents in the registration response
    #[arg(long, env = "AGENT_HEARTBEAT_INTERVAL_SEC", default_value = "30")]
    pub agent_heartbeat_interval_sec: u64,

    /// Seconds a recorded heartbeat stays valid before the agent is
    /// considered not live; must exceed the heartbeat interval so a
    /// single missed heartbeat does not flip liveness
    #[arg(long, env = "AGENT_HEARTBEAT_TIMEOUT_SEC", default_value = "55")]
    pub agent_heartbeat_timeout_sec: u64,
}

/// NATS connection configuration
#[derive(Parser, Debug, Clone)]
pub struct NatsArgs {
    /// NATS server URL
    #[arg(long, env = "NATS_URL", default_value = "nats://127.0.0.1:4222")]
    pub nats_url: String,

    /// NATS username (optional)
    #[arg(long, env = "NATS_USER")]
    pub nats_user: Option<String>,

    /// NATS password (optional)
    #[arg(long, env = "NATS_PASSWORD")]
    pub nats_password: Option<String>,

    /// NATS server URL advertised to agents (falls back to NATS_URL)
    /// Useful when agents reach the broker through a different host
    #[arg(long, env = "NATS_PUBLIC_URL")]
    pub nats_public_url: Option<String>,

    /// Base URL of the broker's user administration HTTP API
    #[arg(long, env = "NATS_ADMIN_URL", default_value = "http://127.0.0.1:8222")]
    pub nats_admin_url: String,

    /// Username for the broker admin API (optional)
    #[arg(long, env = "NATS_ADMIN_USER")]
    pub nats_admin_user: Option<String>,

    /// Password for the broker admin API (optional)
    #[arg(long, env = "NATS_ADMIN_PASSWORD")]
    pub nats_admin_password: Option<String>,
}

impl NatsArgs {
    /// Get the broker URL handed out to agents (falls back to nats_url if not set)
    pub fn public_url(&self) -> &str {
        self.nats_public_url.as_deref().unwrap_or(&self.nats_url)
    }
}

impl Args {
    /// Expected interval between heartbeats from one agent
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.agent_heartbeat_interval_sec)
    }

    /// Time-to-live of a recorded heartbeat in the liveness cache
    pub fn heartbeat_ttl(&self) -> Duration {
        Duration::from_secs(self.agent_heartbeat_timeout_sec)
    }

    /// Full URL agents should POST heartbeats to
    pub fn heartbeat_endpoint(&self) -> String {
        format!(
            "{}/api/v1/agents/heartbeat",
            self.public_url.trim_end_matches('/')
        )
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.agent_heartbeat_interval_sec == 0 {
            return Err("AGENT_HEARTBEAT_INTERVAL_SEC must be greater than zero".to_string());
        }

        if self.agent_heartbeat_timeout_sec <= self.agent_heartbeat_interval_sec {
            return Err(
                "AGENT_HEARTBEAT_TIMEOUT_SEC must be greater than AGENT_HEARTBEAT_INTERVAL_SEC"
                    .to_string(),
            );
        }

        if url::Url::parse(&self.public_url).is_err() {
            return Err("PUBLIC_URL must be a valid URL".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).expect("args should parse")
    }

    #[test]
    fn test_defaults_validate() {
        let args = parse(&["netcheck"]);
        assert!(args.validate().is_ok());
        assert_eq!(args.heartbeat_interval(), Duration::from_secs(30));
        assert_eq!(args.heartbeat_ttl(), Duration::from_secs(55));
    }

    #[test]
    fn test_timeout_must_exceed_interval() {
        let args = parse(&[
            "netcheck",
            "--agent-heartbeat-interval-sec",
            "30",
            "--agent-heartbeat-timeout-sec",
            "30",
        ]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_heartbeat_endpoint_strips_trailing_slash() {
        let args = parse(&["netcheck", "--public-url", "http://ctrl.example.com/"]);
        assert_eq!(
            args.heartbeat_endpoint(),
            "http://ctrl.example.com/api/v1/agents/heartbeat"
        );
    }

    #[test]
    fn test_nats_public_url_fallback() {
        let args = parse(&["netcheck", "--nats-url", "nats://broker:4222"]);
        assert_eq!(args.nats.public_url(), "nats://broker:4222");

        let args = parse(&[
            "netcheck",
            "--nats-url",
            "nats://internal:4222",
            "--nats-public-url",
            "nats://edge.example.com:4222",
        ]);
        assert_eq!(args.nats.public_url(), "nats://edge.example.com:4222");
    }
}
