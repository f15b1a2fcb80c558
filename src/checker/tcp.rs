//! TCP connect checker

use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::{target_host, CheckOutcome, Checker};
use crate::broker::messages::CheckDispatch;

/// Timeout for the connection attempt
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Port probed when the request does not name one
const DEFAULT_PORT: u16 = 80;

/// Attempts a TCP connection to the target host and port
pub struct TcpChecker {
    connect_timeout: Duration,
}

impl TcpChecker {
    pub fn new() -> Self {
        Self {
            connect_timeout: CONNECT_TIMEOUT,
        }
    }
}

impl Default for TcpChecker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Checker for TcpChecker {
    async fn execute(&self, request: &CheckDispatch) -> CheckOutcome {
        let host = target_host(request);
        let port = request.port.unwrap_or(DEFAULT_PORT);

        match timeout(self.connect_timeout, TcpStream::connect((host.as_str(), port))).await {
            Ok(Ok(_stream)) => CheckOutcome::ok(serde_json::json!({ "connected": true })),
            Ok(Err(e)) => CheckOutcome::failed_with(
                serde_json::json!({ "connected": false }),
                format!("TCP connection to {}:{} failed: {}", host, port, e),
            ),
            Err(_) => CheckOutcome::failed_with(
                serde_json::json!({ "connected": false }),
                format!(
                    "TCP connection to {}:{} timed out after {}s",
                    host,
                    port,
                    self.connect_timeout.as_secs()
                ),
            ),
        }
    }
}
