//! Periodic liveness reporting to the controller

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::broker::messages::HeartbeatRequest;
use crate::types::{NetcheckError, Result};

/// Timeout for a single heartbeat request
const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(5);

/// Posts heartbeats to the controller at a fixed interval
pub struct HeartbeatSender {
    http_client: reqwest::Client,
    endpoint: String,
    agent_id: Uuid,
    interval: Duration,
    running: Arc<RwLock<bool>>,
}

impl HeartbeatSender {
    pub fn new(endpoint: String, agent_id: Uuid, interval: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(HEARTBEAT_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http_client,
            endpoint,
            agent_id,
            interval,
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// Send one heartbeat
    pub async fn beat(&self) -> Result<()> {
        let response = self
            .http_client
            .post(&self.endpoint)
            .json(&HeartbeatRequest {
                agent_id: self.agent_id,
            })
            .send()
            .await
            .map_err(|e| NetcheckError::Http(format!("Heartbeat request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(NetcheckError::Http(format!(
                "Controller rejected heartbeat: {}",
                response.status()
            )));
        }

        Ok(())
    }

    /// Start the periodic loop
    ///
    /// The first beat goes out immediately. A failed beat is logged
    /// and retried on the next tick; liveness recovers as soon as the
    /// controller is reachable again.
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            *self.running.write().await = true;
            info!(
                interval_secs = self.interval.as_secs(),
                endpoint = %self.endpoint,
                "Heartbeat loop started"
            );

            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if !*self.running.read().await {
                    break;
                }
                match self.beat().await {
                    Ok(()) => debug!(agent_id = %self.agent_id, "Heartbeat delivered"),
                    Err(e) => warn!(error = %e, "Heartbeat failed"),
                }
            }

            info!("Heartbeat loop stopped");
        })
    }

    pub async fn stop(&self) {
        *self.running.write().await = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::testserver;

    #[tokio::test]
    async fn test_beat_accepts_no_content() {
        let url = testserver::serve(
            testserver::empty_response("HTTP/1.1 204 No Content"),
            1,
        )
        .await;

        let sender = HeartbeatSender::new(url, Uuid::new_v4(), Duration::from_secs(30));
        assert!(sender.beat().await.is_ok());
    }

    #[tokio::test]
    async fn test_beat_rejects_server_error() {
        let url = testserver::serve(
            testserver::empty_response("HTTP/1.1 500 Internal Server Error"),
            1,
        )
        .await;

        let sender = HeartbeatSender::new(url, Uuid::new_v4(), Duration::from_secs(30));
        let err = sender.beat().await.unwrap_err();
        assert!(err.to_string().contains("500"));
    }
}
