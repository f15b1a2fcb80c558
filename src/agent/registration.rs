//! Registration against the controller with retry

use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::broker::messages::{RegistrationRequest, RegistrationResponse};
use crate::cache::AgentInfo;
use crate::types::{NetcheckError, Result};

/// Timeout for a single registration request
const REGISTRATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Exponential backoff schedule for registration attempts
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay after the given 1-based attempt fails
    fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .mul_f64(self.multiplier.powi(attempt as i32 - 1))
    }
}

/// Exchanges the provisioning token for broker credentials
pub struct RegistrationClient {
    http_client: reqwest::Client,
    registration_url: String,
    token: Uuid,
    policy: RetryPolicy,
}

impl RegistrationClient {
    pub fn new(registration_url: String, token: Uuid) -> Self {
        Self::with_policy(registration_url, token, RetryPolicy::default())
    }

    pub fn with_policy(registration_url: String, token: Uuid, policy: RetryPolicy) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(REGISTRATION_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http_client,
            registration_url,
            token,
            policy,
        }
    }

    /// Register with the controller, retrying with backoff
    ///
    /// Exhausting the schedule is fatal for the agent process; without
    /// credentials there is nothing useful left to do.
    pub async fn register(&self, info: &AgentInfo) -> Result<RegistrationResponse> {
        let request = RegistrationRequest {
            token: self.token,
            info: info.clone(),
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_register(&request).await {
                Ok(response) => {
                    info!(agent_id = %response.agent_id, attempt, "Registered with controller");
                    return Ok(response);
                }
                Err(e) => {
                    if attempt >= self.policy.max_attempts {
                        return Err(NetcheckError::Registration(format!(
                            "Giving up after {} attempts: {}",
                            attempt, e
                        )));
                    }
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        error = %e,
                        attempt,
                        delay_secs = delay.as_secs_f64(),
                        "Registration attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn try_register(&self, request: &RegistrationRequest) -> Result<RegistrationResponse> {
        let response = self
            .http_client
            .post(&self.registration_url)
            .json(request)
            .send()
            .await
            .map_err(|e| NetcheckError::Http(format!("Registration request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NetcheckError::Registration(format!(
                "Controller returned {}: {}",
                status, body
            )));
        }

        response
            .json::<RegistrationResponse>()
            .await
            .map_err(|e| NetcheckError::Registration(format!("Malformed registration response: {}", e)))
    }
}
