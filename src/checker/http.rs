//! HTTP reachability checker

use async_trait::async_trait;
use std::time::Duration;

use super::{CheckOutcome, Checker};
use crate::broker::messages::CheckDispatch;
use crate::types::{NetcheckError, Result};

/// Per-request timeout for the HTTP client
const HTTP_TIMEOUT: Duration = Duration::from_secs(5);

/// Characters of body kept as a sample in the result payload
const CONTENT_SAMPLE_CHARS: usize = 200;

/// Issues a GET against the target and reports on the exchange
///
/// Any completed HTTP exchange counts as success regardless of status
/// code; only transport failures fail the check.
pub struct HttpChecker {
    client: reqwest::Client,
}

impl HttpChecker {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| NetcheckError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Checker for HttpChecker {
    async fn execute(&self, request: &CheckDispatch) -> CheckOutcome {
        let response = match self.client.get(&request.host).send().await {
            Ok(response) => response,
            Err(e) => return CheckOutcome::failed(format!("HTTP request failed: {}", e)),
        };

        let status_code = response.status().as_u16();
        let final_url = response.url().to_string();
        let redirected = final_url.trim_end_matches('/') != request.host.trim_end_matches('/');

        let headers: serde_json::Map<String, serde_json::Value> = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    serde_json::Value::String(String::from_utf8_lossy(value.as_bytes()).to_string()),
                )
            })
            .collect();

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return CheckOutcome::failed(format!("Failed to read HTTP body: {}", e)),
        };

        let content_sample: String = body.chars().take(CONTENT_SAMPLE_CHARS).collect();

        CheckOutcome::ok(serde_json::json!({
            "status_code": status_code,
            "final_url": final_url,
            "redirected": redirected,
            "headers": headers,
            "content_length": body.len(),
            "content_sample": content_sample,
        }))
    }
}
