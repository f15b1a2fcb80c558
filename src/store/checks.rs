//! Check request and response store
//!
//! Requests are immutable once created; responses accumulate under
//! them, keyed by (request_id, agent_id) so duplicate deliveries from
//! the same agent never produce a second row.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::broker::messages::{CheckDispatch, CheckResult, RequestType};
use crate::types::{NetcheckError, Result};

/// Latency recorded when a result carried none
pub const UNMEASURED_LATENCY_MS: f64 = -1.0;

/// Normalize a target host to carry a scheme
pub fn normalize_host(host: &str) -> String {
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{}", host)
    }
}

/// Stored check request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckRecord {
    pub request_id: Uuid,
    pub request_type: RequestType,
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    pub created_at: DateTime<Utc>,
}

impl CheckRecord {
    /// Wire message dispatching this request to the fleet
    pub fn to_dispatch(&self) -> CheckDispatch {
        CheckDispatch {
            request_id: self.request_id,
            request_type: self.request_type,
            host: self.host.clone(),
            port: self.port,
        }
    }
}

/// Stored response from one agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredResponse {
    pub agent_id: Uuid,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub result: Value,
    /// Negative sentinel when the agent could not measure
    pub latency_ms: f64,
    pub timestamp: DateTime<Utc>,
}

impl From<CheckResult> for StoredResponse {
    fn from(result: CheckResult) -> Self {
        let payload = if result.result.is_null() {
            Value::Object(Default::default())
        } else {
            result.result
        };

        Self {
            agent_id: result.agent_id,
            success: result.success,
            error: result.error,
            result: payload,
            latency_ms: result.latency_ms.unwrap_or(UNMEASURED_LATENCY_MS),
            timestamp: result.timestamp,
        }
    }
}

/// In-memory store of check requests and their accumulated responses
#[derive(Default)]
pub struct CheckStore {
    requests: DashMap<Uuid, CheckRecord>,
    responses: DashMap<Uuid, Vec<StoredResponse>>,
}

impl CheckStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a request with a generated id and normalized host
    pub fn create(&self, request_type: RequestType, host: &str, port: Option<u16>) -> CheckRecord {
        let record = CheckRecord {
            request_id: Uuid::new_v4(),
            request_type,
            host: normalize_host(host),
            port,
            created_at: Utc::now(),
        };
        self.requests.insert(record.request_id, record.clone());
        record
    }

    /// Fetch a request and everything received for it so far
    ///
    /// Zero responses is a valid, still-pending state.
    pub fn get(&self, request_id: Uuid) -> Result<(CheckRecord, Vec<StoredResponse>)> {
        let record = self
            .requests
            .get(&request_id)
            .map(|e| e.clone())
            .ok_or_else(|| {
                NetcheckError::NotFound(format!("Check request {} not found", request_id))
            })?;

        let responses = self
            .responses
            .get(&request_id)
            .map(|e| e.clone())
            .unwrap_or_default();

        Ok((record, responses))
    }

    /// Store a response under its (request_id, agent_id) key
    ///
    /// A later duplicate from the same agent overwrites the earlier row
    /// instead of accumulating a second one.
    pub fn upsert_response(&self, result: CheckResult) -> Result<()> {
        if !self.requests.contains_key(&result.request_id) {
            return Err(NetcheckError::NotFound(format!(
                "Check request {} not found",
                result.request_id
            )));
        }

        let request_id = result.request_id;
        let response = StoredResponse::from(result);

        let mut entry = self.responses.entry(request_id).or_default();
        if let Some(existing) = entry.iter_mut().find(|r| r.agent_id == response.agent_id) {
            *existing = response;
        } else {
            entry.push(response);
        }

        Ok(())
    }

    pub fn count(&self) -> usize {
        self.requests.len()
    }
}
