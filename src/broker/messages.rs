//! Message types exchanged between the controller and probe agents
//!
//! Defines the JetStream wire format for check dispatch and results,
//! plus the registration handshake payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use crate::cache::AgentInfo;

/// Stream capturing dispatched check requests, fanned out to every agent consumer
pub const DISPATCH_STREAM: &str = "CHECKS";

/// Subject check requests are published to
pub const DISPATCH_SUBJECT: &str = "netcheck.checks.dispatch";

/// Stream capturing check results from the whole fleet
pub const RESPONSE_STREAM: &str = "CHECK_RESPONSES";

/// Subject agents publish check results to
pub const RESPONSE_SUBJECT: &str = "netcheck.checks.responses";

/// Durable consumer the controller drains results through
pub const RESPONSE_CONSUMER: &str = "controller";

/// Kind of network check an agent should perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestType {
    Info,
    Ping,
    Http,
    TcpConnect,
    UdpConnect,
    Dns,
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestType::Info => "INFO",
            RequestType::Ping => "PING",
            RequestType::Http => "HTTP",
            RequestType::TcpConnect => "TCP_CONNECT",
            RequestType::UdpConnect => "UDP_CONNECT",
            RequestType::Dns => "DNS",
        };
        f.write_str(name)
    }
}

/// Check request fanned out to the fleet (controller -> dispatch subject)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckDispatch {
    /// Request this message belongs to; echoed back in every result
    pub request_id: Uuid,

    pub request_type: RequestType,

    /// Target host, normalized to carry a scheme
    pub host: String,

    /// Target port, where the check type uses one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

/// Result of one executed check (agent -> response subject)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub request_id: Uuid,

    /// Identity of the agent that ran the check
    pub agent_id: Uuid,

    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Checker-specific payload; an empty object when the checker produced none
    #[serde(default)]
    pub result: Value,

    /// Wall-clock execution time; absent when unmeasurable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,

    pub timestamp: DateTime<Utc>,
}

/// Payload an agent presents to complete registration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationRequest {
    /// One-time key issued when the agent record was created
    pub token: Uuid,

    /// Environment info declared by the agent
    #[serde(flatten)]
    pub info: AgentInfo,
}

/// Broker connection details handed to an agent at registration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerCredentials {
    /// Broker URL the agent should connect to
    pub server_url: String,

    pub username: String,
    pub password: String,

    /// Stream the agent's dedicated consumer draws from
    pub stream: String,

    /// Name of the agent's dedicated durable consumer
    pub consumer_name: String,

    /// Subject check results must be published to
    pub response_subject: String,
}

/// Registration response carrying credentials and heartbeat instructions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationResponse {
    pub broker_credentials: BrokerCredentials,

    pub agent_id: Uuid,

    /// Seconds between heartbeats the agent is expected to send
    pub heartbeat_interval_sec: u64,

    /// Full URL the agent should POST heartbeats to
    pub heartbeat_endpoint: String,
}

/// Heartbeat body POSTed by agents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub agent_id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_wire_format() {
        let dispatch = CheckDispatch {
            request_id: Uuid::new_v4(),
            request_type: RequestType::TcpConnect,
            host: "http://example.com".to_string(),
            port: Some(8080),
        };

        let value = serde_json::to_value(&dispatch).unwrap();
        assert_eq!(value["request_type"], "TCP_CONNECT");
        assert_eq!(value["host"], "http://example.com");
        assert_eq!(value["port"], 8080);
    }

    #[test]
    fn test_dispatch_port_optional_on_wire() {
        let json = format!(
            r#"{{"request_id":"{}","request_type":"DNS","host":"http://example.com"}}"#,
            Uuid::new_v4()
        );
        let dispatch: CheckDispatch = serde_json::from_str(&json).unwrap();
        assert_eq!(dispatch.request_type, RequestType::Dns);
        assert!(dispatch.port.is_none());
    }

    #[test]
    fn test_request_type_display_matches_wire() {
        for request_type in [
            RequestType::Info,
            RequestType::Ping,
            RequestType::Http,
            RequestType::TcpConnect,
            RequestType::UdpConnect,
            RequestType::Dns,
        ] {
            let wire = serde_json::to_value(request_type).unwrap();
            assert_eq!(wire, request_type.to_string());
        }
    }

    #[test]
    fn test_registration_request_flattens_info() {
        let request = RegistrationRequest {
            token: Uuid::new_v4(),
            info: AgentInfo {
                hostname: "probe-1".to_string(),
                region: "eu-west-1".to_string(),
                local_ip: "10.0.0.12".to_string(),
                public_ip: "203.0.113.7".to_string(),
            },
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["hostname"], "probe-1");
        assert_eq!(value["region"], "eu-west-1");
        assert!(value.get("info").is_none());
    }

    #[test]
    fn test_result_missing_payload_defaults() {
        let json = format!(
            r#"{{"request_id":"{}","agent_id":"{}","success":true,"timestamp":"2026-01-10T12:00:00Z"}}"#,
            Uuid::new_v4(),
            Uuid::new_v4()
        );
        let result: CheckResult = serde_json::from_str(&json).unwrap();
        assert!(result.success);
        assert!(result.error.is_none());
        assert!(result.latency_ms.is_none());
        assert!(result.result.is_null());
    }
}
