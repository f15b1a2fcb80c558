//! Network checkers executed by probe agents
//!
//! Each checker is a thin wrapper around one network call with a
//! uniform outcome contract. The worker wraps execution with a hard
//! time cap and a latency measurement; a checker never lets an internal
//! failure escape as anything but a failed outcome.

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

use crate::broker::messages::{CheckDispatch, RequestType};
use crate::types::Result;

pub mod dns;
pub mod http;
pub mod ping;
pub mod tcp;

pub use dns::DnsChecker;
pub use http::HttpChecker;
pub use ping::PingChecker;
pub use tcp::TcpChecker;

/// Outcome of one checker execution
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub success: bool,
    pub result: Option<Value>,
    pub error: Option<String>,
}

impl CheckOutcome {
    /// Successful outcome with a result payload
    pub fn ok(result: Value) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
        }
    }

    /// Failed outcome carrying an error message
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
        }
    }

    /// Failed outcome that still carries a partial result payload
    pub fn failed_with(result: Value, error: impl Into<String>) -> Self {
        Self {
            success: false,
            result: Some(result),
            error: Some(error.into()),
        }
    }
}

/// A single network check implementation
#[async_trait]
pub trait Checker: Send + Sync {
    async fn execute(&self, request: &CheckDispatch) -> CheckOutcome;
}

impl fmt::Debug for dyn Checker + '_ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Checker")
    }
}

/// Request type with no registered checker
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("No checker registered for request type {0}")]
pub struct UnsupportedType(pub RequestType);

/// Closed set of checkers, one per supported request type
pub struct CheckerSet {
    http: HttpChecker,
    dns: DnsChecker,
    tcp: TcpChecker,
    ping: PingChecker,
}

impl CheckerSet {
    /// Build the full set
    pub fn new() -> Result<Self> {
        Ok(Self {
            http: HttpChecker::new()?,
            dns: DnsChecker,
            tcp: TcpChecker::new(),
            ping: PingChecker,
        })
    }

    /// Look up the checker for a request type
    ///
    /// INFO and UDP_CONNECT have no implementation; resolving them
    /// yields an explicit unsupported error rather than a silent gap.
    pub fn resolve(
        &self,
        request_type: RequestType,
    ) -> std::result::Result<&dyn Checker, UnsupportedType> {
        match request_type {
            RequestType::Http => Ok(&self.http),
            RequestType::Dns => Ok(&self.dns),
            RequestType::TcpConnect => Ok(&self.tcp),
            RequestType::Ping => Ok(&self.ping),
            RequestType::Info | RequestType::UdpConnect => Err(UnsupportedType(request_type)),
        }
    }
}

/// Hostname part of a normalized target, for checkers that resolve or
/// connect rather than speak HTTP
///
/// IPv6 literals come back without the URL brackets so the value feeds
/// straight into the resolver or a connect call.
pub fn target_host(request: &CheckDispatch) -> String {
    match url::Url::parse(&request.host) {
        Ok(parsed) => match parsed.host() {
            Some(url::Host::Ipv6(ip)) => ip.to_string(),
            Some(host) => host.to_string(),
            None => request.host.clone(),
        },
        Err(_) => request.host.clone(),
    }
}

/// Execute a checker under a hard time cap, measuring wall-clock latency
///
/// A checker that exceeds the cap becomes a failed outcome with no
/// measured latency.
pub async fn run_check(
    checker: &dyn Checker,
    request: &CheckDispatch,
    limit: Duration,
) -> (CheckOutcome, Option<f64>) {
    let started = Instant::now();

    match tokio::time::timeout(limit, checker.execute(request)).await {
        Ok(outcome) => {
            let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
            (outcome, Some(latency_ms))
        }
        Err(_) => (
            CheckOutcome::failed(format!("Check timed out after {}s", limit.as_secs())),
            None,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn request(request_type: RequestType, host: &str) -> CheckDispatch {
        CheckDispatch {
            request_id: Uuid::new_v4(),
            request_type,
            host: host.to_string(),
            port: None,
        }
    }

    struct SlowChecker;

    #[async_trait]
    impl Checker for SlowChecker {
        async fn execute(&self, _request: &CheckDispatch) -> CheckOutcome {
            tokio::time::sleep(Duration::from_secs(30)).await;
            CheckOutcome::ok(serde_json::json!({}))
        }
    }

    struct InstantChecker;

    #[async_trait]
    impl Checker for InstantChecker {
        async fn execute(&self, _request: &CheckDispatch) -> CheckOutcome {
            CheckOutcome::ok(serde_json::json!({ "done": true }))
        }
    }

    #[test]
    fn test_resolve_supported_and_unsupported() {
        let checkers = CheckerSet::new().unwrap();

        assert!(checkers.resolve(RequestType::Http).is_ok());
        assert!(checkers.resolve(RequestType::Dns).is_ok());
        assert!(checkers.resolve(RequestType::TcpConnect).is_ok());
        assert!(checkers.resolve(RequestType::Ping).is_ok());

        assert_eq!(
            checkers.resolve(RequestType::Info).unwrap_err(),
            UnsupportedType(RequestType::Info)
        );
        assert_eq!(
            checkers.resolve(RequestType::UdpConnect).unwrap_err(),
            UnsupportedType(RequestType::UdpConnect)
        );
    }

    #[test]
    fn test_target_host_extraction() {
        assert_eq!(
            target_host(&request(RequestType::Dns, "http://example.com:8080/path")),
            "example.com"
        );
        assert_eq!(
            target_host(&request(RequestType::Dns, "https://example.com")),
            "example.com"
        );
        // IPv6 literals lose the URL brackets
        assert_eq!(
            target_host(&request(RequestType::Dns, "http://[::1]:9000")),
            "::1"
        );
        // Unparseable targets fall back to the raw string
        assert_eq!(
            target_host(&request(RequestType::Dns, "example.com")),
            "example.com"
        );
    }

    #[tokio::test]
    async fn test_timeout_becomes_failed_outcome() {
        let dispatch = request(RequestType::Http, "http://example.com");
        let (outcome, latency) =
            run_check(&SlowChecker, &dispatch, Duration::from_millis(20)).await;

        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("timed out"));
        assert!(latency.is_none());
    }

    #[tokio::test]
    async fn test_latency_measured_for_completed_check() {
        let dispatch = request(RequestType::Http, "http://example.com");
        let (outcome, latency) =
            run_check(&InstantChecker, &dispatch, Duration::from_secs(5)).await;

        assert!(outcome.success);
        assert!(latency.unwrap() >= 0.0);
    }
}
