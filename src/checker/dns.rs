//! DNS resolution checker

use async_trait::async_trait;
use std::net::IpAddr;
use tokio::net::lookup_host;

use super::{target_host, CheckOutcome, Checker};
use crate::broker::messages::CheckDispatch;

/// Resolves the target host and reports its A and AAAA records
pub struct DnsChecker;

#[async_trait]
impl Checker for DnsChecker {
    async fn execute(&self, request: &CheckDispatch) -> CheckOutcome {
        let domain = target_host(request);

        let addrs = match lookup_host((domain.as_str(), 0u16)).await {
            Ok(addrs) => addrs,
            Err(e) => {
                return CheckOutcome::failed(format!("DNS resolution failed for {}: {}", domain, e))
            }
        };

        let mut a_records = Vec::new();
        let mut aaaa_records = Vec::new();
        for addr in addrs {
            match addr.ip() {
                IpAddr::V4(ip) => a_records.push(ip.to_string()),
                IpAddr::V6(ip) => aaaa_records.push(ip.to_string()),
            }
        }

        if a_records.is_empty() && aaaa_records.is_empty() {
            return CheckOutcome::failed(format!("No records resolved for {}", domain));
        }

        CheckOutcome::ok(serde_json::json!({
            "domain": domain,
            "a_records": a_records,
            "aaaa_records": aaaa_records,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::messages::RequestType;
    use uuid::Uuid;

    fn request(host: &str) -> CheckDispatch {
        CheckDispatch {
            request_id: Uuid::new_v4(),
            request_type: RequestType::Dns,
            host: host.to_string(),
            port: None,
        }
    }

    // IP literals resolve without touching a resolver, which keeps
    // these runnable on machines with no network.
    #[tokio::test]
    async fn test_ipv4_literal_reported_as_a_record() {
        let outcome = DnsChecker.execute(&request("http://127.0.0.1")).await;

        assert!(outcome.success);
        let result = outcome.result.unwrap();
        assert_eq!(result["domain"], "127.0.0.1");
        assert_eq!(result["a_records"][0], "127.0.0.1");
        assert_eq!(result["aaaa_records"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_ipv6_literal_reported_as_aaaa_record() {
        let outcome = DnsChecker.execute(&request("http://[::1]")).await;

        assert!(outcome.success);
        let result = outcome.result.unwrap();
        assert_eq!(result["aaaa_records"][0], "::1");
        assert_eq!(result["a_records"].as_array().unwrap().len(), 0);
    }
}
