//! ICMP ping checker
//!
//! Shells out to the system ping binary. Raw ICMP sockets would need
//! capabilities the agent process usually does not have.

use async_trait::async_trait;
use tokio::process::Command;

use super::{target_host, CheckOutcome, Checker};
use crate::broker::messages::CheckDispatch;

/// Seconds ping waits for a reply
const PING_TIMEOUT_SECS: u32 = 2;

/// Sends a single echo request and reports the round-trip time
pub struct PingChecker;

/// Pull the round-trip time in milliseconds out of ping output
fn parse_latency_ms(output: &str) -> Option<f64> {
    output
        .split("time=")
        .nth(1)?
        .split_whitespace()
        .next()?
        .trim_end_matches("ms")
        .parse()
        .ok()
}

#[async_trait]
impl Checker for PingChecker {
    async fn execute(&self, request: &CheckDispatch) -> CheckOutcome {
        let host = target_host(request);

        let output = match Command::new("ping")
            .args(["-c", "1", "-W", &PING_TIMEOUT_SECS.to_string(), &host])
            .output()
            .await
        {
            Ok(output) => output,
            Err(e) => return CheckOutcome::failed(format!("Failed to run ping: {}", e)),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = if stderr.trim().is_empty() {
                "no reply".to_string()
            } else {
                stderr.trim().to_string()
            };
            return CheckOutcome::failed(format!("Ping to {} failed: {}", host, detail));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        match parse_latency_ms(&stdout) {
            Some(latency_ms) => CheckOutcome::ok(serde_json::json!({ "latency_ms": latency_ms })),
            None => CheckOutcome::failed(format!("Could not parse ping output for {}", host)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINUX_PING_OUTPUT: &str = "\
PING 127.0.0.1 (127.0.0.1) 56(84) bytes of data.
64 bytes from 127.0.0.1: icmp_seq=1 ttl=64 time=0.045 ms

--- 127.0.0.1 ping statistics ---
1 packets transmitted, 1 received, 0% packet loss, time 0ms
rtt min/avg/max/mdev = 0.045/0.045/0.045/0.000 ms
";

    #[test]
    fn test_parse_latency_from_linux_output() {
        assert_eq!(parse_latency_ms(LINUX_PING_OUTPUT), Some(0.045));
    }

    #[test]
    fn test_parse_latency_without_space_before_unit() {
        assert_eq!(
            parse_latency_ms("64 bytes from 10.0.0.1: icmp_seq=1 ttl=64 time=23.4ms"),
            Some(23.4)
        );
    }

    #[test]
    fn test_parse_latency_rejects_garbage() {
        assert_eq!(parse_latency_ms("Destination Host Unreachable"), None);
        assert_eq!(parse_latency_ms("time=abc ms"), None);
        assert_eq!(parse_latency_ms(""), None);
    }
}
