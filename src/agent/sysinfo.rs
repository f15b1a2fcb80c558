//! Host facts gathered at agent startup

use std::net::UdpSocket;
use std::time::Duration;
use tracing::{debug, warn};

use crate::cache::AgentInfo;

/// Timeout for the public address lookup
const PUBLIC_IP_TIMEOUT: Duration = Duration::from_secs(5);

/// Address learned by pointing a UDP socket at a public IP
///
/// No packet is sent; connect() just makes the kernel pick the
/// outbound interface.
fn local_ip() -> Option<String> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    Some(socket.local_addr().ok()?.ip().to_string())
}

async fn fetch_public_ip(ip_api_url: &str) -> Option<String> {
    let client = reqwest::Client::builder()
        .timeout(PUBLIC_IP_TIMEOUT)
        .build()
        .ok()?;

    let text = client.get(ip_api_url).send().await.ok()?.text().await.ok()?;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Collect the facts reported during registration
///
/// Lookups that fail fall back to placeholders; a partially described
/// agent is still a working agent.
pub async fn gather(region: &str, ip_api_url: &str) -> AgentInfo {
    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());

    let local_ip = local_ip().unwrap_or_else(|| {
        debug!("Could not determine local address");
        "127.0.0.1".to_string()
    });

    let public_ip = fetch_public_ip(ip_api_url).await.unwrap_or_else(|| {
        warn!(ip_api_url, "Could not determine public address");
        "unknown".to_string()
    });

    AgentInfo {
        hostname,
        region: region.to_string(),
        local_ip,
        public_ip,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::testserver;

    #[tokio::test]
    async fn test_gather_reads_public_ip_from_api() {
        let url = testserver::serve(
            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 12\r\nConnection: close\r\n\r\n203.0.113.7\n".to_string(),
            1,
        )
        .await;

        let info = gather("eu-west", &url).await;

        assert_eq!(info.region, "eu-west");
        assert_eq!(info.public_ip, "203.0.113.7");
        assert!(!info.hostname.is_empty());
    }

    #[tokio::test]
    async fn test_gather_survives_unreachable_ip_api() {
        // Bind then drop to get a port with nothing listening
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let info = gather("default", &format!("http://{}", addr)).await;

        assert_eq!(info.public_ip, "unknown");
        assert!(info.local_ip.parse::<std::net::IpAddr>().is_ok());
    }
}
