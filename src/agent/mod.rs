//! Probe agent runtime
//!
//! An agent registers with the controller using its provisioning
//! token, receives scoped broker credentials, then runs a pool of
//! workers that pull check dispatches and publish results. A
//! heartbeat loop keeps the controller's liveness view current.

pub mod heartbeat;
pub mod registration;
pub mod runtime;
pub mod sysinfo;
pub mod worker;

pub use heartbeat::HeartbeatSender;
pub use registration::{RegistrationClient, RetryPolicy};
pub use runtime::{AgentArgs, AgentRuntime};
pub use worker::CheckWorker;

#[cfg(test)]
pub(crate) mod testserver {
    //! Canned HTTP server for exercising controller-facing clients

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    /// Read one full request, headers plus declared body
    async fn drain_request(stream: &mut TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];

        let header_end = loop {
            let n = match stream.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(n) => n,
            };
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let headers = String::from_utf8_lossy(&buf[..header_end]).to_lowercase();
        let content_length = headers
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|value| value.trim().parse::<usize>().ok())
            .unwrap_or(0);

        while buf.len() < header_end + content_length {
            let n = match stream.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(n) => n,
            };
            buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// Serve the given raw response to each connection, returning the
    /// base URL of the listener
    pub async fn serve(response: String, connections: usize) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            for _ in 0..connections {
                if let Ok((mut stream, _)) = listener.accept().await {
                    drain_request(&mut stream).await;
                    let _ = stream.write_all(response.as_bytes()).await;
                }
            }
        });

        format!("http://{}", addr)
    }

    /// Canned 200 response with a JSON body
    pub fn json_response(body: &str) -> String {
        format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        )
    }

    /// Canned status-only response with no body
    pub fn empty_response(status_line: &str) -> String {
        format!("{}\r\nConnection: close\r\n\r\n", status_line)
    }
}
