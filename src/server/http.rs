//! HTTP server implementation
//!
//! hyper http1 with TokioIo, one task per connection.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::broker::{BrokerClient, CredentialProvisioner};
use crate::cache::{AgentInfoCache, LivenessCache};
use crate::config::Args;
use crate::dispatch::CheckPublisher;
use crate::routes;
use crate::store::{AgentStore, CheckStore};
use crate::types::Result;

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub broker: BrokerClient,
    pub provisioner: CredentialProvisioner,
    pub publisher: CheckPublisher,
    pub agents: Arc<AgentStore>,
    pub checks: Arc<CheckStore>,
    pub liveness: Arc<LivenessCache>,
    pub agent_info: Arc<AgentInfoCache>,
}

impl AppState {
    pub fn new(args: Args, broker: BrokerClient, provisioner: CredentialProvisioner) -> Self {
        let publisher = CheckPublisher::new(&broker);
        let liveness = Arc::new(LivenessCache::new(args.heartbeat_ttl()));

        Self {
            args,
            broker,
            provisioner,
            publisher,
            agents: Arc::new(AgentStore::new()),
            checks: Arc::new(CheckStore::new()),
            liveness,
            agent_info: Arc::new(AgentInfoCache::new()),
        }
    }
}

/// Start the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        "Controller listening on {} as node {}",
        state.args.listen, state.args.node_id
    );

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    info!("[{}] {} {}", addr, method, path);

    let response = match (method, path.as_str()) {
        // Liveness probe - 200 while the controller runs
        (Method::GET, "/health") | (Method::GET, "/healthz") => {
            routes::health_check(Arc::clone(&state))
        }

        // Readiness probe - 200 only with a broker connection
        (Method::GET, "/ready") | (Method::GET, "/readyz") => {
            routes::readiness_check(Arc::clone(&state))
        }

        (Method::GET, "/version") => routes::version_info(),

        (Method::POST, "/api/v1/agents") => match read_body(req).await {
            Ok(body) => routes::handle_create_agent(Arc::clone(&state), body).await,
            Err(response) => response,
        },

        (Method::GET, "/api/v1/agents") => routes::handle_list_agents(Arc::clone(&state)),

        (Method::POST, "/api/v1/agents/register") => match read_body(req).await {
            Ok(body) => routes::handle_register(Arc::clone(&state), body).await,
            Err(response) => response,
        },

        (Method::POST, "/api/v1/agents/heartbeat") => match read_body(req).await {
            Ok(body) => routes::handle_heartbeat(Arc::clone(&state), body),
            Err(response) => response,
        },

        (Method::GET, p) if p.starts_with("/api/v1/agents/") => {
            let id = p.trim_start_matches("/api/v1/agents/");
            routes::handle_get_agent(Arc::clone(&state), id)
        }

        (Method::DELETE, p) if p.starts_with("/api/v1/agents/") => {
            let id = p.trim_start_matches("/api/v1/agents/");
            routes::handle_delete_agent(Arc::clone(&state), id).await
        }

        (Method::POST, "/api/v1/check") => match read_body(req).await {
            Ok(body) => routes::handle_create_check(Arc::clone(&state), body).await,
            Err(response) => response,
        },

        (Method::GET, p) if p.starts_with("/api/v1/check/") => {
            let id = p.trim_start_matches("/api/v1/check/");
            routes::handle_get_check(Arc::clone(&state), id)
        }

        (_, path) => not_found_response(path),
    };

    Ok(response)
}

/// Collect a request body, answering 400 when the read fails
async fn read_body(
    req: Request<Incoming>,
) -> std::result::Result<Bytes, Response<Full<Bytes>>> {
    match req.collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) => {
            error!("Failed to read request body: {}", e);
            Err(Response::builder()
                .status(StatusCode::BAD_REQUEST)
                .header("Content-Type", "application/json")
                .body(Full::new(Bytes::from(
                    r#"{"error": "Failed to read request body"}"#,
                )))
                .unwrap())
        }
    }
}

fn not_found_response(path: &str) -> Response<Full<Bytes>> {
    let body = serde_json::json!({
        "error": "Not Found",
        "path": path,
    });

    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}
