//! Agent lifecycle routes
//!
//! Creation provisions the broker identity before the record becomes
//! visible, and deletion deprovisions it before the record goes away.
//! Broker state never outlives the record silently in either
//! direction.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::broker::messages::{HeartbeatRequest, RegistrationRequest, RegistrationResponse};
use crate::server::AppState;
use crate::store::{AgentRecord, AgentResponse, AgentStatus};
use crate::types::NetcheckError;

use super::{error_response, json_response, parse_json_body, parse_uuid};

#[derive(Debug, Deserialize)]
struct CreateAgentRequest {
    name: String,
}

/// POST /api/v1/agents
///
/// Provisions the messaging identity first; the record only appears
/// once the broker side exists. Losing a name race after provisioning
/// rolls the broker side back.
pub async fn handle_create_agent(state: Arc<AppState>, body: Bytes) -> Response<Full<Bytes>> {
    let request: CreateAgentRequest = match parse_json_body(&body) {
        Ok(request) => request,
        Err(e) => return error_response(e),
    };

    let name = request.name.trim().to_string();
    if name.is_empty() {
        return error_response(NetcheckError::BadRequest(
            "Agent name must not be empty".to_string(),
        ));
    }

    if !state.agents.name_available(&name) {
        return error_response(NetcheckError::AlreadyExists(format!(
            "Agent {} already exists",
            name
        )));
    }

    let identity = match state.provisioner.provision(&name).await {
        Ok(identity) => identity,
        Err(e) => return error_response(e),
    };

    let record = AgentRecord::new(
        &name,
        identity.username,
        identity.password,
        identity.consumer_name,
    );
    let response = record.to_response(false, None);
    let agent_id = record.id;

    if let Err(e) = state.agents.insert(record) {
        if let Err(cleanup) = state.provisioner.deprovision(&name).await {
            warn!(agent = %name, error = %cleanup, "Cleanup after creation race failed");
        }
        return error_response(e);
    }

    info!(agent_id = %agent_id, name = %name, "Agent created");
    json_response(StatusCode::CREATED, &response)
}

/// GET /api/v1/agents
pub fn handle_list_agents(state: Arc<AppState>) -> Response<Full<Bytes>> {
    let agents: Vec<AgentResponse> = state
        .agents
        .list()
        .into_iter()
        .map(|record| {
            let live = state.liveness.is_live(record.id);
            let info = state.agent_info.get(record.id);
            record.to_response(live, info)
        })
        .collect();

    let count = agents.len();
    json_response(
        StatusCode::OK,
        &serde_json::json!({ "count": count, "agents": agents }),
    )
}

/// GET /api/v1/agents/{id}
pub fn handle_get_agent(state: Arc<AppState>, id: &str) -> Response<Full<Bytes>> {
    let agent_id = match parse_uuid(id) {
        Ok(agent_id) => agent_id,
        Err(e) => return error_response(e),
    };

    match state.agents.get(agent_id) {
        Ok(record) => {
            let live = state.liveness.is_live(record.id);
            let info = state.agent_info.get(record.id);
            json_response(StatusCode::OK, &record.to_response(live, info))
        }
        Err(e) => error_response(e),
    }
}

/// DELETE /api/v1/agents/{id}
///
/// Teardown order: broker identity, then the record, then cached
/// state. Deleting an unknown agent is a no-op so retries after a
/// partial failure converge instead of erroring.
pub async fn handle_delete_agent(state: Arc<AppState>, id: &str) -> Response<Full<Bytes>> {
    let agent_id = match parse_uuid(id) {
        Ok(agent_id) => agent_id,
        Err(e) => return error_response(e),
    };

    let record = match state.agents.get(agent_id) {
        Ok(record) => record,
        Err(NetcheckError::NotFound(_)) => {
            return json_response(
                StatusCode::OK,
                &serde_json::json!({ "deleted": false, "id": agent_id }),
            );
        }
        Err(e) => return error_response(e),
    };

    // Terminal state first: a revoked agent can no longer re-register,
    // even if deprovisioning below fails and the delete is retried.
    if let Err(e) = state.agents.update_status(agent_id, AgentStatus::Revoked) {
        return error_response(e);
    }

    if let Err(e) = state.provisioner.deprovision(&record.name).await {
        warn!(agent_id = %agent_id, error = %e, "Broker deprovisioning failed, record kept for retry");
        return error_response(e);
    }

    let _ = state.agents.remove(agent_id);
    state.liveness.remove(agent_id);
    state.agent_info.remove(agent_id);

    info!(agent_id = %agent_id, name = %record.name, "Agent deleted");
    json_response(
        StatusCode::OK,
        &serde_json::json!({ "deleted": true, "id": agent_id }),
    )
}

/// POST /api/v1/agents/register
///
/// Exchange the one-time key for broker credentials. Registration is
/// repeatable so a restarted agent can come back with the same key;
/// host facts are overwritten each time. Revoked agents are refused
/// with the same answer as an unknown key.
pub async fn handle_register(state: Arc<AppState>, body: Bytes) -> Response<Full<Bytes>> {
    let request: RegistrationRequest = match parse_json_body(&body) {
        Ok(request) => request,
        Err(e) => return error_response(e),
    };

    let record = match state.agents.find_by_api_key(request.token) {
        Ok(record) => record,
        Err(e) => return error_response(e),
    };

    if record.status == AgentStatus::Revoked {
        return error_response(NetcheckError::NotFound(
            "No agent matches the presented key".to_string(),
        ));
    }

    if let Err(e) = state.agents.update_status(record.id, AgentStatus::Active) {
        return error_response(e);
    }
    state.agent_info.set(record.id, request.info.clone());

    let response = RegistrationResponse {
        broker_credentials: state.provisioner.credentials(
            &record.broker_username,
            &record.broker_password,
            &record.consumer_name,
        ),
        agent_id: record.id,
        heartbeat_interval_sec: state.args.agent_heartbeat_interval_sec,
        heartbeat_endpoint: state.args.heartbeat_endpoint(),
    };

    info!(
        agent_id = %record.id,
        name = %record.name,
        hostname = %request.info.hostname,
        region = %request.info.region,
        "Agent registered"
    );
    json_response(StatusCode::OK, &response)
}

/// POST /api/v1/agents/heartbeat
pub fn handle_heartbeat(state: Arc<AppState>, body: Bytes) -> Response<Full<Bytes>> {
    let request: HeartbeatRequest = match parse_json_body(&body) {
        Ok(request) => request,
        Err(e) => return error_response(e),
    };

    if let Err(e) = state.agents.get(request.agent_id) {
        return error_response(e);
    }

    state.liveness.record_heartbeat(request.agent_id);

    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .body(Full::new(Bytes::new()))
        .unwrap()
}
