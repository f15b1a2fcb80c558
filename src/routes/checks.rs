//! Check submission and result retrieval routes

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::broker::messages::RequestType;
use crate::cache::AgentInfo;
use crate::server::AppState;
use crate::store::StoredResponse;
use crate::types::NetcheckError;

use super::{error_response, json_response, parse_json_body, parse_uuid};

#[derive(Debug, Deserialize)]
struct CreateCheckRequest {
    request_type: RequestType,
    host: String,
    #[serde(default)]
    port: Option<u16>,
}

/// Agent reply joined with the cached facts about that agent
#[derive(Serialize)]
struct EnrichedResponse {
    #[serde(flatten)]
    response: StoredResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    agent_info: Option<AgentInfo>,
}

/// POST /api/v1/check
///
/// The record is stored before the dispatch goes out so replies
/// arriving immediately always find their request.
pub async fn handle_create_check(state: Arc<AppState>, body: Bytes) -> Response<Full<Bytes>> {
    let request: CreateCheckRequest = match parse_json_body(&body) {
        Ok(request) => request,
        Err(e) => return error_response(e),
    };

    let host = request.host.trim();
    if host.is_empty() {
        return error_response(NetcheckError::BadRequest(
            "Check host must not be empty".to_string(),
        ));
    }

    let record = state.checks.create(request.request_type, host, request.port);

    if let Err(e) = state.publisher.publish(&record.to_dispatch()).await {
        return error_response(e);
    }

    info!(
        request_id = %record.request_id,
        request_type = %record.request_type,
        host = %record.host,
        "Check dispatched to fleet"
    );
    json_response(StatusCode::OK, &record)
}

/// GET /api/v1/check/{id}
///
/// A check with no replies yet answers with an empty response list;
/// pending is not an error.
pub fn handle_get_check(state: Arc<AppState>, id: &str) -> Response<Full<Bytes>> {
    let request_id = match parse_uuid(id) {
        Ok(request_id) => request_id,
        Err(e) => return error_response(e),
    };

    let (record, responses) = match state.checks.get(request_id) {
        Ok(found) => found,
        Err(e) => return error_response(e),
    };

    let responses: Vec<EnrichedResponse> = responses
        .into_iter()
        .map(|response| {
            let agent_info = state.agent_info.get(response.agent_id);
            EnrichedResponse {
                response,
                agent_info,
            }
        })
        .collect();

    let count = responses.len();
    json_response(
        StatusCode::OK,
        &serde_json::json!({
            "request": record,
            "count": count,
            "responses": responses,
        }),
    )
}
