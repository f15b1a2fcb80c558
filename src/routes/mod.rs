//! HTTP routes for the controller API

pub mod agents;
pub mod checks;
pub mod health;

pub use agents::{
    handle_create_agent, handle_delete_agent, handle_get_agent, handle_heartbeat,
    handle_list_agents, handle_register,
};
pub use checks::{handle_create_check, handle_get_check};
pub use health::{health_check, readiness_check, version_info};

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::types::NetcheckError;

/// Parse a JSON request body, mapping failures to a 400
pub(crate) fn parse_json_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, NetcheckError> {
    serde_json::from_slice(body)
        .map_err(|e| NetcheckError::BadRequest(format!("Invalid request body: {}", e)))
}

/// Parse a UUID path segment, mapping failures to a 400
pub(crate) fn parse_uuid(raw: &str) -> Result<Uuid, NetcheckError> {
    Uuid::parse_str(raw).map_err(|_| NetcheckError::BadRequest(format!("Invalid identifier: {}", raw)))
}

/// JSON response with the given status
pub(crate) fn json_response<T: Serialize>(status: StatusCode, payload: &T) -> Response<Full<Bytes>> {
    let body = serde_json::to_string(payload)
        .unwrap_or_else(|_| r#"{"error":"Serialization failed"}"#.to_string());

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

/// Error mapped to its HTTP status with a JSON body
pub(crate) fn error_response(err: NetcheckError) -> Response<Full<Bytes>> {
    let (status, message) = err.into_status_code_and_body();
    let body = serde_json::json!({ "error": message });

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, serde::Deserialize)]
    struct Named {
        name: String,
    }

    #[test]
    fn test_parse_json_body_rejects_malformed_input() {
        let err = parse_json_body::<Named>(&Bytes::from_static(b"{broken")).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_parse_json_body_accepts_valid_input() {
        let parsed: Named = parse_json_body(&Bytes::from_static(b"{\"name\":\"probe\"}")).unwrap();
        assert_eq!(parsed.name, "probe");
    }

    #[test]
    fn test_parse_uuid_rejects_garbage() {
        let err = parse_uuid("not-a-uuid").unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_error_response_carries_status() {
        let response = error_response(NetcheckError::NotFound("missing".to_string()));
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_conflict_maps_to_409() {
        let response = error_response(NetcheckError::AlreadyExists("taken".to_string()));
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
