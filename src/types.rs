//! Error types shared by the controller and the probe agent

use hyper::StatusCode;

/// Main error type for netcheck operations
#[derive(Debug, thiserror::Error)]
pub enum NetcheckError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Provisioning error: {0}")]
    Provisioning(String),

    #[error("Broker error: {0}")]
    Broker(String),

    #[error("Registration error: {0}")]
    Registration(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl NetcheckError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::AlreadyExists(_) => StatusCode::CONFLICT,
            Self::Provisioning(_) => StatusCode::BAD_GATEWAY,
            Self::Broker(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Registration(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Http(_) => StatusCode::BAD_GATEWAY,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Convert to status code and body tuple for HTTP response
    pub fn into_status_code_and_body(self) -> (StatusCode, String) {
        let status = self.status_code();
        let body = self.to_string();
        (status, body)
    }
}

// Implement From conversions for common error types

impl From<std::io::Error> for NetcheckError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for NetcheckError {
    fn from(err: serde_json::Error) -> Self {
        Self::BadRequest(format!("JSON error: {}", err))
    }
}

impl From<hyper::Error> for NetcheckError {
    fn from(err: hyper::Error) -> Self {
        Self::Internal(format!("HTTP error: {}", err))
    }
}

impl From<reqwest::Error> for NetcheckError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.to_string())
    }
}

impl From<async_nats::Error> for NetcheckError {
    fn from(err: async_nats::Error) -> Self {
        Self::Broker(err.to_string())
    }
}

/// Result type alias for netcheck operations
pub type Result<T> = std::result::Result<T, NetcheckError>;
