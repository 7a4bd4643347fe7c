//! Error types for configuration, forwarding and response synthesis.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Startup-time configuration problems.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("at least one server.listen_addresses entry is required")]
    NoListenAddress,

    #[error("backend.host must not be empty")]
    EmptyBackendHost,

    #[error("backend.port must not be 0")]
    ZeroBackendPort,

    #[error("redirect.hostname must not be empty while redirect.enabled is set")]
    EmptyRedirectHostname,

    #[error("cors.path_prefix must start with '/', got {0:?}")]
    PathPrefix(String),

    #[error("backend address must be host:port, got {0:?}")]
    BackendAddress(String),

    #[error("cors.{field} is not a valid header value: {value:?}")]
    CorsValue { field: &'static str, value: String },
}

/// Failures on the backend path. Never retried.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("failed to read request body: {0}")]
    BodyRead(#[source] axum::Error),

    #[error("request target {0:?} cannot be forwarded")]
    RequestTarget(String),

    #[error("failed to build backend request: {0}")]
    Builder(#[source] reqwest::Error),

    #[error("backend timed out: {0}")]
    Timeout(#[source] reqwest::Error),

    #[error("backend unreachable: {0}")]
    Unreachable(#[source] reqwest::Error),

    #[error("failed to build response: {0}")]
    Response(#[from] http::Error),
}

impl From<reqwest::Error> for ForwardError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_builder() {
            ForwardError::Builder(e)
        } else if e.is_timeout() {
            ForwardError::Timeout(e)
        } else {
            ForwardError::Unreachable(e)
        }
    }
}

impl ForwardError {
    pub fn status(&self) -> StatusCode {
        match self {
            ForwardError::BodyRead(_)
            | ForwardError::RequestTarget(_)
            | ForwardError::Builder(_) => StatusCode::BAD_REQUEST,
            ForwardError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ForwardError::Unreachable(_) => StatusCode::BAD_GATEWAY,
            ForwardError::Response(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ForwardError {
    fn into_response(self) -> Response {
        let message = match self {
            ForwardError::BodyRead(_) => "failed to read request body",
            ForwardError::RequestTarget(_) | ForwardError::Builder(_) => "bad request target",
            ForwardError::Timeout(_) => "backend timeout",
            ForwardError::Unreachable(_) => "backend unreachable",
            ForwardError::Response(_) => "internal error",
        };
        (self.status(), message).into_response()
    }
}

/// A redirect that cannot be expressed as a response. Indicates a pipeline bug.
#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    #[error("redirect target {target:?} is not a valid Location value")]
    InvariantViolation { target: String },

    #[error("failed to build redirect: {0}")]
    Response(#[from] http::Error),
}

impl IntoResponse for SynthesisError {
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
    }
}
