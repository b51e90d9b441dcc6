//! Gateway-specific error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use portico_core::ErrorCategory;
use portico_workflow::WorkflowError;
use serde_json::json;

/// Errors answered by the gateway itself, before or instead of a backend.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// No endpoint owns the requested path.
    #[error("No endpoint found for {path}")]
    RouteNotFound { path: String },

    /// Environment not accepted by the server or the endpoint.
    #[error("Environment '{environment}' is not allowed for {target}")]
    EnvironmentNotAllowed { environment: String, target: String },

    /// Method not in the endpoint's method list.
    #[error("Method {method} is not allowed for {target}")]
    MethodNotAllowed { method: String, target: String },

    /// Bad request (400).
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Endpoint kind served by an external component that is not wired in.
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// Error forwarding to or reading from a backend.
    #[error("Upstream error: {0}")]
    UpstreamError(String),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl GatewayError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::RouteNotFound { .. } => ErrorCategory::NotFound,
            Self::EnvironmentNotAllowed { .. }
            | Self::MethodNotAllowed { .. }
            | Self::BadRequest(_) => ErrorCategory::Validation,
            Self::NotSupported(_) => ErrorCategory::Configuration,
            Self::UpstreamError(_) => ErrorCategory::Upstream,
            Self::InternalError(_) => ErrorCategory::System,
        }
    }

    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::RouteNotFound { .. } => (StatusCode::NOT_FOUND, "not-found"),
            Self::EnvironmentNotAllowed { .. } => (StatusCode::BAD_REQUEST, "invalid"),
            Self::MethodNotAllowed { .. } => {
                (StatusCode::METHOD_NOT_ALLOWED, "method-not-allowed")
            }
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "invalid"),
            Self::NotSupported(_) => (StatusCode::NOT_IMPLEMENTED, "not-supported"),
            Self::UpstreamError(_) => (StatusCode::BAD_GATEWAY, "upstream"),
            Self::InternalError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "exception"),
        }
    }
}

impl From<WorkflowError> for GatewayError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::NotFound(name) => Self::RouteNotFound {
                path: format!("composite/{name}"),
            },
            WorkflowError::EnvironmentNotAllowed {
                workflow,
                environment,
            } => Self::EnvironmentNotAllowed {
                environment,
                target: format!("workflow '{workflow}'"),
            },
            WorkflowError::InvalidBody(e) => {
                Self::BadRequest(format!("request body is not valid JSON: {e}"))
            }
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let body = json!({
            "Success": false,
            "ErrorCode": code,
            "ErrorMessage": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}
