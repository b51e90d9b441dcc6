use axum::{
    body::Body,
    http::{StatusCode, header},
    response::Response,
};
use portico_registry::{EndpointDefinition, KindDetails};
use tracing::{debug, warn};

use super::GatewayError;

/// Returns the content file of a static endpoint.
pub async fn serve_static(definition: &EndpointDefinition) -> Result<Response, GatewayError> {
    let KindDetails::Static {
        content_type,
        content_file,
    } = &definition.details
    else {
        return Err(GatewayError::InternalError(format!(
            "endpoint '{}' is not a static endpoint",
            definition.routing_key()
        )));
    };

    let bytes = tokio::fs::read(content_file).await.map_err(|e| {
        warn!(path = %content_file.display(), error = %e, "Static content unreadable");
        GatewayError::InternalError(format!(
            "content of '{}' is unavailable",
            definition.routing_key()
        ))
    })?;
    debug!(path = %content_file.display(), bytes = bytes.len(), "Serving static content");

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type.as_str())
        .body(Body::from(bytes))
        .map_err(|e| GatewayError::InternalError(format!("Failed to build response: {e}")))
}
