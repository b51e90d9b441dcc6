//! Forwarding of requests to a proxy endpoint's backend.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{HeaderMap, HeaderName, HeaderValue, Request, header},
    response::Response,
};
use portico_registry::EndpointDefinition;
use portico_workflow::UrlRewriter;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use super::{GatewayError, gateway_base};
use crate::server::AppState;

/// Backend address for a request: base URL, the unmatched path remainder
/// and the original query string.
pub fn target_url(base: &str, remainder: &[String], query: Option<&str>) -> String {
    let mut url = base.trim_end_matches('/').to_string();
    for segment in remainder {
        url.push('/');
        url.push_str(segment);
    }
    if let Some(query) = query.filter(|q| !q.is_empty()) {
        url.push('?');
        url.push_str(query);
    }
    url
}

/// Forwards the request and relays the backend's answer, with backend URLs
/// in a JSON body rewritten to this gateway's public URLs.
#[instrument(skip_all, fields(endpoint = %definition.routing_key(), environment = %environment))]
pub async fn forward(
    state: &AppState,
    definition: &Arc<EndpointDefinition>,
    remainder: &[String],
    environment: &str,
    request: Request<Body>,
) -> Result<Response, GatewayError> {
    let base = definition.url().ok_or_else(|| {
        GatewayError::InternalError(format!(
            "endpoint '{}' has no backend address",
            definition.routing_key()
        ))
    })?;
    let target = target_url(base, remainder, request.uri().query());
    let public_base = gateway_base(&state.config, request.headers());

    info!(target_url = %target, method = %request.method(), "Proxying request");

    let method = request.method().clone();
    let mut headers = HeaderMap::new();
    for (name, value) in request.headers() {
        // Skip hop-by-hop headers as defined in RFC 2616
        if is_hop_by_hop_header(name.as_str()) {
            continue;
        }
        if is_auth_header(name.as_str()) {
            debug!(header = %name, "Skipping authentication header");
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    for (name, value) in state.engine.executor().outbound_headers(environment) {
        match (
            HeaderName::try_from(name.as_str()),
            HeaderValue::try_from(value.as_str()),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!(header = %name, "Invalid header name or value"),
        }
    }

    let body = axum::body::to_bytes(request.into_body(), state.config.server.body_limit_bytes)
        .await
        .map_err(|e| GatewayError::BadRequest(format!("Failed to read request body: {e}")))?;

    let response = state
        .http_client
        .request(method, &target)
        .headers(headers)
        .body(body.to_vec())
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                GatewayError::UpstreamError(format!("Proxy request timed out: {e}"))
            } else if e.is_connect() {
                GatewayError::UpstreamError(format!("Failed to connect to backend: {e}"))
            } else {
                GatewayError::UpstreamError(format!("Proxy request failed: {e}"))
            }
        })?;

    let status = response.status();
    info!(status = %status, "Proxy request completed");

    let mut builder = Response::builder().status(status);
    for (name, value) in response.headers() {
        // Length is recomputed after rewriting
        if !is_hop_by_hop_header(name.as_str()) && name != header::CONTENT_LENGTH {
            builder = builder.header(name, value);
        }
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| GatewayError::UpstreamError(format!("Failed to read response body: {e}")))?;

    let body = match serde_json::from_slice::<Value>(&bytes) {
        Ok(json) => {
            let rewriter = UrlRewriter::new(public_base, environment);
            let rewritten = rewriter.rewrite_value(&json, std::slice::from_ref(definition));
            serde_json::to_vec(&rewritten).unwrap_or_else(|_| bytes.to_vec())
        }
        Err(_) => bytes.to_vec(),
    };

    builder
        .body(Body::from(body))
        .map_err(|e| GatewayError::InternalError(format!("Failed to build response: {e}")))
}

/// Checks if a header is a hop-by-hop header that should not be forwarded.
///
/// Hop-by-hop headers are defined in RFC 2616 Section 13.5.1.
fn is_hop_by_hop_header(name: &str) -> bool {
    matches!(
        name.to_lowercase().as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailers"
            | "transfer-encoding"
            | "upgrade"
            | "host" // Host should be set to target, not forwarded
    )
}

/// Checks if a header carries caller credentials.
fn is_auth_header(name: &str) -> bool {
    matches!(
        name.to_lowercase().as_str(),
        "authorization" | "cookie" | "set-cookie"
    )
}
