use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Request id stored in request extensions by [`request_id`].
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

// Middleware that ensures each request has an X-Request-Id and mirrors it on the response
pub async fn request_id(mut req: Request<Body>, next: Next) -> Response {
    let header_name = HeaderName::from_static(REQUEST_ID_HEADER);

    // If the incoming request already has a usable request-id, preserve it; otherwise generate one
    let inbound = req
        .headers()
        .get(&header_name)
        .filter(|v| v.to_str().is_ok_and(|s| !s.trim().is_empty()))
        .cloned();
    let req_id_value = match inbound {
        Some(value) => value,
        None => match HeaderValue::from_str(&Uuid::new_v4().to_string()) {
            Ok(value) => value,
            Err(_) => return next.run(req).await,
        },
    };
    let id = req_id_value.to_str().unwrap_or_default().to_string();

    // Add to request extensions for downstream usage (logging, correlation)
    req.extensions_mut().insert(req_id_value.clone());
    req.extensions_mut().insert(RequestId(id));

    let mut res = next.run(req).await;
    res.headers_mut().insert(header_name, req_id_value);
    res
}
