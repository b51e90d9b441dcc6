//! Outbound HTTP seam used by workflow steps.

use std::time::Duration;

use async_trait::async_trait;
use portico_core::HttpMethod;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::TransportError;

/// Header naming the calling gateway instance.
pub const SERVER_NAME_HEADER: &str = "ServerName";
/// Header naming the active environment.
pub const DATABASE_NAME_HEADER: &str = "DatabaseName";

#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    /// Sent as JSON when present.
    pub body: Option<Value>,
}

/// Backend answer with the body read in full.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundResponse {
    pub status: u16,
    pub body: String,
}

impl OutboundResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait StepTransport: Send + Sync {
    async fn send(&self, request: OutboundRequest) -> Result<OutboundResponse, TransportError>;
}

/// Transport over a shared, pooled `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::InvalidRequest(format!("failed to build client: {e}")))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// The pooled client, for callers that forward raw requests.
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

fn header_map(headers: &[(String, String)]) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        match (
            HeaderName::try_from(name.as_str()),
            HeaderValue::try_from(value.as_str()),
        ) {
            (Ok(name), Ok(value)) => {
                map.insert(name, value);
            }
            _ => warn!(header = %name, "Invalid header name or value"),
        }
    }
    map
}

#[async_trait]
impl StepTransport for ReqwestTransport {
    async fn send(&self, request: OutboundRequest) -> Result<OutboundResponse, TransportError> {
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;

        let mut builder = self
            .client
            .request(method, &request.url)
            .headers(header_map(&request.headers));
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        debug!(url = %request.url, status, bytes = body.len(), "Backend call completed");

        Ok(OutboundResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_sends_headers_and_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/svc/Orders"))
            .and(header(SERVER_NAME_HEADER, "gw-1"))
            .and(body_json(json!({"Id": 1})))
            .respond_with(ResponseTemplate::new(201).set_body_string(r#"{"ok":true}"#))
            .expect(1)
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new(Duration::from_secs(5)).unwrap();
        let response = transport
            .send(OutboundRequest {
                method: HttpMethod::Post,
                url: format!("{}/svc/Orders", server.uri()),
                headers: vec![(SERVER_NAME_HEADER.into(), "gw-1".into())],
                body: Some(json!({"Id": 1})),
            })
            .await
            .unwrap();

        assert_eq!(response.status, 201);
        assert!(response.is_success());
        assert_eq!(response.body, r#"{"ok":true}"#);
    }

    #[tokio::test]
    async fn test_error_status_body_is_read() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(422).set_body_string("nope"))
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new(Duration::from_secs(5)).unwrap();
        let response = transport
            .send(OutboundRequest {
                method: HttpMethod::Get,
                url: server.uri(),
                headers: Vec::new(),
                body: None,
            })
            .await
            .unwrap();
        assert_eq!(response.status, 422);
        assert!(!response.is_success());
        assert_eq!(response.body, "nope");
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_a_transport_error() {
        let transport = ReqwestTransport::new(Duration::from_secs(2)).unwrap();
        let result = transport
            .send(OutboundRequest {
                method: HttpMethod::Get,
                url: "http://127.0.0.1:1/unreachable".into(),
                headers: Vec::new(),
                body: None,
            })
            .await;
        assert!(matches!(
            result,
            Err(TransportError::Connect(_) | TransportError::Request(_))
        ));
    }
}
