//! Gateway request handling.
//!
//! Every public endpoint lives under `/api/{env}/...`. Composite workflows
//! and webhooks have dedicated routes; any other path is resolved against
//! the registry and dispatched by the owning group.

pub mod composite;
pub mod error;
pub mod handler;
pub mod proxy;
pub mod query;
pub mod static_content;

pub use error::GatewayError;
pub use query::{QueryExecutor, QueryRows};

use axum::http::HeaderMap;

use crate::config::AppConfig;

/// Public `scheme://host[:port]` of this gateway as seen by the caller.
///
/// The configured base URL wins; otherwise it is derived from the `Host`
/// header, honouring `X-Forwarded-Proto`/`X-Forwarded-Host` when present.
pub fn gateway_base(config: &AppConfig, headers: &HeaderMap) -> String {
    if let Some(base) = config.base_url() {
        return base;
    }
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    let scheme = header("x-forwarded-proto").unwrap_or("http");
    let host = header("x-forwarded-host")
        .or_else(|| header("host"))
        .map(str::to_string)
        .unwrap_or_else(|| format!("localhost:{}", config.server.port));
    format!("{scheme}://{host}")
}
