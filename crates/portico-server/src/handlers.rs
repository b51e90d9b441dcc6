use std::collections::BTreeMap;
use std::str::FromStr;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use portico_core::HttpMethod;
use portico_registry::{EndpointDefinition, EndpointGroup, EndpointKind, ReloadReport};
use serde::Serialize;
use serde_json::json;
use tracing::info;

use crate::gateway::GatewayError;
use crate::server::AppState;

#[derive(Serialize)]
pub struct HealthResponse<'a> {
    status: &'a str,
}

pub async fn root() -> impl IntoResponse {
    let body = json!({
        "service": "Portico Gateway",
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    });
    (StatusCode::OK, Json(body))
}

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

/// Ready once every endpoint group has been loaded.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    if state.registry.is_ready() {
        (StatusCode::OK, Json(HealthResponse { status: "ready" }))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse { status: "loading" }),
        )
    }
}

// ---- Endpoint catalog ----

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub routing_key: String,
    pub kind: EndpointKind,
    pub methods: Vec<HttpMethod>,
    pub environments: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace_display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl From<&EndpointDefinition> for CatalogEntry {
    fn from(def: &EndpointDefinition) -> Self {
        Self {
            routing_key: def.routing_key(),
            kind: def.kind,
            methods: def.methods.iter().copied().collect(),
            environments: def.allowed_environments.clone(),
            display_name: def.display_name.clone(),
            namespace_display_name: def.namespace_display_name.clone(),
            description: def.description.clone(),
        }
    }
}

/// Every public definition, grouped by endpoint group.
pub async fn endpoint_catalog(
    State(state): State<AppState>,
) -> Json<BTreeMap<EndpointGroup, Vec<CatalogEntry>>> {
    let mut catalog = BTreeMap::new();
    for (group, map) in state.registry.get_all().await {
        let entries = map
            .definitions()
            .filter(|d| !d.is_private)
            .map(|d| CatalogEntry::from(d.as_ref()))
            .collect();
        catalog.insert(group, entries);
    }
    Json(catalog)
}

// ---- Admin reload ----

pub async fn reload_all(State(state): State<AppState>) -> Json<ReloadReport> {
    let report = state.registry.reload(None).await;
    info!(
        groups = report.counts.len(),
        conflicts = report.conflicts.len(),
        "Definitions reloaded on request"
    );
    Json(report)
}

pub async fn reload_group(
    State(state): State<AppState>,
    Path(group): Path<String>,
) -> Result<Json<ReloadReport>, GatewayError> {
    let group = EndpointGroup::from_str(&group).map_err(GatewayError::BadRequest)?;
    let report = state.registry.reload(Some(group)).await;
    info!(group = %group, conflicts = report.conflicts.len(), "Definition group reloaded on request");
    Ok(Json(report))
}
