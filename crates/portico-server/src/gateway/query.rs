//! Relational and webhook endpoints, served through an external query
//! executor.

use std::collections::HashMap;

use async_trait::async_trait;
use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    response::{IntoResponse, Response},
};
use portico_registry::{EndpointDefinition, EndpointGroup, EndpointTarget, KindDetails};
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use super::GatewayError;
use crate::server::AppState;

pub type QueryRows = Vec<Map<String, Value>>;

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct QueryError(pub String);

/// Executes a named database object with named parameters against the
/// database of an environment.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(
        &self,
        environment: &str,
        object: &str,
        parameters: &Map<String, Value>,
    ) -> Result<QueryRows, QueryError>;
}

/// Query options that are passed through without column mapping.
const OPTION_PREFIX: char = '$';

/// `schema.name` of the object behind a definition.
fn object_name(definition: &EndpointDefinition) -> Result<String, GatewayError> {
    match &definition.target {
        EndpointTarget::DatabaseObject { schema, name } => Ok(format!("{schema}.{name}")),
        _ => Err(GatewayError::InternalError(format!(
            "endpoint '{}' has no database object",
            definition.routing_key()
        ))),
    }
}

/// Maps public query-string names to database names.
///
/// Column aliases resolve to their real columns, function parameters keep
/// their declared name, and `$`-prefixed options pass through untouched.
pub fn map_parameters(
    definition: &EndpointDefinition,
    query: &HashMap<String, String>,
) -> Result<Map<String, Value>, GatewayError> {
    let columns = definition.columns();
    let function_parameters: &[_] = match &definition.details {
        KindDetails::Relational { parameters, .. } => parameters,
        _ => &[],
    };

    let mut mapped = Map::new();
    for (name, value) in query {
        let target = if name.starts_with(OPTION_PREFIX) {
            name.clone()
        } else if let Some(p) = function_parameters
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
        {
            p.name.clone()
        } else if let Some(real) = columns.real_name(name) {
            real.to_string()
        } else if columns.is_empty() {
            name.clone()
        } else {
            return Err(GatewayError::BadRequest(format!(
                "column '{name}' is not available on '{}'",
                definition.routing_key()
            )));
        };
        mapped.insert(target, Value::String(value.clone()));
    }
    Ok(mapped)
}

/// Renames database columns in result rows back to their public aliases.
fn alias_rows(definition: &EndpointDefinition, rows: QueryRows) -> Vec<Value> {
    let columns = definition.columns();
    if columns.is_empty() {
        return rows.into_iter().map(Value::Object).collect();
    }
    rows.into_iter()
        .map(|row| {
            Value::Object(
                row.into_iter()
                    .map(|(k, v)| (columns.alias(&k).map_or(k.clone(), str::to_string), v))
                    .collect(),
            )
        })
        .collect()
}

fn executor(state: &AppState) -> Result<&dyn QueryExecutor, GatewayError> {
    state.query_executor.as_deref().ok_or_else(|| {
        GatewayError::NotSupported("no query executor is configured".to_string())
    })
}

/// `GET` on a relational endpoint. A `key` taken from the path filters on
/// the definition's primary key.
#[instrument(skip_all, fields(endpoint = %definition.routing_key()))]
pub async fn query_relational(
    state: &AppState,
    definition: &EndpointDefinition,
    environment: &str,
    key: Option<&str>,
    query: &HashMap<String, String>,
) -> Result<Response, GatewayError> {
    let executor = executor(state)?;
    let object = object_name(definition)?;
    let mut parameters = map_parameters(definition, query)?;
    if let Some(key) = key {
        let primary_key = match &definition.details {
            KindDetails::Relational {
                primary_key: Some(pk),
                ..
            } => pk.clone(),
            _ => {
                return Err(GatewayError::RouteNotFound {
                    path: format!("{}/{key}", definition.routing_key()),
                });
            }
        };
        parameters.insert(primary_key, Value::String(key.to_string()));
    }
    debug!(object = %object, parameters = parameters.len(), "Executing relational query");

    let rows = executor
        .execute(environment, &object, &parameters)
        .await
        .map_err(|e| GatewayError::UpstreamError(format!("query on '{object}' failed: {e}")))?;
    info!(object = %object, rows = rows.len(), "Relational query completed");
    Ok(Json(Value::Array(alias_rows(definition, rows))).into_response())
}

/// `POST /api/{env}/webhook/{id}`.
pub async fn handle_webhook(
    State(state): State<AppState>,
    Path((environment, webhook_id)): Path<(String, String)>,
    body: Bytes,
) -> Result<Response, GatewayError> {
    if !state.engine.executor().environments().is_known(&environment) {
        return Err(GatewayError::EnvironmentNotAllowed {
            environment,
            target: format!("webhook '{webhook_id}'"),
        });
    }

    let webhooks = state.registry.get(EndpointGroup::Webhook).await;
    let definition = webhooks
        .definitions()
        .find(|d| match &d.details {
            KindDetails::Webhook { allowed_ids } => {
                allowed_ids.iter().any(|id| id.eq_ignore_ascii_case(&webhook_id))
            }
            _ => false,
        })
        .cloned()
        .ok_or_else(|| GatewayError::RouteNotFound {
            path: format!("webhook/{webhook_id}"),
        })?;

    if !definition.allows_environment(&environment) {
        return Err(GatewayError::EnvironmentNotAllowed {
            environment,
            target: format!("webhook '{webhook_id}'"),
        });
    }

    let payload: Value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).map_err(|e| {
            GatewayError::BadRequest(format!("request body is not valid JSON: {e}"))
        })?
    };

    let executor = executor(&state)?;
    let object = object_name(&definition)?;
    let mut parameters = Map::new();
    parameters.insert("WebhookId".to_string(), Value::String(webhook_id.clone()));
    parameters.insert("Payload".to_string(), payload);

    let rows = executor.execute(&environment, &object, &parameters).await.map_err(|e| {
        warn!(webhook = %webhook_id, error = %e, "Webhook delivery failed");
        GatewayError::UpstreamError(format!("webhook '{webhook_id}' failed: {e}"))
    })?;
    info!(webhook = %webhook_id, object = %object, "Webhook accepted");
    Ok(Json(serde_json::json!({ "Success": true, "Rows": rows.len() })).into_response())
}
