//! `ANY /api/{env}/{*path}`: resolves the path to an endpoint and hands the
//! request to the owning group's handler.

use std::collections::HashMap;
use std::str::FromStr;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::Request,
    response::Response,
};
use portico_core::HttpMethod;
use portico_registry::EndpointGroup;
use tracing::debug;

use super::{GatewayError, proxy, query, static_content};
use crate::server::AppState;

#[axum::debug_handler]
pub async fn handle_api(
    State(state): State<AppState>,
    Path((environment, path)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
    request: Request<Body>,
) -> Result<Response, GatewayError> {
    let not_found = || GatewayError::RouteNotFound { path: path.clone() };

    if !state.engine.executor().environments().is_known(&environment) {
        return Err(GatewayError::EnvironmentNotAllowed {
            environment,
            target: path.clone(),
        });
    }

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let resolved = state
        .registry
        .resolve(&segments)
        .await
        .ok_or_else(not_found)?;
    let definition = &resolved.definition;
    debug!(
        group = %resolved.group,
        endpoint = %definition.routing_key(),
        remainder = resolved.remainder.len(),
        "Resolved request path"
    );

    // Private endpoints are reachable only as workflow steps
    if definition.is_private {
        return Err(not_found());
    }
    if !definition.allows_environment(&environment) {
        return Err(GatewayError::EnvironmentNotAllowed {
            environment,
            target: definition.routing_key(),
        });
    }

    let request_method = request.method().to_string();
    let method_not_allowed = || GatewayError::MethodNotAllowed {
        method: request_method.clone(),
        target: definition.routing_key(),
    };
    let method = HttpMethod::from_str(&request_method).map_err(|_| method_not_allowed())?;
    if !definition.allows_method(method) {
        return Err(method_not_allowed());
    }

    match resolved.group {
        EndpointGroup::Proxy => {
            proxy::forward(&state, definition, &resolved.remainder, &environment, request).await
        }
        EndpointGroup::Sql => {
            if method != HttpMethod::Get {
                return Err(GatewayError::NotSupported(format!(
                    "{method} on relational endpoint '{}'",
                    definition.routing_key()
                )));
            }
            let key = match resolved.remainder.as_slice() {
                [] => None,
                [key] => Some(key.as_str()),
                _ => return Err(not_found()),
            };
            query::query_relational(&state, definition, &environment, key, &params).await
        }
        EndpointGroup::Static => {
            if !resolved.remainder.is_empty() {
                return Err(not_found());
            }
            static_content::serve_static(definition).await
        }
        EndpointGroup::File => Err(GatewayError::NotSupported(format!(
            "file endpoint '{}' requires external storage",
            definition.routing_key()
        ))),
        EndpointGroup::Composite | EndpointGroup::Webhook => Err(not_found()),
    }
}
