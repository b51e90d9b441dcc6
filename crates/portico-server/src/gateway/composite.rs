//! `POST /api/{env}/composite/{*name}`, where `name` is the workflow's
//! routing key (`Sales/Order`) or an unambiguous bare name.

use axum::{
    Json,
    body::Bytes,
    extract::{Extension, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use portico_workflow::RunOptions;
use tracing::info;

use super::{GatewayError, gateway_base};
use crate::middleware::RequestId;
use crate::server::AppState;

/// Runs a composite workflow. The request id, when present, becomes the
/// run's correlation id so `$requestid` and the logs agree.
pub async fn handle_composite(
    State(state): State<AppState>,
    Path((environment, name)): Path<(String, String)>,
    request_id: Option<Extension<RequestId>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, GatewayError> {
    let options = RunOptions {
        gateway_base: gateway_base(&state.config, &headers),
        correlation_id: request_id.map(|Extension(id)| id.0),
    };

    let result = state.engine.run(&name, &environment, &body, &options).await?;

    let status =
        StatusCode::from_u16(result.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    info!(
        workflow = %name,
        environment = %environment,
        success = result.success,
        status = status.as_u16(),
        "Composite request completed"
    );
    Ok((status, Json(result)).into_response())
}
