//! Execution of a single outbound step call.

use std::sync::Arc;

use portico_core::ValueTree;
use portico_registry::{EndpointDefinition, WorkflowStep};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::environment::EnvironmentProvider;
use crate::error::StepError;
use crate::transport::{DATABASE_NAME_HEADER, OutboundRequest, SERVER_NAME_HEADER, StepTransport};

/// Longest error body echoed back as text.
const MAX_DETAIL_CHARS: usize = 200;

/// Sends one step payload to its forwarding endpoint and interprets the
/// answer.
#[derive(Clone)]
pub struct StepExecutor {
    transport: Arc<dyn StepTransport>,
    environments: Arc<dyn EnvironmentProvider>,
    server_name: String,
}

impl StepExecutor {
    pub fn new(
        transport: Arc<dyn StepTransport>,
        environments: Arc<dyn EnvironmentProvider>,
        server_name: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            environments,
            server_name: server_name.into(),
        }
    }

    pub fn environments(&self) -> &Arc<dyn EnvironmentProvider> {
        &self.environments
    }

    /// Headers attached to every outbound call for `environment`.
    pub fn outbound_headers(&self, environment: &str) -> Vec<(String, String)> {
        let mut headers = vec![
            (SERVER_NAME_HEADER.to_string(), self.server_name.clone()),
            (DATABASE_NAME_HEADER.to_string(), environment.to_string()),
        ];
        headers.extend(self.environments.headers(environment));
        headers
    }

    #[instrument(skip_all, fields(step = %step.name, endpoint = %step.endpoint, method = %step.method))]
    pub async fn call(
        &self,
        step: &WorkflowStep,
        endpoint: &EndpointDefinition,
        environment: &str,
        payload: &ValueTree,
    ) -> Result<ValueTree, StepError> {
        let url = endpoint.url().ok_or_else(|| {
            StepError::configuration(
                &step.name,
                format!("endpoint '{}' has no backend address", step.endpoint),
            )
        })?;

        let request = OutboundRequest {
            method: step.method,
            url: url.to_string(),
            headers: self.outbound_headers(environment),
            body: (!step.method.is_bodiless()).then(|| payload.as_value().clone()),
        };

        let response = self
            .transport
            .send(request)
            .await
            .map_err(|source| StepError::Transport {
                step: step.name.clone(),
                source,
            })?;

        if !response.is_success() {
            debug!(status = response.status, "Backend rejected step");
            return Err(StepError::Backend {
                step: step.name.clone(),
                status: response.status,
                detail: error_detail(&response.body),
                raw: response.body,
            });
        }

        Ok(ValueTree::new(success_body(&response.body)))
    }
}

/// Parsed JSON error body, or the text cut to a readable length.
pub fn error_detail(body: &str) -> Value {
    serde_json::from_str(body)
        .unwrap_or_else(|_| Value::String(body.chars().take(MAX_DETAIL_CHARS).collect()))
}

fn success_body(body: &str) -> Value {
    if body.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string()))
}
