//! Composite workflow engine.
//!
//! A run resolves the workflow from the registry, then executes its steps
//! strictly in list order. Array-mode steps call their endpoint once per
//! element, also in order. The first failing step ends the run; earlier
//! steps are neither retried nor compensated. `DependsOn` is informational:
//! only list order and the source/array property wiring drive data flow.

use std::sync::Arc;

use portico_core::ValueTree;
use portico_registry::{
    EndpointDefinition, EndpointGroup, EndpointMap, EndpointRegistry, WorkflowStep,
};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::context::ExecutionContext;
use crate::error::{StepError, WorkflowError};
use crate::executor::StepExecutor;
use crate::result::{CompositeResult, StepOutput, StepResults, to_map};
use crate::rewrite::UrlRewriter;
use crate::template::apply_templates;

/// Per-invocation settings supplied by the caller.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Gateway `scheme://host[:port]` used when rewriting backend URLs.
    pub gateway_base: String,
    /// Correlation id to use instead of a generated one.
    pub correlation_id: Option<String>,
}

#[derive(Clone)]
pub struct WorkflowEngine {
    registry: Arc<EndpointRegistry>,
    executor: StepExecutor,
}

impl WorkflowEngine {
    pub fn new(registry: Arc<EndpointRegistry>, executor: StepExecutor) -> Self {
        Self { registry, executor }
    }

    pub fn registry(&self) -> &Arc<EndpointRegistry> {
        &self.registry
    }

    pub fn executor(&self) -> &StepExecutor {
        &self.executor
    }

    /// Runs the named workflow.
    ///
    /// Errors are returned only for failures detected before the first step
    /// runs; a failing step yields `Ok` with an unsuccessful result.
    #[instrument(skip(self, body, options), fields(workflow = %workflow_name, environment = %environment, correlation_id = tracing::field::Empty))]
    pub async fn run(
        &self,
        workflow_name: &str,
        environment: &str,
        body: &[u8],
        options: &RunOptions,
    ) -> Result<CompositeResult, WorkflowError> {
        let composites = self.registry.get(EndpointGroup::Composite).await;
        let (definition, workflow) = composites
            .get(workflow_name)
            .and_then(|def| def.workflow.as_ref().map(|wf| (def, wf)))
            .ok_or_else(|| WorkflowError::NotFound(workflow_name.to_string()))?;

        if !self.executor.environments().is_known(environment)
            || !definition.allows_environment(environment)
        {
            return Err(WorkflowError::EnvironmentNotAllowed {
                workflow: workflow_name.to_string(),
                environment: environment.to_string(),
            });
        }

        let request = ValueTree::new(
            serde_json::from_slice::<Value>(body).map_err(WorkflowError::InvalidBody)?,
        );

        let mut ctx = match &options.correlation_id {
            Some(id) => ExecutionContext::with_correlation_id(id.clone()),
            None => ExecutionContext::new(),
        };
        tracing::Span::current().record("correlation_id", ctx.correlation_id());

        let endpoints = self.registry.get(EndpointGroup::Proxy).await;
        let mut completed = StepResults::new();
        let mut participants: Vec<Arc<EndpointDefinition>> = Vec::new();

        for step in &workflow.steps {
            let outcome = self
                .run_step(step, &endpoints, environment, &request, &mut ctx, &completed)
                .await;
            match outcome {
                Ok((endpoint, output)) => {
                    debug!(step = %step.name, "Step completed");
                    if !participants.iter().any(|p| Arc::ptr_eq(p, &endpoint)) {
                        participants.push(endpoint);
                    }
                    completed.insert(step.name.clone(), output);
                }
                Err(error) => {
                    warn!(
                        step = %error.step(),
                        status = error.status_code(),
                        category = %error.category(),
                        error = %error,
                        "Workflow halted"
                    );
                    return Ok(CompositeResult::failure(
                        &completed,
                        &error,
                        ctx.correlation_id(),
                    ));
                }
            }
        }

        let rewriter = UrlRewriter::new(&options.gateway_base, environment);
        let results = Value::Object(to_map(&completed));
        let step_results = match rewriter.rewrite_value(&results, &participants) {
            Value::Object(map) => map,
            _ => to_map(&completed),
        };

        info!(steps = completed.len(), "Workflow completed");
        Ok(CompositeResult::success(step_results, ctx.correlation_id()))
    }

    async fn run_step(
        &self,
        step: &WorkflowStep,
        endpoints: &EndpointMap,
        environment: &str,
        request: &ValueTree,
        ctx: &mut ExecutionContext,
        completed: &StepResults,
    ) -> Result<(Arc<EndpointDefinition>, StepOutput), StepError> {
        let endpoint = endpoints.get(&step.endpoint).cloned().ok_or_else(|| {
            StepError::configuration(
                &step.name,
                format!("forwarding endpoint '{}' not found", step.endpoint),
            )
        })?;
        if !endpoint.allows_method(step.method) {
            return Err(StepError::configuration(
                &step.name,
                format!(
                    "method {} is not allowed for endpoint '{}'",
                    step.method, step.endpoint
                ),
            ));
        }

        let output = if step.is_array {
            let items = array_input(step, request)?;
            let mut outputs = Vec::with_capacity(items.len());
            for item in items {
                let payload = apply_templates(item, &step.template_transformations, ctx, completed);
                outputs.push(self.executor.call(step, &endpoint, environment, &payload).await?);
            }
            StepOutput::Many(outputs)
        } else {
            let input = single_input(step, request, completed);
            let payload = apply_templates(input, &step.template_transformations, ctx, completed);
            StepOutput::Single(self.executor.call(step, &endpoint, environment, &payload).await?)
        };

        Ok((endpoint, output))
    }
}

/// Elements of the step's array property in the original request.
fn array_input(step: &WorkflowStep, request: &ValueTree) -> Result<Vec<ValueTree>, StepError> {
    let property = step.array_property.as_deref().unwrap_or_default();
    let value = request.property(property).ok_or_else(|| {
        StepError::input(
            &step.name,
            format!("request property '{property}' is missing"),
        )
    })?;
    value.elements().ok_or_else(|| {
        StepError::input(
            &step.name,
            format!("request property '{property}' is not an array"),
        )
    })
}

/// Input of a single-call step: a completed step's output named by the
/// source property, else that request property, else the whole request.
fn single_input(step: &WorkflowStep, request: &ValueTree, completed: &StepResults) -> ValueTree {
    let Some(source) = step.source_property.as_deref() else {
        return request.clone();
    };
    if let Some(output) = completed.get(source) {
        return output.to_tree();
    }
    request.property(source).unwrap_or_else(|| request.clone())
}
