//! Template transformations applied to step payloads.
//!
//! | Template                  | Value                                                  |
//! |---------------------------|--------------------------------------------------------|
//! | `$guid`                   | UUID generated once per run                            |
//! | `$requestid`              | correlation id of the run                              |
//! | `$context.<name>`         | stored context variable                                |
//! | `$prev.<step>.<a.b.0>`    | value navigated out of a completed step's output       |
//! | anything without `$`      | the text itself                                        |
//!
//! References that resolve to nothing leave the target property untouched.

use indexmap::IndexMap;
use portico_core::{ValueTree, generate_id};
use serde_json::Value;
use tracing::{debug, warn};

use crate::context::ExecutionContext;
use crate::result::StepResults;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Template {
    Guid,
    RequestId,
    Context(String),
    Previous { step: String, path: Vec<String> },
    Literal(String),
    /// A `$` expression this engine does not know.
    Unsupported(String),
}

impl Template {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        let Some(expression) = raw.strip_prefix('$') else {
            return Template::Literal(raw.to_string());
        };

        if expression.eq_ignore_ascii_case("guid") {
            return Template::Guid;
        }
        if expression.eq_ignore_ascii_case("requestid") {
            return Template::RequestId;
        }
        if let Some(name) = expression.strip_prefix("context.") {
            if !name.is_empty() {
                return Template::Context(name.to_string());
            }
        }
        if let Some(reference) = expression.strip_prefix("prev.") {
            let mut parts = reference.split('.');
            if let Some(step) = parts.next().filter(|s| !s.is_empty()) {
                return Template::Previous {
                    step: step.to_string(),
                    path: parts.map(str::to_string).collect(),
                };
            }
        }
        Template::Unsupported(raw.to_string())
    }

    /// Resolves the template against the run state. `None` means "leave the
    /// target property as it is".
    pub fn resolve(&self, ctx: &mut ExecutionContext, completed: &StepResults) -> Option<Value> {
        match self {
            Template::Guid => Some(ctx.memoize("guid", || Value::String(generate_id()))),
            Template::RequestId => Some(Value::String(ctx.correlation_id().to_string())),
            Template::Context(name) => {
                let value = ctx.variable(name).cloned();
                if value.is_none() {
                    debug!(variable = %name, "Context variable not set");
                }
                value
            }
            Template::Previous { step, path } => {
                let Some(output) = completed.get(step) else {
                    warn!(step = %step, "Referenced step has not completed");
                    return None;
                };
                let value = output.navigate(path);
                if value.is_none() {
                    warn!(step = %step, path = %path.join("."), "Path not found in step output");
                }
                value
            }
            Template::Literal(text) => Some(Value::String(text.clone())),
            Template::Unsupported(raw) => {
                warn!(template = %raw, "Unsupported template expression");
                None
            }
        }
    }
}

/// Applies every transformation to `input`, in declaration order.
///
/// Only object payloads have properties to set; other payloads are returned
/// unchanged.
pub fn apply_templates(
    mut input: ValueTree,
    transformations: &IndexMap<String, String>,
    ctx: &mut ExecutionContext,
    completed: &StepResults,
) -> ValueTree {
    if transformations.is_empty() {
        return input;
    }
    if !input.is_object() {
        debug!("Payload is not an object, templates not applied");
        return input;
    }

    for (target, raw) in transformations {
        if let Some(value) = Template::parse(raw).resolve(ctx, completed) {
            input.set_property(target.clone(), value);
        }
    }
    input
}
