//! Step outputs and the aggregate composite result.

use indexmap::IndexMap;
use portico_core::ValueTree;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::StepError;

/// Output of one completed step.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutput {
    Single(ValueTree),
    /// One entry per array element, in input order.
    Many(Vec<ValueTree>),
}

impl StepOutput {
    /// Navigates the output along a dotted path already split into
    /// segments. For array-mode output the first segment indexes the list.
    pub fn navigate<S: AsRef<str>>(&self, path: &[S]) -> Option<Value> {
        match self {
            StepOutput::Single(tree) => tree.navigate(path).cloned(),
            StepOutput::Many(items) => match path.split_first() {
                None => Some(self.to_value()),
                Some((index, rest)) => {
                    let item = items.get(index.as_ref().parse::<usize>().ok()?)?;
                    item.navigate(rest).cloned()
                }
            },
        }
    }

    /// Output as a single tree; array-mode output becomes a JSON array.
    pub fn to_tree(&self) -> ValueTree {
        match self {
            StepOutput::Single(tree) => tree.clone(),
            StepOutput::Many(_) => ValueTree::new(self.to_value()),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            StepOutput::Single(tree) => tree.as_value().clone(),
            StepOutput::Many(items) => {
                Value::Array(items.iter().map(|t| t.as_value().clone()).collect())
            }
        }
    }
}

/// Completed step outputs keyed by step name, in execution order.
pub type StepResults = IndexMap<String, StepOutput>;

/// Response of a composite invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CompositeResult {
    pub success: bool,

    pub step_results: Map<String, Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_step: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,

    #[serde(skip)]
    pub correlation_id: String,
}

impl CompositeResult {
    pub fn success(step_results: Map<String, Value>, correlation_id: impl Into<String>) -> Self {
        Self {
            success: true,
            step_results,
            error_step: None,
            error_message: None,
            error_detail: None,
            status_code: None,
            correlation_id: correlation_id.into(),
        }
    }

    /// Failure carrying the outputs of the steps completed before `error`.
    pub fn failure(
        completed: &StepResults,
        error: &StepError,
        correlation_id: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            step_results: to_map(completed),
            error_step: Some(error.step().to_string()),
            error_message: Some(error.to_string()),
            error_detail: error.detail().cloned(),
            status_code: Some(error.status_code()),
            correlation_id: correlation_id.into(),
        }
    }

    /// HTTP status the response is sent with: the failing call's 4xx/5xx,
    /// else 500.
    pub fn http_status(&self) -> u16 {
        if self.success {
            return 200;
        }
        self.status_code
            .filter(|status| (400..=599).contains(status))
            .unwrap_or(500)
    }
}

pub(crate) fn to_map(results: &StepResults) -> Map<String, Value> {
    results
        .iter()
        .map(|(name, output)| (name.clone(), output.to_value()))
        .collect()
}
