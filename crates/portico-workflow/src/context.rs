//! Per-run execution state.

use std::collections::HashMap;

use portico_core::generate_id;
use serde_json::Value;

/// Correlation id and memoized variables of one workflow run.
///
/// Created for a single inbound request and dropped with it; never shared
/// between runs.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    correlation_id: String,
    variables: HashMap<String, Value>,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::with_correlation_id(generate_id())
    }

    pub fn with_correlation_id(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            variables: HashMap::new(),
        }
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    /// Returns the stored variable, creating it with `init` on first use.
    pub fn memoize(&mut self, name: &str, init: impl FnOnce() -> Value) -> Value {
        self.variables
            .entry(name.to_string())
            .or_insert_with(init)
            .clone()
    }
}
