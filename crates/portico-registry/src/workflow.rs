//! Composite workflow definitions.

use std::collections::HashSet;

use indexmap::IndexMap;
use portico_core::HttpMethod;
use serde::{Deserialize, Serialize};

use crate::error::DefinitionError;

/// Ordered list of backend calls executed as one client request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CompositeWorkflow {
    #[serde(default, alias = "name")]
    pub name: String,

    #[serde(default, alias = "description")]
    pub description: Option<String>,

    #[serde(default, alias = "steps")]
    pub steps: Vec<WorkflowStep>,
}

/// One backend call within a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WorkflowStep {
    #[serde(alias = "name")]
    pub name: String,

    /// Name (routing key) of the forwarding endpoint this step calls.
    #[serde(alias = "endpoint")]
    pub endpoint: String,

    #[serde(default = "default_step_method", alias = "method")]
    pub method: HttpMethod,

    /// Recorded for documentation only; execution order is list order.
    #[serde(default, alias = "dependsOn", skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<String>,

    #[serde(default, alias = "isArray")]
    pub is_array: bool,

    #[serde(default, alias = "arrayProperty", skip_serializing_if = "Option::is_none")]
    pub array_property: Option<String>,

    /// A completed step's name or a request-body property used as this step's input.
    #[serde(default, alias = "sourceProperty", skip_serializing_if = "Option::is_none")]
    pub source_property: Option<String>,

    /// Target property name -> template string.
    #[serde(default, alias = "templateTransformations")]
    pub template_transformations: IndexMap<String, String>,
}

fn default_step_method() -> HttpMethod {
    HttpMethod::Post
}

impl CompositeWorkflow {
    pub fn validate(&self) -> Result<(), DefinitionError> {
        if self.steps.is_empty() {
            return Err(DefinitionError::InvalidWorkflow(format!(
                "workflow '{}' has no steps",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        for step in &self.steps {
            if step.name.trim().is_empty() {
                return Err(DefinitionError::InvalidWorkflow(
                    "step name must not be empty".into(),
                ));
            }
            if !seen.insert(step.name.as_str()) {
                return Err(DefinitionError::InvalidWorkflow(format!(
                    "duplicate step name '{}'",
                    step.name
                )));
            }
            if step.endpoint.trim().is_empty() {
                return Err(DefinitionError::InvalidWorkflow(format!(
                    "step '{}' has no endpoint",
                    step.name
                )));
            }
            if step.is_array
                && step
                    .array_property
                    .as_deref()
                    .is_none_or(|p| p.trim().is_empty())
            {
                return Err(DefinitionError::InvalidWorkflow(format!(
                    "array step '{}' has no array property",
                    step.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> CompositeWorkflow {
        serde_json::from_value(value).expect("workflow parses")
    }

    #[test]
    fn test_parses_pascal_and_camel_case() {
        let pascal = parse(json!({
            "Name": "SalesOrder",
            "Steps": [{
                "Name": "CreateLines",
                "Endpoint": "SalesOrderLine",
                "Method": "post",
                "IsArray": true,
                "ArrayProperty": "Lines",
                "TemplateTransformations": {"TransactionKey": "$guid"}
            }]
        }));
        let camel = parse(json!({
            "name": "SalesOrder",
            "steps": [{
                "name": "CreateLines",
                "endpoint": "SalesOrderLine",
                "method": "POST",
                "isArray": true,
                "arrayProperty": "Lines",
                "templateTransformations": {"TransactionKey": "$guid"}
            }]
        }));
        assert_eq!(pascal, camel);
        assert_eq!(pascal.steps[0].method, HttpMethod::Post);
        assert!(pascal.validate().is_ok());
    }

    #[test]
    fn test_method_defaults_to_post() {
        let wf = parse(json!({"Steps": [{"Name": "A", "Endpoint": "X"}]}));
        assert_eq!(wf.steps[0].method, HttpMethod::Post);
        assert!(wf.steps[0].depends_on.is_none());
    }

    #[test]
    fn test_unsupported_step_method_fails_to_parse() {
        let result = serde_json::from_value::<CompositeWorkflow>(json!({
            "Steps": [{"Name": "A", "Endpoint": "X", "Method": "FETCH"}]
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_failures() {
        assert!(parse(json!({"Name": "Empty", "Steps": []})).validate().is_err());
        assert!(
            parse(json!({"Steps": [
                {"Name": "A", "Endpoint": "X"},
                {"Name": "A", "Endpoint": "Y"}
            ]}))
            .validate()
            .is_err()
        );
        assert!(
            parse(json!({"Steps": [{"Name": "A", "Endpoint": "X", "IsArray": true}]}))
                .validate()
                .is_err()
        );
        assert!(
            parse(json!({"Steps": [{"Name": "A", "Endpoint": " "}]}))
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_template_order_is_preserved() {
        let wf = parse(json!({"Steps": [{
            "Name": "A", "Endpoint": "X",
            "TemplateTransformations": {"Z": "$guid", "A": "$requestid", "M": "$context.guid"}
        }]}));
        let keys: Vec<_> = wf.steps[0].template_transformations.keys().cloned().collect();
        assert_eq!(keys, vec!["Z", "A", "M"]);
    }
}
