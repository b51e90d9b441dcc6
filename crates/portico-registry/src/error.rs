//! Errors raised while loading endpoint definitions.

use std::path::PathBuf;

use portico_core::ErrorCategory;
use thiserror::Error;

use crate::kind::EndpointGroup;

/// A problem with one definition file.
///
/// None of these are fatal to the process: the loader logs the error and
/// excludes the offending file from the registry.
#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid definition document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid namespace '{namespace}': {reason}")]
    InvalidNamespace { namespace: String, reason: String },

    #[error("Invalid endpoint name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Definition type '{found}' is not allowed under the {group} group")]
    KindMismatch { found: String, group: EndpointGroup },

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Unsupported HTTP method: '{0}'")]
    UnsupportedMethod(String),

    #[error("Invalid column entry '{entry}': {reason}")]
    InvalidColumn { entry: String, reason: &'static str },

    #[error("Invalid function parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid workflow: {0}")]
    InvalidWorkflow(String),

    #[error("Content file '{0}' must be a relative path inside the definition directory")]
    InvalidContentFile(String),
}

impl DefinitionError {
    pub fn invalid_namespace(namespace: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidNamespace {
            namespace: namespace.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Naming problems are reported as skipped files; everything else is a
    /// malformed definition.
    pub fn is_naming_problem(&self) -> bool {
        matches!(
            self,
            Self::InvalidNamespace { .. } | Self::InvalidName { .. }
        )
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Io { .. } => ErrorCategory::System,
            Self::Json(_) => ErrorCategory::Serialization,
            _ => ErrorCategory::Configuration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_naming_problems() {
        assert!(DefinitionError::invalid_namespace("api", "reserved").is_naming_problem());
        assert!(DefinitionError::invalid_name("", "empty").is_naming_problem());
        assert!(!DefinitionError::UnsupportedMethod("FETCH".into()).is_naming_problem());
    }

    #[test]
    fn test_messages() {
        let err = DefinitionError::KindMismatch {
            found: "SQL".into(),
            group: EndpointGroup::Proxy,
        };
        assert_eq!(
            err.to_string(),
            "Definition type 'SQL' is not allowed under the proxy group"
        );
        assert_eq!(err.category(), ErrorCategory::Configuration);
    }
}
