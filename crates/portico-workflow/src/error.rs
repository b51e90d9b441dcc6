use portico_core::ErrorCategory;
use serde_json::Value;
use thiserror::Error;

/// Failures that stop a workflow before any step runs.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Composite workflow '{0}' not found")]
    NotFound(String),

    #[error("Environment '{environment}' is not allowed for workflow '{workflow}'")]
    EnvironmentNotAllowed {
        workflow: String,
        environment: String,
    },

    #[error("Request body is not valid JSON: {0}")]
    InvalidBody(#[source] serde_json::Error),
}

impl WorkflowError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound(_) => ErrorCategory::NotFound,
            Self::EnvironmentNotAllowed { .. } | Self::InvalidBody(_) => ErrorCategory::Validation,
        }
    }
}

/// Failure of one outbound call.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Invalid outbound request: {0}")]
    InvalidRequest(String),

    #[error("Outbound request timed out: {0}")]
    Timeout(String),

    #[error("Failed to connect to backend: {0}")]
    Connect(String),

    #[error("Outbound request failed: {0}")]
    Request(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else if e.is_connect() {
            Self::Connect(e.to_string())
        } else if e.is_builder() {
            Self::InvalidRequest(e.to_string())
        } else {
            Self::Request(e.to_string())
        }
    }
}

/// Failure of one workflow step. Any of these halts the run.
#[derive(Debug, Error)]
pub enum StepError {
    /// The backend answered with a non-success status.
    #[error("Step '{step}' failed with status {status}")]
    Backend {
        step: String,
        status: u16,
        /// Parsed JSON body, or the body text truncated for display.
        detail: Value,
        raw: String,
    },

    /// The step cannot be executed as configured.
    #[error("Step '{step}' is misconfigured: {message}")]
    Configuration { step: String, message: String },

    /// The request body does not provide what the step needs.
    #[error("Step '{step}' has invalid input: {message}")]
    Input { step: String, message: String },

    #[error("Step '{step}' could not reach its backend: {source}")]
    Transport {
        step: String,
        #[source]
        source: TransportError,
    },
}

impl StepError {
    pub fn configuration(step: &str, message: impl Into<String>) -> Self {
        Self::Configuration {
            step: step.to_string(),
            message: message.into(),
        }
    }

    pub fn input(step: &str, message: impl Into<String>) -> Self {
        Self::Input {
            step: step.to_string(),
            message: message.into(),
        }
    }

    pub fn step(&self) -> &str {
        match self {
            Self::Backend { step, .. }
            | Self::Configuration { step, .. }
            | Self::Input { step, .. }
            | Self::Transport { step, .. } => step,
        }
    }

    /// The backend's own status, or 400 for everything that is not a
    /// backend answer.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Backend { status, .. } => *status,
            _ => 400,
        }
    }

    pub fn detail(&self) -> Option<&Value> {
        match self {
            Self::Backend { detail, .. } => Some(detail),
            _ => None,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Backend { .. } | Self::Transport { .. } => ErrorCategory::Upstream,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Input { .. } => ErrorCategory::Validation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn backend(status: u16) -> StepError {
        StepError::Backend {
            step: "CreateHeader".into(),
            status,
            detail: json!({"message": "bad input"}),
            raw: r#"{"message":"bad input"}"#.into(),
        }
    }

    #[test]
    fn test_status_mirroring() {
        assert_eq!(backend(400).status_code(), 400);
        assert_eq!(backend(503).status_code(), 503);
        assert_eq!(backend(302).status_code(), 302);
        assert_eq!(StepError::input("A", "missing").status_code(), 400);
        assert_eq!(StepError::configuration("A", "unknown").status_code(), 400);
    }

    #[test]
    fn test_step_and_detail() {
        let err = backend(404);
        assert_eq!(err.step(), "CreateHeader");
        assert_eq!(err.detail(), Some(&json!({"message": "bad input"})));
        assert_eq!(err.to_string(), "Step 'CreateHeader' failed with status 404");
        assert!(StepError::input("A", "x").detail().is_none());
    }

    #[test]
    fn test_categories() {
        assert_eq!(
            WorkflowError::NotFound("X".into()).category(),
            ErrorCategory::NotFound
        );
        assert!(
            WorkflowError::EnvironmentNotAllowed {
                workflow: "X".into(),
                environment: "dev".into()
            }
            .category()
            .is_client_error()
        );
        assert_eq!(backend(500).category(), ErrorCategory::Upstream);
    }
}
