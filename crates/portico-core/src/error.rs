use thiserror::Error;

/// Core error types shared across the gateway crates
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Unsupported HTTP method: {0}")]
    UnsupportedMethod(String),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl CoreError {
    /// Create a new UnsupportedMethod error
    pub fn unsupported_method(method: impl Into<String>) -> Self {
        Self::UnsupportedMethod(method.into())
    }

    /// Get error category for logging/monitoring
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::UnsupportedMethod(_) => ErrorCategory::Validation,
            Self::JsonError(_) => ErrorCategory::Serialization,
        }
    }
}

/// Error categories for monitoring and classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    NotFound,
    Serialization,
    Configuration,
    Upstream,
    System,
}

impl ErrorCategory {
    /// Whether errors of this category are caused by the caller (4xx).
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation | Self::NotFound | Self::Serialization)
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::NotFound => write!(f, "not_found"),
            Self::Serialization => write!(f, "serialization"),
            Self::Configuration => write!(f, "configuration"),
            Self::Upstream => write!(f, "upstream"),
            Self::System => write!(f, "system"),
        }
    }
}

/// Convenience result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
