//! Environment seam: which environments exist and what each adds to
//! outbound calls.

use std::collections::HashMap;

pub trait EnvironmentProvider: Send + Sync {
    /// Whether requests may target this environment at all.
    fn is_known(&self, environment: &str) -> bool;

    /// Extra headers injected into every outbound call for the environment.
    fn headers(&self, environment: &str) -> Vec<(String, String)>;
}

/// Environment table fixed at start-up.
///
/// An empty allow-list accepts every environment name.
#[derive(Debug, Clone, Default)]
pub struct StaticEnvironments {
    allowed: Vec<String>,
    headers: HashMap<String, Vec<(String, String)>>,
}

impl StaticEnvironments {
    pub fn new(allowed: Vec<String>) -> Self {
        Self {
            allowed,
            headers: HashMap::new(),
        }
    }

    pub fn with_headers<K, V>(
        mut self,
        environment: &str,
        headers: impl IntoIterator<Item = (K, V)>,
    ) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.headers.insert(
            environment.to_ascii_lowercase(),
            headers
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }
}

impl EnvironmentProvider for StaticEnvironments {
    fn is_known(&self, environment: &str) -> bool {
        self.allowed.is_empty()
            || self
                .allowed
                .iter()
                .any(|e| e.eq_ignore_ascii_case(environment))
    }

    fn headers(&self, environment: &str) -> Vec<(String, String)> {
        self.headers
            .get(&environment.to_ascii_lowercase())
            .cloned()
            .unwrap_or_default()
    }
}
