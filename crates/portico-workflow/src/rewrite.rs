//! Rewrites backend URLs in results to the gateway's public URLs.
//!
//! For each forwarding endpoint the rewriter replaces
//!
//! * `scheme://host:port/path` of its backend address with
//!   `<gateway base>/api/<env>/<routing key>`,
//! * the same address without scheme with the gateway host plus public path,
//! * `.../Entity.REST.<variant>/<name>(<id>)` with the public path of the
//!   endpoint named `<name>`, keeping `(<id>)`.
//!
//! Trailing path segments, query strings and JSON quoting survive the
//! rewrite. The work is done on the serialized text and parsed back.

use std::sync::{Arc, LazyLock};

use portico_registry::EndpointDefinition;
use regex::{Captures, Regex};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

static LEGACY_ENTITY_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"https?://[^"\s]*?/Entity\.REST\.[A-Za-z0-9_]+/(?P<name>[A-Za-z0-9_.\-]+)\((?P<id>[^)"]*)\)"#)
        .expect("Invalid legacy entity URL regex")
});

/// Anything that cannot continue the address's last path segment.
const TRAILING_BOUNDARY: &str = r#"(?P<trail>[^A-Za-z0-9_.~%\-]|$)"#;
/// Characters that may precede a scheme-less address.
const LEADING_BOUNDARY: &str = r#"(?P<lead>^|[^A-Za-z0-9.\-:/])"#;

struct Rule {
    full: Regex,
    bare: Regex,
    public_url: String,
    public_bare: String,
}

#[derive(Debug, Clone)]
pub struct UrlRewriter {
    gateway_base: String,
    environment: String,
}

impl UrlRewriter {
    /// `gateway_base` is the gateway's own `scheme://host[:port]`.
    pub fn new(gateway_base: impl Into<String>, environment: impl Into<String>) -> Self {
        Self {
            gateway_base: gateway_base.into().trim_end_matches('/').to_string(),
            environment: environment.into(),
        }
    }

    /// Public path of an endpoint: `/api/<env>/<routing key>`.
    pub fn public_path(&self, routing_key: &str) -> String {
        format!("/api/{}/{}", self.environment, routing_key)
    }

    fn gateway_without_scheme(&self) -> &str {
        self.gateway_base
            .split_once("://")
            .map_or(self.gateway_base.as_str(), |(_, rest)| rest)
    }

    /// Rewrites a value tree; on any serialization problem the original
    /// value is returned.
    pub fn rewrite_value(&self, value: &Value, endpoints: &[Arc<EndpointDefinition>]) -> Value {
        let text = match serde_json::to_string(value) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Cannot serialize result for URL rewriting");
                return value.clone();
            }
        };

        let rewritten = self.rewrite_text(&text, endpoints);
        if rewritten == text {
            return value.clone();
        }

        match serde_json::from_str(&rewritten) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "Rewritten result is not valid JSON, keeping original");
                value.clone()
            }
        }
    }

    pub fn rewrite_text(&self, text: &str, endpoints: &[Arc<EndpointDefinition>]) -> String {
        let mut text = self.rewrite_legacy_entities(text, endpoints);

        let mut rules = self.rules(endpoints);
        // Longer addresses first so a nested backend path wins over its parent.
        rules.sort_by_key(|(len, _)| std::cmp::Reverse(*len));

        for (_, rule) in &rules {
            text = rule
                .full
                .replace_all(&text, |caps: &Captures| {
                    format!("{}{}", rule.public_url, &caps["trail"])
                })
                .into_owned();
        }
        for (_, rule) in &rules {
            text = rule
                .bare
                .replace_all(&text, |caps: &Captures| {
                    format!("{}{}{}", &caps["lead"], rule.public_bare, &caps["trail"])
                })
                .into_owned();
        }
        text
    }

    fn rules(&self, endpoints: &[Arc<EndpointDefinition>]) -> Vec<(usize, Rule)> {
        let mut rules = Vec::new();
        for endpoint in endpoints {
            let Some(backend) = endpoint.url() else {
                continue;
            };
            let backend = backend.trim_end_matches('/');
            if let Err(e) = Url::parse(backend) {
                warn!(endpoint = %endpoint.routing_key(), url = %backend, error = %e, "Skipping rewrite rule for unparsable backend address");
                continue;
            }
            let Some((_, bare)) = backend.split_once("://") else {
                continue;
            };

            let full = Regex::new(&format!("{}{}", regex::escape(backend), TRAILING_BOUNDARY));
            let bare_pattern = Regex::new(&format!(
                "{}{}{}",
                LEADING_BOUNDARY,
                regex::escape(bare),
                TRAILING_BOUNDARY
            ));
            let (Ok(full), Ok(bare_pattern)) = (full, bare_pattern) else {
                warn!(endpoint = %endpoint.routing_key(), "Cannot build rewrite pattern");
                continue;
            };

            let path = self.public_path(&endpoint.routing_key());
            rules.push((
                backend.len(),
                Rule {
                    full,
                    bare: bare_pattern,
                    public_url: format!("{}{}", self.gateway_base, path),
                    public_bare: format!("{}{}", self.gateway_without_scheme(), path),
                },
            ));
        }
        rules
    }

    fn rewrite_legacy_entities(&self, text: &str, endpoints: &[Arc<EndpointDefinition>]) -> String {
        LEGACY_ENTITY_URL
            .replace_all(text, |caps: &Captures| {
                let name = &caps["name"];
                let routing_key = endpoints
                    .iter()
                    .find(|e| {
                        e.name.eq_ignore_ascii_case(name)
                            || e.url()
                                .and_then(last_path_segment)
                                .is_some_and(|s| s.eq_ignore_ascii_case(name))
                    })
                    .map(|e| e.routing_key())
                    .unwrap_or_else(|| {
                        debug!(name = %name, "No participating endpoint for legacy entity URL");
                        name.to_string()
                    });
                format!(
                    "{}{}({})",
                    self.gateway_base,
                    self.public_path(&routing_key),
                    &caps["id"]
                )
            })
            .into_owned()
    }
}

fn last_path_segment(url: &str) -> Option<&str> {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
}
