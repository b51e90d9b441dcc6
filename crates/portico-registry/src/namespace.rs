//! Namespace and name rules for routing keys.
//!
//! A definition's effective namespace is the one declared in its file, or the
//! one inferred from its directory depth below the group directory:
//!
//! ```text
//! SQL/Accounts/entity.json          -> key "Accounts"
//! SQL/CRM/Accounts/entity.json      -> key "CRM/Accounts"
//! SQL/CRM/Sales/Orders/entity.json  -> key "CRM/Sales/Orders"
//! ```

use crate::error::DefinitionError;

/// Namespaces that would shadow the gateway's own route prefixes.
const RESERVED_NAMESPACES: &[&str] = &[
    "api",
    "docs",
    "health",
    "healthz",
    "readyz",
    "admin",
    "composite",
    "webhook",
    "files",
];

const MAX_NAMESPACE_LEN: usize = 50;

/// Validates a namespace; nested namespaces are `/`-separated and every
/// segment must satisfy the rules on its own.
pub fn validate_namespace(namespace: &str) -> Result<(), DefinitionError> {
    if namespace.is_empty() {
        return Err(DefinitionError::invalid_namespace(namespace, "must not be empty"));
    }
    if namespace.len() > MAX_NAMESPACE_LEN {
        return Err(DefinitionError::invalid_namespace(
            namespace,
            format!("must be at most {MAX_NAMESPACE_LEN} characters"),
        ));
    }

    for segment in namespace.split('/') {
        let mut chars = segment.chars();
        match chars.next() {
            None => {
                return Err(DefinitionError::invalid_namespace(
                    namespace,
                    "contains an empty segment",
                ));
            }
            Some(first) if !first.is_ascii_alphabetic() => {
                return Err(DefinitionError::invalid_namespace(
                    namespace,
                    "must start with a letter",
                ));
            }
            Some(_) => {}
        }
        if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(DefinitionError::invalid_namespace(
                namespace,
                "may only contain letters, digits and underscores",
            ));
        }
        if RESERVED_NAMESPACES
            .iter()
            .any(|reserved| reserved.eq_ignore_ascii_case(segment))
        {
            return Err(DefinitionError::invalid_namespace(
                namespace,
                format!("'{segment}' is reserved"),
            ));
        }
    }

    Ok(())
}

/// Validates the final routing-key segment.
pub fn validate_name(name: &str) -> Result<(), DefinitionError> {
    if name.is_empty() {
        return Err(DefinitionError::invalid_name(name, "must not be empty"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(DefinitionError::invalid_name(
            name,
            "may only contain letters, digits, '_', '-' and '.'",
        ));
    }
    Ok(())
}

/// Name plus effective namespace of one definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedName {
    pub namespace: Option<String>,
    pub name: String,
}

impl QualifiedName {
    /// Infers namespace and name from the directories between the group
    /// directory and the definition file.
    pub fn infer(segments: &[String]) -> Result<Self, DefinitionError> {
        let Some((name, leading)) = segments.split_last() else {
            return Err(DefinitionError::invalid_name(
                "",
                "definition file must live in its own directory",
            ));
        };
        let namespace = (!leading.is_empty()).then(|| leading.join("/"));
        Ok(Self {
            namespace,
            name: name.clone(),
        })
    }

    /// Applies an explicitly declared namespace, which takes precedence over
    /// the inferred one, then validates the result.
    pub fn with_explicit(mut self, explicit: Option<&str>) -> Result<Self, DefinitionError> {
        if let Some(explicit) = explicit {
            self.namespace = Some(explicit.trim_matches('/').to_string());
        }
        validate_name(&self.name)?;
        if let Some(namespace) = &self.namespace {
            validate_namespace(namespace)?;
        }
        Ok(self)
    }

    pub fn routing_key(&self) -> String {
        routing_key(self.namespace.as_deref(), &self.name)
    }
}

/// `"{namespace}/{name}"` when a namespace is present, else `"{name}"`.
pub fn routing_key(namespace: Option<&str>, name: &str) -> String {
    match namespace {
        Some(ns) => format!("{ns}/{name}"),
        None => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segs(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_infer_without_namespace() {
        let q = QualifiedName::infer(&segs(&["Accounts"])).unwrap();
        assert_eq!(q.namespace, None);
        assert_eq!(q.routing_key(), "Accounts");
    }

    #[test]
    fn test_infer_with_namespace() {
        let q = QualifiedName::infer(&segs(&["CRM", "Accounts"])).unwrap();
        assert_eq!(q.namespace.as_deref(), Some("CRM"));
        assert_eq!(q.routing_key(), "CRM/Accounts");

        let nested = QualifiedName::infer(&segs(&["CRM", "Sales", "Orders"])).unwrap();
        assert_eq!(nested.routing_key(), "CRM/Sales/Orders");
    }

    #[test]
    fn test_infer_requires_a_directory() {
        assert!(QualifiedName::infer(&[]).is_err());
    }

    #[test]
    fn test_explicit_namespace_wins() {
        let q = QualifiedName::infer(&segs(&["CRM", "Accounts"]))
            .unwrap()
            .with_explicit(Some("Finance"))
            .unwrap();
        assert_eq!(q.routing_key(), "Finance/Accounts");
    }

    #[test]
    fn test_reserved_namespace_rejected() {
        let err = QualifiedName::infer(&segs(&["Accounts"]))
            .unwrap()
            .with_explicit(Some("api"))
            .unwrap_err();
        assert!(err.is_naming_problem());
        assert!(err.to_string().contains("reserved"));

        assert!(validate_namespace("Admin").is_err());
    }

    #[test]
    fn test_namespace_rules() {
        assert!(validate_namespace("CRM").is_ok());
        assert!(validate_namespace("crm_v2").is_ok());
        assert!(validate_namespace("CRM/Sales").is_ok());
        assert!(validate_namespace("").is_err());
        assert!(validate_namespace("2crm").is_err());
        assert!(validate_namespace("_crm").is_err());
        assert!(validate_namespace("crm-v2").is_err());
        assert!(validate_namespace("CRM//Sales").is_err());
        assert!(validate_namespace(&"a".repeat(51)).is_err());
        assert!(validate_namespace(&"a".repeat(50)).is_ok());
    }

    #[test]
    fn test_name_rules() {
        assert!(validate_name("Accounts").is_ok());
        assert!(validate_name("sales-order.v2").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("bad name").is_err());
    }
}
