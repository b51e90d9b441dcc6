//! Resolved endpoint definitions as held by the registry.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::OnceLock;

use portico_core::HttpMethod;
use serde::{Deserialize, Serialize};

use crate::columns::ColumnMap;
use crate::kind::EndpointKind;
use crate::namespace::routing_key;
use crate::workflow::CompositeWorkflow;

/// Where a definition's traffic goes. Address and backing object are
/// mutually exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum EndpointTarget {
    /// Backend base address of a forwarding endpoint.
    Url { url: String },
    /// Table, view, function or webhook table behind the query executor.
    DatabaseObject { schema: String, name: String },
    /// Composite, file and static endpoints have no single backend.
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RelationalObjectType {
    #[default]
    Table,
    View,
    TableValuedFunction,
}

/// Positional parameter of a table-valued function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FunctionParameter {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub sql_type: Option<String>,

    #[serde(default)]
    pub position: Option<u32>,

    /// Where the value comes from (`Query` or `Path`).
    #[serde(default)]
    pub source: Option<String>,

    #[serde(default)]
    pub required: bool,

    #[serde(default)]
    pub default_value: Option<serde_json::Value>,
}

/// Kind-specific settings.
#[derive(Debug, Clone, PartialEq)]
pub enum KindDetails {
    Relational {
        object_type: RelationalObjectType,
        primary_key: Option<String>,
        allowed_columns: Vec<String>,
        parameters: Vec<FunctionParameter>,
    },
    Forwarding,
    Composite,
    Webhook {
        /// Webhook ids accepted by this endpoint.
        allowed_ids: Vec<String>,
    },
    File {
        storage_type: String,
        base_directory: String,
        allowed_extensions: Vec<String>,
        max_file_size_bytes: Option<u64>,
    },
    Static {
        content_type: String,
        content_file: PathBuf,
    },
}

/// One configured endpoint.
#[derive(Debug)]
pub struct EndpointDefinition {
    pub name: String,
    pub namespace: Option<String>,
    pub kind: EndpointKind,
    pub target: EndpointTarget,
    pub methods: BTreeSet<HttpMethod>,
    pub is_private: bool,
    /// Empty means every environment.
    pub allowed_environments: Vec<String>,
    pub display_name: Option<String>,
    pub namespace_display_name: Option<String>,
    pub description: Option<String>,
    /// Present exactly when `kind` is `CompositeWorkflow`.
    pub workflow: Option<CompositeWorkflow>,
    pub details: KindDetails,
    /// File the definition was loaded from.
    pub source: PathBuf,
    columns: OnceLock<ColumnMap>,
}

impl EndpointDefinition {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        name: String,
        namespace: Option<String>,
        kind: EndpointKind,
        target: EndpointTarget,
        methods: BTreeSet<HttpMethod>,
        details: KindDetails,
        workflow: Option<CompositeWorkflow>,
        source: PathBuf,
    ) -> Self {
        Self {
            name,
            namespace,
            is_private: kind == EndpointKind::Private,
            kind,
            target,
            methods,
            allowed_environments: Vec::new(),
            display_name: None,
            namespace_display_name: None,
            description: None,
            workflow,
            details,
            source,
            columns: OnceLock::new(),
        }
    }

    /// `"{namespace}/{name}"`, or just the name.
    pub fn routing_key(&self) -> String {
        routing_key(self.namespace.as_deref(), &self.name)
    }

    pub fn allows_method(&self, method: HttpMethod) -> bool {
        self.methods.contains(&method)
    }

    /// Case-insensitive; an empty list permits every environment.
    pub fn allows_environment(&self, environment: &str) -> bool {
        self.allowed_environments.is_empty()
            || self
                .allowed_environments
                .iter()
                .any(|e| e.eq_ignore_ascii_case(environment))
    }

    pub fn url(&self) -> Option<&str> {
        match &self.target {
            EndpointTarget::Url { url } => Some(url),
            _ => None,
        }
    }

    /// Alias maps from the column allow-list, built on first use.
    ///
    /// Entries were validated at load time, so a parse failure here cannot
    /// happen for registry-held definitions.
    pub fn columns(&self) -> &ColumnMap {
        self.columns.get_or_init(|| match &self.details {
            KindDetails::Relational {
                allowed_columns, ..
            } => ColumnMap::parse(allowed_columns).unwrap_or_default(),
            _ => ColumnMap::default(),
        })
    }
}
