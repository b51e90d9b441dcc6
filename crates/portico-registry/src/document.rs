//! On-disk definition documents.
//!
//! Every `entity.json` is one [`DefinitionDocument`], discriminated by its
//! `"Type"` field. Documents written before the field existed carry no
//! discriminator and are read as the [`DefinitionDocument::Legacy`] variant,
//! whose meaning depends on the group directory it was found in.

use std::collections::{BTreeSet, HashSet};
use std::path::{Component, Path, PathBuf};

use portico_core::HttpMethod;
use serde::Deserialize;
use serde_json::Value;

use crate::columns::ColumnMap;
use crate::definition::{
    EndpointDefinition, EndpointTarget, FunctionParameter, KindDetails, RelationalObjectType,
};
use crate::error::DefinitionError;
use crate::kind::{EndpointGroup, EndpointKind};
use crate::namespace::QualifiedName;
use crate::workflow::CompositeWorkflow;

const TYPE_FIELD: &str = "Type";
const LEGACY_TYPE: &str = "Legacy";
const DEFAULT_SCHEMA: &str = "dbo";

/// Fields shared by every current-format document.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CommonFields {
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub namespace_display_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub allowed_environments: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RelationalDocument {
    #[serde(default)]
    pub database_object_name: String,
    #[serde(default)]
    pub database_schema: Option<String>,
    #[serde(default)]
    pub database_object_type: RelationalObjectType,
    #[serde(default)]
    pub primary_key: Option<String>,
    #[serde(default)]
    pub allowed_columns: Vec<String>,
    #[serde(default)]
    pub allowed_methods: Vec<String>,
    #[serde(default)]
    pub function_parameters: Vec<FunctionParameter>,
    #[serde(flatten)]
    pub common: CommonFields,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ForwardingDocument {
    #[serde(default)]
    pub url: String,
    #[serde(default, alias = "AllowedMethods")]
    pub methods: Vec<String>,
    #[serde(flatten)]
    pub common: CommonFields,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CompositeDocument {
    /// Inbound methods; composite invocation is always POST.
    #[serde(default, alias = "AllowedMethods")]
    pub methods: Vec<String>,
    #[serde(alias = "Workflow")]
    pub composite_config: Option<CompositeWorkflow>,
    #[serde(flatten)]
    pub common: CommonFields,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WebhookDocument {
    #[serde(default)]
    pub database_object_name: String,
    #[serde(default)]
    pub database_schema: Option<String>,
    /// Webhook ids accepted by the endpoint.
    #[serde(default)]
    pub allowed_columns: Vec<String>,
    #[serde(flatten)]
    pub common: CommonFields,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FileDocument {
    #[serde(default = "default_storage_type")]
    pub storage_type: String,
    #[serde(default)]
    pub base_directory: String,
    #[serde(default)]
    pub allowed_extensions: Vec<String>,
    #[serde(default)]
    pub max_file_size_bytes: Option<u64>,
    #[serde(default)]
    pub allowed_methods: Vec<String>,
    #[serde(flatten)]
    pub common: CommonFields,
}

fn default_storage_type() -> String {
    "Local".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StaticDocument {
    #[serde(default)]
    pub content_file: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    #[serde(flatten)]
    pub common: CommonFields,
}

fn default_content_type() -> String {
    "application/json".to_string()
}

/// Minimal pre-namespace format: an address or object name plus methods.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LegacyDocument {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub database_object_name: Option<String>,
    #[serde(default)]
    pub database_schema: Option<String>,
    #[serde(default)]
    pub primary_key: Option<String>,
    #[serde(default, alias = "AllowedMethods")]
    pub methods: Vec<String>,
    #[serde(default)]
    pub allowed_columns: Vec<String>,
    #[serde(default)]
    pub is_private: bool,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "Type")]
pub enum DefinitionDocument {
    #[serde(rename = "SQL", alias = "Sql")]
    Relational(RelationalDocument),
    Standard(ForwardingDocument),
    Private(ForwardingDocument),
    Composite(CompositeDocument),
    Webhook(WebhookDocument),
    File(FileDocument),
    Static(StaticDocument),
    Legacy(LegacyDocument),
}

/// Reads the discriminator without deserializing the whole document.
pub fn type_tag(value: &Value) -> &str {
    value
        .get(TYPE_FIELD)
        .and_then(Value::as_str)
        .unwrap_or(LEGACY_TYPE)
}

/// Group a document belongs to, given its discriminator and the directory
/// (below the definitions root) it was found in.
pub fn document_group(tag: &str, directory: &str) -> Result<EndpointGroup, DefinitionError> {
    let group = match (tag, directory) {
        ("SQL" | "Sql", "SQL") | ("Legacy", "SQL") => EndpointGroup::Sql,
        ("Standard" | "Private", "Proxy") | ("Legacy", "Proxy") => EndpointGroup::Proxy,
        ("Composite", "Proxy" | "Composite") => EndpointGroup::Composite,
        ("Webhook", "Webhooks") | ("Legacy", "Webhooks") => EndpointGroup::Webhook,
        ("File", "Files") => EndpointGroup::File,
        ("Static", "Static") => EndpointGroup::Static,
        _ => {
            return Err(DefinitionError::KindMismatch {
                found: tag.to_string(),
                group: EndpointGroup::for_directory(directory).unwrap_or(EndpointGroup::Static),
            });
        }
    };
    Ok(group)
}

impl DefinitionDocument {
    pub fn from_value(mut value: Value) -> Result<Self, DefinitionError> {
        if let Value::Object(map) = &mut value {
            if !map.contains_key(TYPE_FIELD) {
                map.insert(TYPE_FIELD.to_string(), Value::from(LEGACY_TYPE));
            }
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Builds the registry definition, validating the document on the way.
    ///
    /// `location` carries the namespace and name inferred from the file's
    /// directory; `group` is the group the document was resolved to.
    pub fn into_definition(
        self,
        group: EndpointGroup,
        location: QualifiedName,
        source: PathBuf,
    ) -> Result<EndpointDefinition, DefinitionError> {
        match self {
            DefinitionDocument::Relational(doc) => relational(doc, location, source),
            DefinitionDocument::Standard(doc) => {
                forwarding(doc, EndpointKind::Standard, location, source)
            }
            DefinitionDocument::Private(doc) => {
                forwarding(doc, EndpointKind::Private, location, source)
            }
            DefinitionDocument::Composite(doc) => composite(doc, location, source),
            DefinitionDocument::Webhook(doc) => webhook(doc, location, source),
            DefinitionDocument::File(doc) => file(doc, location, source),
            DefinitionDocument::Static(doc) => static_content(doc, location, source),
            DefinitionDocument::Legacy(doc) => legacy(doc, group, location, source),
        }
    }
}

fn parse_methods(tokens: &[String]) -> Result<BTreeSet<HttpMethod>, DefinitionError> {
    tokens
        .iter()
        .map(|token| {
            token
                .parse::<HttpMethod>()
                .map_err(|_| DefinitionError::UnsupportedMethod(token.clone()))
        })
        .collect()
}

fn required_methods(
    tokens: &[String],
    field: &'static str,
) -> Result<BTreeSet<HttpMethod>, DefinitionError> {
    let methods = parse_methods(tokens)?;
    if methods.is_empty() {
        return Err(DefinitionError::MissingField(field));
    }
    Ok(methods)
}

fn required_text(value: &str, field: &'static str) -> Result<String, DefinitionError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DefinitionError::MissingField(field));
    }
    Ok(trimmed.to_string())
}

fn schema_or_default(schema: Option<String>) -> String {
    schema
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_SCHEMA.to_string())
}

fn validate_function_parameters(params: &[FunctionParameter]) -> Result<(), DefinitionError> {
    let mut positions = HashSet::new();
    let mut names = HashSet::new();
    for param in params {
        let name = param.name.trim();
        if name.is_empty() {
            return Err(DefinitionError::InvalidParameter(
                "parameter name must not be empty".into(),
            ));
        }
        if !names.insert(name.to_ascii_lowercase()) {
            return Err(DefinitionError::InvalidParameter(format!(
                "duplicate parameter name '{name}'"
            )));
        }
        let Some(position) = param.position else {
            return Err(DefinitionError::InvalidParameter(format!(
                "parameter '{name}' has no position"
            )));
        };
        if !positions.insert(position) {
            return Err(DefinitionError::InvalidParameter(format!(
                "duplicate parameter position {position}"
            )));
        }
    }
    Ok(())
}

fn finish(
    mut definition: EndpointDefinition,
    common: CommonFields,
) -> EndpointDefinition {
    definition.is_private |= common.is_private;
    definition.allowed_environments = common.allowed_environments;
    definition.display_name = common.display_name;
    definition.namespace_display_name = common.namespace_display_name;
    definition.description = common.description;
    definition
}

fn relational(
    doc: RelationalDocument,
    location: QualifiedName,
    source: PathBuf,
) -> Result<EndpointDefinition, DefinitionError> {
    let object = required_text(&doc.database_object_name, "DatabaseObjectName")?;
    let methods = required_methods(&doc.allowed_methods, "AllowedMethods")?;
    ColumnMap::parse(&doc.allowed_columns)?;
    if doc.database_object_type == RelationalObjectType::TableValuedFunction {
        validate_function_parameters(&doc.function_parameters)?;
    }
    let location = location.with_explicit(doc.common.namespace.as_deref())?;

    let definition = EndpointDefinition::new(
        location.name,
        location.namespace,
        EndpointKind::RelationalObject,
        EndpointTarget::DatabaseObject {
            schema: schema_or_default(doc.database_schema),
            name: object,
        },
        methods,
        KindDetails::Relational {
            object_type: doc.database_object_type,
            primary_key: doc.primary_key,
            allowed_columns: doc.allowed_columns,
            parameters: doc.function_parameters,
        },
        None,
        source,
    );
    Ok(finish(definition, doc.common))
}

fn forwarding(
    doc: ForwardingDocument,
    kind: EndpointKind,
    location: QualifiedName,
    source: PathBuf,
) -> Result<EndpointDefinition, DefinitionError> {
    let url = required_text(&doc.url, "Url")?;
    let methods = required_methods(&doc.methods, "Methods")?;
    let location = location.with_explicit(doc.common.namespace.as_deref())?;

    let definition = EndpointDefinition::new(
        location.name,
        location.namespace,
        kind,
        EndpointTarget::Url { url },
        methods,
        KindDetails::Forwarding,
        None,
        source,
    );
    Ok(finish(definition, doc.common))
}

fn composite(
    doc: CompositeDocument,
    location: QualifiedName,
    source: PathBuf,
) -> Result<EndpointDefinition, DefinitionError> {
    let mut workflow = doc
        .composite_config
        .ok_or(DefinitionError::MissingField("CompositeConfig"))?;
    workflow.validate()?;
    let mut methods = parse_methods(&doc.methods)?;
    methods.insert(HttpMethod::Post);
    let location = location.with_explicit(doc.common.namespace.as_deref())?;
    if workflow.name.trim().is_empty() {
        workflow.name = location.name.clone();
    }

    let definition = EndpointDefinition::new(
        location.name,
        location.namespace,
        EndpointKind::CompositeWorkflow,
        EndpointTarget::None,
        methods,
        KindDetails::Composite,
        Some(workflow),
        source,
    );
    Ok(finish(definition, doc.common))
}

fn webhook(
    doc: WebhookDocument,
    location: QualifiedName,
    source: PathBuf,
) -> Result<EndpointDefinition, DefinitionError> {
    let object = required_text(&doc.database_object_name, "DatabaseObjectName")?;
    if doc.allowed_columns.iter().all(|id| id.trim().is_empty()) {
        return Err(DefinitionError::MissingField("AllowedColumns"));
    }
    let location = location.with_explicit(doc.common.namespace.as_deref())?;

    let definition = EndpointDefinition::new(
        location.name,
        location.namespace,
        EndpointKind::Webhook,
        EndpointTarget::DatabaseObject {
            schema: schema_or_default(doc.database_schema),
            name: object,
        },
        BTreeSet::from([HttpMethod::Post]),
        KindDetails::Webhook {
            allowed_ids: doc.allowed_columns,
        },
        None,
        source,
    );
    Ok(finish(definition, doc.common))
}

fn file(
    doc: FileDocument,
    location: QualifiedName,
    source: PathBuf,
) -> Result<EndpointDefinition, DefinitionError> {
    let base_directory = required_text(&doc.base_directory, "BaseDirectory")?;
    let mut methods = parse_methods(&doc.allowed_methods)?;
    if methods.is_empty() {
        methods = BTreeSet::from([HttpMethod::Get, HttpMethod::Post, HttpMethod::Delete]);
    }
    let location = location.with_explicit(doc.common.namespace.as_deref())?;

    let definition = EndpointDefinition::new(
        location.name,
        location.namespace,
        EndpointKind::File,
        EndpointTarget::None,
        methods,
        KindDetails::File {
            storage_type: doc.storage_type,
            base_directory,
            allowed_extensions: doc.allowed_extensions,
            max_file_size_bytes: doc.max_file_size_bytes,
        },
        None,
        source,
    );
    Ok(finish(definition, doc.common))
}

fn static_content(
    doc: StaticDocument,
    location: QualifiedName,
    source: PathBuf,
) -> Result<EndpointDefinition, DefinitionError> {
    let content_file = required_text(&doc.content_file, "ContentFile")?;
    if !Path::new(&content_file)
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
    {
        return Err(DefinitionError::InvalidContentFile(content_file.to_string()));
    }
    let location = location.with_explicit(doc.common.namespace.as_deref())?;
    let content_file = source
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(content_file);

    let definition = EndpointDefinition::new(
        location.name,
        location.namespace,
        EndpointKind::Static,
        EndpointTarget::None,
        BTreeSet::from([HttpMethod::Get]),
        KindDetails::Static {
            content_type: doc.content_type,
            content_file,
        },
        None,
        source,
    );
    Ok(finish(definition, doc.common))
}

fn legacy(
    doc: LegacyDocument,
    group: EndpointGroup,
    location: QualifiedName,
    source: PathBuf,
) -> Result<EndpointDefinition, DefinitionError> {
    let common = CommonFields {
        is_private: doc.is_private,
        ..CommonFields::default()
    };
    match group {
        EndpointGroup::Sql => relational(
            RelationalDocument {
                database_object_name: doc.database_object_name.unwrap_or_default(),
                database_schema: doc.database_schema,
                database_object_type: RelationalObjectType::Table,
                primary_key: doc.primary_key,
                allowed_columns: doc.allowed_columns,
                allowed_methods: doc.methods,
                function_parameters: Vec::new(),
                common,
            },
            location,
            source,
        ),
        EndpointGroup::Proxy => forwarding(
            ForwardingDocument {
                url: doc.url.unwrap_or_default(),
                methods: doc.methods,
                common,
            },
            EndpointKind::Forwarding,
            location,
            source,
        ),
        EndpointGroup::Webhook => webhook(
            WebhookDocument {
                database_object_name: doc.database_object_name.unwrap_or_default(),
                database_schema: doc.database_schema,
                allowed_columns: doc.allowed_columns,
                common,
            },
            location,
            source,
        ),
        other => Err(DefinitionError::KindMismatch {
            found: LEGACY_TYPE.to_string(),
            group: other,
        }),
    }
}
