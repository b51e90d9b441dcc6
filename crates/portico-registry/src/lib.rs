//! Endpoint definition registry.
//!
//! Parses endpoint definition files from a definitions root, resolves
//! namespaces into routing keys, keeps one immutable snapshot per endpoint
//! group and audits routing keys claimed by more than one group.

pub mod columns;
pub mod conflicts;
pub mod definition;
pub mod document;
pub mod error;
pub mod kind;
pub mod loader;
pub mod namespace;
pub mod registry;
pub mod workflow;

pub use columns::ColumnMap;
pub use conflicts::{RouteConflict, audit};
pub use definition::{
    EndpointDefinition, EndpointTarget, FunctionParameter, KindDetails, RelationalObjectType,
};
pub use error::DefinitionError;
pub use kind::{EndpointGroup, EndpointKind};
pub use loader::{DEFINITION_FILE, LoadReport, load_group};
pub use namespace::{QualifiedName, routing_key, validate_name, validate_namespace};
pub use registry::{EndpointMap, EndpointRegistry, ReloadReport, ResolvedEndpoint};
pub use workflow::{CompositeWorkflow, WorkflowStep};
