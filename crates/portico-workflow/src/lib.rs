//! Composite workflow execution.
//!
//! A composite workflow is an ordered list of backend calls served to the
//! client as one request. Steps run sequentially; each step's payload is
//! derived from the request or an earlier step's output and stamped with
//! template values, and the aggregate result has backend URLs rewritten to
//! the gateway's public URLs.

pub mod context;
pub mod engine;
pub mod environment;
pub mod error;
pub mod executor;
pub mod result;
pub mod rewrite;
pub mod template;
pub mod transport;

pub use context::ExecutionContext;
pub use engine::{RunOptions, WorkflowEngine};
pub use environment::{EnvironmentProvider, StaticEnvironments};
pub use error::{StepError, TransportError, WorkflowError};
pub use executor::StepExecutor;
pub use result::{CompositeResult, StepOutput, StepResults};
pub use rewrite::UrlRewriter;
pub use template::{Template, apply_templates};
pub use transport::{
    DATABASE_NAME_HEADER, OutboundRequest, OutboundResponse, ReqwestTransport,
    SERVER_NAME_HEADER, StepTransport,
};
