pub mod config;
pub mod gateway;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod server;
pub mod watch;

pub use config::{AppConfig, EnvironmentConfig, GatewayConfig, LoggingConfig, ServerConfig};
pub use gateway::{GatewayError, QueryExecutor, QueryRows};
pub use observability::{apply_logging_level, init_tracing};
pub use server::{AppState, PorticoServer, ServerBuilder, build_app};
pub use watch::DefinitionWatcher;
