use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{any, get, post},
};
use portico_registry::EndpointRegistry;
use portico_workflow::{ReqwestTransport, StaticEnvironments, StepExecutor, WorkflowEngine};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::gateway::{QueryExecutor, composite, handler, query};
use crate::watch::{DEFAULT_DEBOUNCE, DefinitionWatcher};
use crate::{config::AppConfig, handlers, middleware as app_middleware};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub registry: Arc<EndpointRegistry>,
    pub engine: WorkflowEngine,
    /// Pooled client used for forwarded requests.
    pub http_client: reqwest::Client,
    /// Serves relational and webhook endpoints when present.
    pub query_executor: Option<Arc<dyn QueryExecutor>>,
}

impl AppState {
    /// Wires the registry, environment table and outbound transport from
    /// configuration.
    pub fn from_config(cfg: &AppConfig) -> anyhow::Result<Self> {
        let registry = Arc::new(EndpointRegistry::new(cfg.gateway.definitions_dir.clone()));
        let transport = ReqwestTransport::new(cfg.request_timeout())?;
        let http_client = transport.client().clone();

        let environments = cfg.environments.iter().fold(
            StaticEnvironments::new(cfg.gateway.allowed_environments.clone()),
            |envs, (name, env)| {
                envs.with_headers(name, env.headers.iter().map(|(k, v)| (k.clone(), v.clone())))
            },
        );
        let executor = StepExecutor::new(
            Arc::new(transport),
            Arc::new(environments),
            cfg.server.name.clone(),
        );

        Ok(Self {
            config: Arc::new(cfg.clone()),
            engine: WorkflowEngine::new(registry.clone(), executor),
            registry,
            http_client,
            query_executor: None,
        })
    }

    pub fn with_query_executor(mut self, executor: Arc<dyn QueryExecutor>) -> Self {
        self.query_executor = Some(executor);
        self
    }
}

pub struct PorticoServer {
    addr: SocketAddr,
    app: Router,
    state: AppState,
}

pub fn build_app(state: AppState) -> Router {
    let body_limit = state.config.server.body_limit_bytes;
    Router::new()
        // Health and info endpoints
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        .route("/docs/endpoints", get(handlers::endpoint_catalog))
        // Administration
        .route("/admin/reload", post(handlers::reload_all))
        .route("/admin/reload/{group}", post(handlers::reload_group))
        // Gateway
        .route(
            "/api/{env}/composite/{*name}",
            post(composite::handle_composite),
        )
        .route("/api/{env}/webhook/{id}", post(query::handle_webhook))
        .route("/api/{env}/{*path}", any(handler::handle_api))
        .with_state(state)
        // Middleware stack (order: request id -> compression/cors/trace -> body limit)
        .layer(middleware::from_fn(app_middleware::request_id))
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    let req_id = req
                        .headers()
                        .get(app_middleware::REQUEST_ID_HEADER)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        http.status_code = Empty,
                        request_id = %req_id
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
    query_executor: Option<Arc<dyn QueryExecutor>>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
            query_executor: None,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    pub fn with_query_executor(mut self, executor: Arc<dyn QueryExecutor>) -> Self {
        self.query_executor = Some(executor);
        self
    }

    pub fn build(self) -> anyhow::Result<PorticoServer> {
        let mut state = AppState::from_config(&self.config)?;
        if let Some(executor) = self.query_executor {
            state = state.with_query_executor(executor);
        }
        let app = build_app(state.clone());

        Ok(PorticoServer {
            addr: self.addr,
            app,
            state,
        })
    }
}

impl PorticoServer {
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Loads every definition group, starts the watcher when enabled and
    /// serves until Ctrl+C.
    pub async fn run(self) -> anyhow::Result<()> {
        let maps = self.state.registry.get_all().await;
        let total: usize = maps.iter().map(|(_, map)| map.len()).sum();
        tracing::info!(
            root = %self.state.registry.root().display(),
            definitions = total,
            "Endpoint definitions loaded"
        );
        self.state.registry.audit().await;

        let watcher = self
            .state
            .config
            .gateway
            .watch
            .then(|| DefinitionWatcher::start(self.state.registry.clone(), DEFAULT_DEBOUNCE));

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        if let Some(watcher) = watcher {
            watcher.stop().await;
        }
        Ok(())
    }
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
