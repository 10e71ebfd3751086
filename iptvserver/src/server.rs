//! # Server module - high level API on top of Axum
//!
//! Routes are accumulated in a shared [`Router`] and the whole tree is handed
//! to `axum::serve` when [`Server::start`] is called. Routes added after
//! `start()` are not served.

use crate::logs::{LogsApiDoc, LoggingOptions, create_logs_router, init_logging, log_dump, log_sse};
use axum::handler::Handler;
use axum::response::Redirect;
use axum::routing::get;
use axum::{Json, Router};
use axum_embed::ServeEmbed;
use iptvconfig::Config;
use rust_embed::RustEmbed;
use serde::Serialize;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::{net::TcpListener, signal, sync::RwLock, task::JoinHandle};
use tracing::{error, info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::logs::LogState;

/// Errors raised while setting up or starting the server
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The listening socket could not be bound
    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The global tracing subscriber could not be installed
    #[error("cannot initialize logging: {0}")]
    Logging(String),
}

/// Serializable server information
#[derive(Clone, Debug, Serialize, utoipa::ToSchema)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
    pub base_url: String,
    pub http_port: u16,
}

/// Main server
pub struct Server {
    name: String,
    base_url: String,
    http_port: u16,
    router: Arc<RwLock<Router>>,
    join_handle: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
    log_state: Option<LogState>,
}

impl Server {
    /// Creates a new server instance
    ///
    /// # Arguments
    ///
    /// * `name` - Server name (used in logs)
    /// * `base_url` - Host name advertised in logs (ex: "localhost")
    /// * `http_port` - HTTP port to listen on, `0` picks a free port
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, http_port: u16) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            http_port,
            router: Arc::new(RwLock::new(Router::new())),
            join_handle: None,
            local_addr: None,
            log_state: None,
        }
    }

    /// Adds a JSON route
    ///
    /// The closure is called on every GET request on `path` and its result
    /// is serialized as JSON.
    ///
    /// ```rust,no_run
    /// # use iptvserver::Server;
    /// # #[tokio::main]
    /// # async fn main() {
    /// # let mut server = Server::new("Test", "localhost", 3000);
    /// server.add_route("/api/status", || async {
    ///     serde_json::json!({ "status": "online" })
    /// }).await;
    /// # }
    /// ```
    pub async fn add_route<F, Fut, T>(&mut self, path: &str, f: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Serialize + Send + 'static,
    {
        let f = Arc::new(f);
        let handler = move || {
            let f = f.clone();
            async move { Json(f().await) }
        };

        self.mount(path, Router::new().route("/", get(handler))).await;
    }

    /// Adds a GET handler with state
    pub async fn add_handler_with_state<H, T, S>(&mut self, path: &str, handler: H, state: S)
    where
        H: Handler<T, S> + Clone + 'static,
        T: 'static,
        S: Clone + Send + Sync + 'static,
    {
        let route = Router::new().route("/", get(handler)).with_state(state);
        self.mount(path, route).await;
    }

    /// Adds a Single Page Application
    ///
    /// Every path below `path` that does not match an embedded file is
    /// answered with `index.html`.
    pub async fn add_spa<E>(&mut self, path: &str)
    where
        E: RustEmbed + Clone + Send + Sync + 'static,
    {
        let serve = ServeEmbed::<E>::with_parameters(
            Some("index.html".to_string()),
            axum_embed::FallbackBehavior::Ok,
            Some("index.html".to_string()),
        );

        let mut r = self.router.write().await;
        *r = if path == "/" {
            std::mem::take(&mut *r).fallback_service(serve)
        } else {
            std::mem::take(&mut *r).nest_service(path, serve)
        };
    }

    /// Adds a permanent (308) redirection from `from` to `to`
    pub async fn add_redirect(&mut self, from: &str, to: &str) {
        let target = to.to_string();
        let route = Router::new().route(
            "/",
            get(move || async move { Redirect::permanent(&target) }),
        );
        self.mount(from, route).await;
    }

    /// Adds an API documented with OpenAPI and Swagger UI
    ///
    /// The router is nested under `/api/{name}`, the Swagger UI is served at
    /// `/swagger-ui/{name}` and the JSON document at `/api-docs/{name}.json`.
    pub async fn add_openapi(
        &mut self,
        api_router: Router,
        openapi: utoipa::openapi::OpenApi,
        name: &str,
    ) {
        let swagger_path: &'static str =
            Box::leak(format!("/swagger-ui/{}", name).into_boxed_str());
        let openapi_json_path: &'static str =
            Box::leak(format!("/api-docs/{}.json", name).into_boxed_str());

        let swagger = SwaggerUi::new(swagger_path).url(openapi_json_path, openapi);

        let base_path = format!("/api/{}", name);
        let nested_router = Router::new().nest(&base_path, api_router);

        let mut r = self.router.write().await;
        *r = std::mem::take(&mut *r).merge(nested_router).merge(swagger);
    }

    async fn mount(&mut self, path: &str, route: Router) {
        let mut r = self.router.write().await;
        *r = if path == "/" {
            std::mem::take(&mut *r).merge(route)
        } else {
            std::mem::take(&mut *r).nest(path, route)
        };
    }

    /// Snapshot of the routes registered so far
    pub async fn router(&self) -> Router {
        self.router.read().await.clone()
    }

    /// Starts the HTTP server
    ///
    /// Binds the configured port, then serves in a background task until
    /// Ctrl+C is received. Use [`Server::wait`] to block until then.
    pub async fn start(&mut self) -> Result<(), ServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.http_port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener.local_addr().unwrap_or(addr);
        self.local_addr = Some(local_addr);

        info!(
            "Server {} running at http://{}:{}",
            self.name,
            self.base_url,
            local_addr.port()
        );

        let router = self.router.read().await.clone();
        self.join_handle = Some(tokio::spawn(async move {
            let shutdown = async {
                match signal::ctrl_c().await {
                    Ok(()) => info!("Ctrl+C received, graceful shutdown"),
                    Err(e) => {
                        warn!("Cannot listen for Ctrl+C: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            };

            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!("HTTP server error: {}", e);
            }
        }));

        Ok(())
    }

    /// Waits until the server stops
    pub async fn wait(&mut self) {
        if let Some(h) = self.join_handle.take() {
            let _ = h.await;
        }
    }

    /// Address actually bound by [`Server::start`]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Server information
    pub fn info(&self) -> ServerInfo {
        ServerInfo {
            name: self.name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            base_url: self.base_url.clone(),
            http_port: self.http_port,
        }
    }

    /// Log state installed by [`Server::init_logging`]
    pub fn log_state(&self) -> Option<&LogState> {
        self.log_state.as_ref()
    }

    /// Installs the tracing subscriber and registers the log routes
    ///
    /// Routes registered:
    /// - `GET /log-sse` - live log stream (Server-Sent Events)
    /// - `GET /log-dump` - buffered log entries as JSON
    /// - `GET|POST /api/logs/log_setup` - current log level / change it
    pub async fn init_logging(&mut self, options: LoggingOptions) -> Result<(), ServerError> {
        let log_state = init_logging(options)?;

        self.add_handler_with_state("/log-sse", log_sse, log_state.clone())
            .await;
        self.add_handler_with_state("/log-dump", log_dump, log_state.clone())
            .await;
        self.add_openapi(
            create_logs_router(log_state.clone()),
            LogsApiDoc::openapi(),
            "logs",
        )
        .await;

        self.log_state = Some(log_state);
        Ok(())
    }
}

/// Builder pattern
pub struct ServerBuilder {
    name: String,
    base_url: String,
    http_port: u16,
}

impl ServerBuilder {
    /// Creates a new builder
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, http_port: u16) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            http_port,
        }
    }

    /// Builder filled from the `host` section of the configuration
    pub fn from_config(name: impl Into<String>, config: &Config) -> Self {
        Self {
            name: name.into(),
            base_url: config.get_base_url(),
            http_port: config.get_http_port(),
        }
    }

    /// Builds the server
    pub fn build(self) -> Server {
        Server::new(self.name, self.base_url, self.http_port)
    }
}
