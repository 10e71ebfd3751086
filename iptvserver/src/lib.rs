//! # iptvserver - Axum web server for the device registry
//!
//! This crate wraps an Axum router behind a small, mutable [`Server`] object
//! so that the other crates can register their routes one after the other
//! before the server is started.
//!
//! ## Features
//!
//! - JSON routes with `add_route()`
//! - Stateful handlers with `add_handler_with_state()`
//! - Embedded single page applications with `add_spa()`
//! - Redirections with `add_redirect()`
//! - OpenAPI documented APIs with Swagger UI through `add_openapi()`
//! - Log buffer, SSE log stream and runtime log level control ([`logs`])
//! - Graceful shutdown on Ctrl+C
//!
//! ## Example
//!
//! ```rust,no_run
//! use iptvserver::{ServerBuilder, logs::LoggingOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), iptvserver::ServerError> {
//!     let mut server = ServerBuilder::new("Registry", "localhost", 3000).build();
//!     server.init_logging(LoggingOptions::default()).await?;
//!
//!     server.add_route("/info", || async {
//!         serde_json::json!({"status": "ok"})
//!     }).await;
//!
//!     server.start().await?;
//!     server.wait().await;
//!     Ok(())
//! }
//! ```

pub mod logs;
pub mod server;

pub use logs::{LogState, LoggingOptions, SseLayer, log_dump, log_sse};
pub use server::{Server, ServerBuilder, ServerError, ServerInfo};
