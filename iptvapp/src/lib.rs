//! # iptvapp - browser client of the IPTV registry
//!
//! A single page (`index.html`, `script.js`, `style.css`) embedded in the
//! binary with `rust-embed`. It lists the registered devices, saves a
//! MAC address / playlist pair and deletes devices, all through the relative
//! `/api/devices` routes, so it works behind any host name or port.
//!
//! ```rust,no_run
//! use iptvapp::{Webapp, WebAppExt};
//! use iptvserver::ServerBuilder;
//!
//! # async fn example() {
//! let mut server = ServerBuilder::new("IPTVRegistry", "localhost", 3000).build();
//! server.add_webapp_with_redirect::<Webapp>("/app").await;
//! # }
//! ```

use rust_embed::RustEmbed;

/// Files of the `webapp/` directory, embedded at compile time
#[derive(RustEmbed, Clone)]
#[folder = "webapp"]
pub struct Webapp;

/// Extension trait mounting an embedded web application on a server
///
/// `iptvserver` knows nothing about this crate; the implementation for
/// `iptvserver::Server` lives here behind the `server` feature.
#[cfg(feature = "server")]
#[async_trait::async_trait]
pub trait WebAppExt {
    /// Serves `W` under `path`, unknown sub-paths fall back to `index.html`
    async fn add_webapp<W>(&mut self, path: &str)
    where
        W: RustEmbed + Clone + Send + Sync + 'static;

    /// Same as [`WebAppExt::add_webapp`] plus a redirection from `/`
    async fn add_webapp_with_redirect<W>(&mut self, path: &str)
    where
        W: RustEmbed + Clone + Send + Sync + 'static;
}

#[cfg(feature = "server")]
mod server_impl;
