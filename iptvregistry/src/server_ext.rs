//! Mounting of the device API on an `iptvserver::Server`
//!
//! ```rust,no_run
//! use iptvregistry::{MemoryStore, Registry, RegistryServerExt};
//! use iptvserver::ServerBuilder;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let mut server = ServerBuilder::new("IPTVRegistry", "localhost", 3000).build();
//! let registry = Arc::new(Registry::new(Arc::new(MemoryStore::new())));
//! server.init_device_api(registry).await;
//! server.start().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use iptvserver::Server;
use tracing::info;
use utoipa::OpenApi;

use crate::api::create_router;
use crate::openapi::DevicesApiDoc;
use crate::registry::Registry;

#[async_trait]
pub trait RegistryServerExt {
    /// Registers the device API
    ///
    /// # Routes
    ///
    /// - `GET|POST /api/devices`
    /// - `GET|DELETE /api/devices/{mac}`
    /// - `GET /swagger-ui/devices` - interactive documentation
    /// - `GET /api-docs/devices.json` - OpenAPI document
    async fn init_device_api(&mut self, registry: Arc<Registry>);

    /// Opens the store described by the configuration and registers the API
    #[cfg(feature = "config")]
    async fn init_device_api_configured(
        &mut self,
        config: &iptvconfig::Config,
    ) -> anyhow::Result<Arc<Registry>>;
}

#[async_trait]
impl RegistryServerExt for Server {
    async fn init_device_api(&mut self, registry: Arc<Registry>) {
        self.add_openapi(create_router(registry), DevicesApiDoc::openapi(), "devices")
            .await;
        info!("Device API registered at /api/devices");
    }

    #[cfg(feature = "config")]
    async fn init_device_api_configured(
        &mut self,
        config: &iptvconfig::Config,
    ) -> anyhow::Result<Arc<Registry>> {
        use crate::config_ext::RegistryConfigExt;

        let registry = Arc::new(config.create_registry()?);
        self.init_device_api(registry.clone()).await;
        Ok(registry)
    }
}
