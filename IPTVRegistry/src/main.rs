use anyhow::{Context, Result};
use iptvapp::{WebAppExt, Webapp};
use iptvconfig::Config;
use iptvregistry::RegistryServerExt;
use iptvserver::{LoggingOptions, ServerBuilder};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // ========== Configuration ==========
    let config = Config::load_config("").context("cannot load configuration")?;

    let mut server = ServerBuilder::from_config("IPTVRegistry", &config).build();
    server
        .init_logging(LoggingOptions::from_config(&config))
        .await?;
    info!(config_dir = config.get_config_dir(), "Configuration loaded");

    // ========== Routes ==========
    let info = server.info();
    server
        .add_route("/info", move || {
            let info = info.clone();
            async move {
                serde_json::json!({
                    "name": info.name,
                    "version": info.version,
                })
            }
        })
        .await;

    info!("Opening device store...");
    let registry = server
        .init_device_api_configured(&config)
        .await
        .context("cannot open device store")?;

    info!("Registering web application...");
    server.add_webapp_with_redirect::<Webapp>("/app").await;

    // ========== Run ==========
    server.start().await?;
    info!("IPTVRegistry is ready, press Ctrl+C to stop");
    server.wait().await;

    if let Err(e) = registry.close().await {
        error!("Cannot close device store: {}", e);
    }
    info!("IPTVRegistry stopped");
    Ok(())
}
