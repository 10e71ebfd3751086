//! Extension of `iptvconfig::Config` with the device store settings
//!
//! ```yaml
//! registry:
//!   store:
//!     backend: sqlite      # or "memory"
//!     path: devices.db     # relative to the configuration directory
//!     timeout_ms: 5000
//! ```

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use iptvconfig::Config;
use serde_yaml::{Number, Value};
use tracing::info;

use crate::registry::{Registry, DEFAULT_STORE_TIMEOUT};
use crate::store::{DeviceStore, MemoryStore, SqliteStore};

const DEFAULT_STORE_PATH: &str = "devices.db";

/// Store implementations selectable from the configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Sqlite,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(StoreBackend::Sqlite),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(anyhow!("unknown store backend {other:?} (expected sqlite or memory)")),
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreBackend::Sqlite => f.write_str("sqlite"),
            StoreBackend::Memory => f.write_str("memory"),
        }
    }
}

pub trait RegistryConfigExt {
    /// Backend from `registry.store.backend`, SQLite when unset
    fn get_store_backend(&self) -> Result<StoreBackend>;

    /// Absolute path of the SQLite file, parent directory created if needed
    fn get_store_path(&self) -> Result<PathBuf>;

    fn set_store_path(&self, path: &str) -> Result<()>;

    /// Bound applied to each store call
    fn get_store_timeout(&self) -> Duration;

    fn set_store_timeout(&self, timeout: Duration) -> Result<()>;

    /// Opens the configured store
    fn open_store(&self) -> Result<Arc<dyn DeviceStore>>;

    /// Opens the store and wraps it in a [`Registry`] with the configured timeout
    fn create_registry(&self) -> Result<Registry>;
}

impl RegistryConfigExt for Config {
    fn get_store_backend(&self) -> Result<StoreBackend> {
        self.get_string_or(&["registry", "store", "backend"], "sqlite")
            .parse()
    }

    fn get_store_path(&self) -> Result<PathBuf> {
        let path = self.get_string_or(&["registry", "store", "path"], DEFAULT_STORE_PATH);
        self.resolve_data_path(&path)
    }

    fn set_store_path(&self, path: &str) -> Result<()> {
        self.set_value(
            &["registry", "store", "path"],
            Value::String(path.to_string()),
        )
    }

    fn get_store_timeout(&self) -> Duration {
        let default = DEFAULT_STORE_TIMEOUT.as_millis() as u64;
        match self.get_u64_or(&["registry", "store", "timeout_ms"], default) {
            0 => DEFAULT_STORE_TIMEOUT,
            ms => Duration::from_millis(ms),
        }
    }

    fn set_store_timeout(&self, timeout: Duration) -> Result<()> {
        let ms = u64::try_from(timeout.as_millis())?;
        self.set_value(
            &["registry", "store", "timeout_ms"],
            Value::Number(Number::from(ms)),
        )
    }

    fn open_store(&self) -> Result<Arc<dyn DeviceStore>> {
        match self.get_store_backend()? {
            StoreBackend::Memory => {
                info!("Using in-memory device store, records are lost on exit");
                Ok(Arc::new(MemoryStore::new()))
            }
            StoreBackend::Sqlite => {
                let path = self.get_store_path()?;
                Ok(Arc::new(SqliteStore::open(&path)?))
            }
        }
    }

    fn create_registry(&self) -> Result<Registry> {
        Ok(Registry::new(self.open_store()?).with_timeout(self.get_store_timeout()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(vars: &[(&str, &str)]) -> (TempDir, Config) {
        let dir = TempDir::new().unwrap();
        let vars = vars.iter().map(|(k, v)| (k.to_string(), v.to_string()));
        let config =
            Config::load_config_with_overrides(dir.path().to_str().unwrap(), vars).unwrap();
        (dir, config)
    }

    #[test]
    fn test_defaults() {
        let (dir, config) = config(&[]);
        assert_eq!(config.get_store_backend().unwrap(), StoreBackend::Sqlite);
        assert_eq!(config.get_store_timeout(), Duration::from_millis(5000));
        assert_eq!(config.get_store_path().unwrap(), dir.path().join("devices.db"));
    }

    #[test]
    fn test_env_selects_memory_backend() {
        let (_dir, config) = config(&[
            ("IPTV_REGISTRY_CONFIG__REGISTRY__STORE__BACKEND", "Memory"),
            ("IPTV_REGISTRY_CONFIG__REGISTRY__STORE__TIMEOUT_MS", "250"),
        ]);
        assert_eq!(config.get_store_backend().unwrap(), StoreBackend::Memory);
        assert_eq!(config.get_store_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_unknown_backend_is_an_error() {
        let (_dir, config) = config(&[("IPTV_REGISTRY_CONFIG__REGISTRY__STORE__BACKEND", "mongo")]);
        assert!(config.get_store_backend().is_err());
        assert!(config.open_store().is_err());
    }

    #[test]
    fn test_open_sqlite_store_creates_file() {
        let (dir, config) = config(&[]);
        config.set_store_path("data/devices.db").unwrap();
        let _store = config.open_store().unwrap();
        assert!(dir.path().join("data/devices.db").exists());
    }

    #[test]
    fn test_set_store_timeout() {
        let (_dir, config) = config(&[]);
        config.set_store_timeout(Duration::from_millis(1200)).unwrap();
        assert_eq!(config.get_store_timeout(), Duration::from_millis(1200));
    }
}
