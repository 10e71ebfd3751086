//! # IPTV Registry Configuration Module
//!
//! This module provides configuration management for the registry service:
//! - Loading configuration from YAML files
//! - Merging with embedded default configuration
//! - Environment variable overrides
//! - Type-safe getters and setters for configuration values
//!
//! A [`Config`] is loaded once at startup and passed by reference to the
//! crates that extend it.
//!
//! ## Usage
//!
//! ```no_run
//! use iptvconfig::Config;
//!
//! let config = Config::load_config("")?;
//!
//! let port = config.get_http_port();
//! let level = config.get_log_min_level()?;
//!
//! config.set_http_port(9000)?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{anyhow, Result};
use dirs::home_dir;
use serde_yaml::{Mapping, Number, Value};
use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};
use tracing::info;

// Embedded default configuration
const DEFAULT_CONFIG: &str = include_str!("iptvregistry.yaml");

const ENV_CONFIG_DIR: &str = "IPTV_REGISTRY_CONFIG";
const ENV_PREFIX: &str = "IPTV_REGISTRY_CONFIG__";
/// Port variable honoured by the historical deployment scripts.
const ENV_LEGACY_PORT: &str = "PORT";
const CONFIG_DIR_NAME: &str = ".iptvregistry";

// Default values for configuration
const DEFAULT_BASE_URL: &str = "localhost";
const DEFAULT_HTTP_PORT: u16 = 3000;
const DEFAULT_LOG_BUFFER_CAPACITY: usize = 1000;
const DEFAULT_LOG_MIN_LEVEL: &str = "INFO";
const DEFAULT_LOG_ENABLE_CONSOLE: bool = true;

/// Macro to generate getter/setter for usize values with default
macro_rules! impl_usize_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> Result<usize> {
            match self.get_value($path)? {
                Value::Number(n) => Ok(n.as_u64().map(|v| v as usize).unwrap_or($default)),
                _ => Ok($default),
            }
        }

        pub fn $setter(&self, size: usize) -> Result<()> {
            let n = Number::from(size);
            self.set_value($path, Value::Number(n))
        }
    };
}

/// Macro to generate getter/setter for bool values with default
macro_rules! impl_bool_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> Result<bool> {
            match self.get_value($path)? {
                Value::Bool(b) => Ok(b),
                _ => Ok($default),
            }
        }

        pub fn $setter(&self, value: bool) -> Result<()> {
            self.set_value($path, Value::Bool(value))
        }
    };
}

/// Configuration manager for the registry service
///
/// This structure manages the application configuration, including:
/// - Loading configuration from YAML files
/// - Merging with default configuration
/// - Handling environment variable overrides
/// - Providing typed getters/setters for configuration values
#[derive(Debug)]
pub struct Config {
    config_dir: String,
    path: String,
    data: Mutex<Value>,
}

impl Clone for Config {
    fn clone(&self) -> Self {
        let data = match self.data.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        Self {
            config_dir: self.config_dir.clone(),
            path: self.path.clone(),
            data: Mutex::new(data),
        }
    }
}

impl Config {
    /// Finds a config directory by trying different locations in order
    fn find_config_dir(directory: &str) -> String {
        // 1. Try provided directory
        if !directory.is_empty() {
            return directory.to_string();
        }

        // 2. Try environment variable
        if let Ok(env_path) = env::var(ENV_CONFIG_DIR) {
            info!(env_var=ENV_CONFIG_DIR, path=%env_path, "Trying to load config from env");
            return env_path;
        }

        // 3. Try current directory
        if Path::new(CONFIG_DIR_NAME).exists() {
            return CONFIG_DIR_NAME.to_string();
        }

        // 4. Try home directory
        if let Some(home) = home_dir() {
            let home_config = home.join(CONFIG_DIR_NAME);
            if home_config.exists() {
                return home_config.to_string_lossy().to_string();
            }
        }

        CONFIG_DIR_NAME.to_string()
    }

    /// Validates and prepares a config directory
    fn validate_config_dir(path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }

        if !path.is_dir() {
            return Err(anyhow!("{} is not a directory", path.display()));
        }

        // Write permission
        let test_file = path.join(".write_test");
        fs::write(&test_file, b"test")?;
        fs::remove_file(&test_file)?;

        fs::read_dir(path)?;

        Ok(())
    }

    /// Determines and validates the configuration directory
    ///
    /// The directory is searched in the following order:
    /// 1. The provided `directory` parameter if not empty
    /// 2. The `IPTV_REGISTRY_CONFIG` environment variable
    /// 3. `.iptvregistry` in the current directory
    /// 4. `.iptvregistry` in the user's home directory
    ///
    /// The directory is created if it doesn't exist, and validated for read/write permissions.
    pub fn config_dir(directory: &str) -> Result<String> {
        let dir_path = Self::find_config_dir(directory);
        Self::validate_config_dir(Path::new(&dir_path))
            .map_err(|e| anyhow!("invalid configuration directory {}: {}", dir_path, e))?;
        Ok(dir_path)
    }

    /// Loads the configuration from the specified directory
    ///
    /// This method:
    /// 1. Determines the configuration directory
    /// 2. Loads the default embedded configuration
    /// 3. Merges it with the external config.yaml file if present
    /// 4. Applies environment variable overrides
    /// 5. Saves the merged configuration
    pub fn load_config(directory: &str) -> Result<Self> {
        Self::load_config_with_overrides(directory, env::vars())
    }

    /// Same as [`Config::load_config`] with an explicit set of override variables
    pub fn load_config_with_overrides<I>(directory: &str, vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config_dir = Self::config_dir(directory)?;
        info!(config_dir=%config_dir, "Using config directory");

        let config_file_path = Path::new(&config_dir).join("config.yaml");
        let path = config_file_path.to_string_lossy().to_string();

        let mut default_value: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;

        let yaml_data = if let Ok(data) = fs::read(&path) {
            info!(config_file=%path, "Loaded config file");
            data
        } else {
            info!(config_file=%path, "Config file not found, using default embedded config");
            DEFAULT_CONFIG.as_bytes().to_vec()
        };

        let external_value: Value = serde_yaml::from_slice(&yaml_data)?;
        merge_yaml(&mut default_value, &external_value);
        let mut config_value = Self::lower_keys_value(default_value);

        Self::apply_overrides(&mut config_value, vars);

        let config = Config {
            config_dir,
            path,
            data: Mutex::new(config_value),
        };

        config.save()?;
        Ok(config)
    }

    fn data(&self) -> Result<MutexGuard<'_, Value>> {
        self.data
            .lock()
            .map_err(|_| anyhow!("configuration lock poisoned"))
    }

    /// Directory holding `config.yaml` and relative data paths
    pub fn get_config_dir(&self) -> &str {
        &self.config_dir
    }

    /// Saves the current configuration to the config.yaml file
    pub fn save(&self) -> Result<()> {
        let data = self.data()?;
        let yaml = serde_yaml::to_string(&*data)?;
        fs::write(&self.path, yaml)?;
        Ok(())
    }

    /// Sets a configuration value at the specified path and saves it
    ///
    /// # Arguments
    ///
    /// * `path` - Array of keys representing the path (e.g., `&["host", "http_port"]`)
    /// * `value` - The YAML value to set
    pub fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        let mut data = self.data()?;
        Self::set_value_internal(&mut data, path, value)?;
        drop(data);
        self.save()
    }

    fn set_value_internal(data: &mut Value, path: &[&str], value: Value) -> Result<()> {
        if path.is_empty() {
            *data = value;
            return Ok(());
        }
        if let Value::Mapping(map) = data {
            let key_value = Value::String(path[0].to_lowercase());
            if path.len() == 1 {
                map.insert(key_value, value);
            } else {
                let entry = map
                    .entry(key_value)
                    .or_insert(Value::Mapping(Mapping::new()));
                Self::set_value_internal(entry, &path[1..], value)?;
            }
            Ok(())
        } else {
            Err(anyhow!("Current node is not a map"))
        }
    }

    /// Gets a configuration value at the specified path
    ///
    /// Returns an error if the path doesn't exist.
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        let data = self.data()?;
        Self::get_value_internal(&data, path)
    }

    fn get_value_internal(data: &Value, path: &[&str]) -> Result<Value> {
        let mut current = data;
        for (i, key) in path.iter().enumerate() {
            if let Value::Mapping(map) = current {
                let key = key.to_lowercase();

                if let Some(next) = map.get(&Value::String(key)) {
                    current = next;
                } else {
                    return Err(anyhow!("Path {} does not exist", path[..=i].join(".")));
                }
            } else {
                return Err(anyhow!("Path {} is not a Config", path[..i].join(".")));
            }
        }
        Ok(current.clone())
    }

    /// Applies `IPTV_REGISTRY_CONFIG__A__B` variables, then the legacy `PORT`
    ///
    /// `PORT` always wins over `IPTV_REGISTRY_CONFIG__HOST__HTTP_PORT`,
    /// whatever order the variables come in.
    fn apply_overrides<I>(config: &mut Value, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut legacy_port = None;
        for (key, value) in vars {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                let key_path = stripped.split("__").collect::<Vec<_>>();
                let yaml_value = Self::convert_env_value(&value);
                let _ = Self::set_value_internal(config, &key_path, yaml_value);
            } else if key == ENV_LEGACY_PORT {
                legacy_port = Some(value);
            }
        }

        if let Some(value) = legacy_port {
            let yaml_value = Self::convert_env_value(&value);
            let _ = Self::set_value_internal(config, &["host", "http_port"], yaml_value);
        }
    }

    fn convert_env_value(value: &str) -> Value {
        if let Ok(parsed) = serde_yaml::from_str::<Value>(value) {
            return parsed;
        }
        Value::String(value.to_string())
    }

    fn lower_keys_value(value: Value) -> Value {
        match value {
            Value::Mapping(map) => {
                let mut new_map = Mapping::new();
                for (k, v) in map {
                    if let Value::String(s) = k {
                        new_map.insert(Value::String(s.to_lowercase()), Self::lower_keys_value(v));
                    } else {
                        new_map.insert(k, Self::lower_keys_value(v));
                    }
                }
                Value::Mapping(new_map)
            }
            Value::Sequence(seq) => {
                Value::Sequence(seq.into_iter().map(Self::lower_keys_value).collect())
            }
            _ => value,
        }
    }

    /// Resolves a path relative to the configuration directory
    ///
    /// Absolute paths are returned unchanged. The parent directory is created
    /// when missing so that a data file can be opened right away.
    pub fn resolve_data_path(&self, file_path: &str) -> Result<PathBuf> {
        let path = Path::new(file_path);
        let absolute_path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            Path::new(&self.config_dir).join(path)
        };

        if let Some(parent) = absolute_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
                info!(directory=%parent.display(), "Created data directory");
            }
        }

        Ok(absolute_path)
    }

    /// Gets a string value, falling back to `default` when missing or not a string
    pub fn get_string_or(&self, path: &[&str], default: &str) -> String {
        match self.get_value(path) {
            Ok(Value::String(s)) if !s.is_empty() => s,
            _ => default.to_string(),
        }
    }

    /// Gets an unsigned integer value, falling back to `default`
    pub fn get_u64_or(&self, path: &[&str], default: u64) -> u64 {
        match self.get_value(path) {
            Ok(Value::Number(n)) => n.as_u64().unwrap_or(default),
            Ok(Value::String(s)) => s.trim().parse().unwrap_or(default),
            _ => default,
        }
    }

    /// Gets the base URL advertised by the HTTP server
    ///
    /// Falls back to `localhost` when not configured.
    pub fn get_base_url(&self) -> String {
        match self.get_value(&["host", "base_url"]) {
            Ok(Value::String(s)) if !s.is_empty() => s,
            Ok(_) => DEFAULT_BASE_URL.to_string(),
            Err(err) => {
                tracing::warn!("Failed to get base URL: {}, using {}", err, DEFAULT_BASE_URL);
                DEFAULT_BASE_URL.to_string()
            }
        }
    }

    /// Gets the HTTP port from configuration
    ///
    /// Returns the configured HTTP port, or the default port (3000) if not configured or invalid.
    pub fn get_http_port(&self) -> u16 {
        match self.get_value(&["host", "http_port"]) {
            Ok(Value::Number(n)) => match n.as_u64().and_then(|p| u16::try_from(p).ok()) {
                Some(port) => port,
                None => {
                    tracing::warn!("HTTP port {} out of range, using default {}", n, DEFAULT_HTTP_PORT);
                    DEFAULT_HTTP_PORT
                }
            },
            Ok(Value::String(s)) => match s.parse::<u16>() {
                Ok(port) => port,
                Err(_) => {
                    tracing::warn!(
                        "Invalid HTTP port '{}', using default {}",
                        s,
                        DEFAULT_HTTP_PORT
                    );
                    DEFAULT_HTTP_PORT
                }
            },
            Ok(_) => {
                tracing::warn!(
                    "HTTP port not a number or string, using default {}",
                    DEFAULT_HTTP_PORT
                );
                DEFAULT_HTTP_PORT
            }
            Err(err) => {
                tracing::warn!(
                    "Failed to get HTTP port: {}, using default {}",
                    err,
                    DEFAULT_HTTP_PORT
                );
                DEFAULT_HTTP_PORT
            }
        }
    }

    /// Sets the HTTP port in configuration
    pub fn set_http_port(&self, port: u16) -> Result<()> {
        let n = Number::from(port);
        self.set_value(&["host", "http_port"], Value::Number(n))
    }

    impl_usize_config!(
        get_log_cache_size,
        set_log_cache_size,
        &["host", "logger", "buffer_capacity"],
        DEFAULT_LOG_BUFFER_CAPACITY
    );

    impl_bool_config!(
        get_log_enable_console,
        set_log_enable_console,
        &["host", "logger", "enable_console"],
        DEFAULT_LOG_ENABLE_CONSOLE
    );

    /// Minimum log level (ERROR, WARN, INFO, DEBUG or TRACE)
    pub fn get_log_min_level(&self) -> Result<String> {
        match self.get_value(&["host", "logger", "min_level"])? {
            Value::String(s) => Ok(s),
            _ => Ok(DEFAULT_LOG_MIN_LEVEL.to_string()),
        }
    }

    pub fn set_log_min_level(&self, level: String) -> Result<()> {
        self.set_value(&["host", "logger", "min_level"], Value::String(level))
    }
}

/// Merges external YAML configuration into default configuration
///
/// Mappings are merged key by key; scalars and sequences from `external`
/// replace the default value.
fn merge_yaml(default: &mut Value, external: &Value) {
    match (default, external) {
        (Value::Mapping(dmap), Value::Mapping(emap)) => {
            for (k, v) in emap {
                match dmap.get_mut(k) {
                    Some(dv) => merge_yaml(dv, v),
                    None => {
                        dmap.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (d, e) => *d = e.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn load_in(dir: &Path, vars: Vec<(&str, &str)>) -> Result<Config> {
        let vars = vars
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()));
        Config::load_config_with_overrides(&dir.to_string_lossy(), vars)
    }

    #[test]
    fn test_defaults_are_embedded() -> Result<()> {
        let dir = tempdir()?;
        let config = load_in(dir.path(), vec![])?;

        assert_eq!(config.get_http_port(), 3000);
        assert_eq!(config.get_base_url(), "localhost");
        assert_eq!(config.get_log_cache_size()?, 1000);
        assert_eq!(config.get_log_min_level()?, "INFO");
        assert!(config.get_log_enable_console()?);
        assert_eq!(
            config.get_string_or(&["registry", "store", "backend"], "memory"),
            "sqlite"
        );
        assert_eq!(config.get_u64_or(&["registry", "store", "timeout_ms"], 1), 5000);

        // the merged configuration is written back
        assert!(dir.path().join("config.yaml").exists());
        Ok(())
    }

    #[test]
    fn test_config_file_is_merged() -> Result<()> {
        let dir = tempdir()?;
        fs::write(
            dir.path().join("config.yaml"),
            "host:\n  http_port: 8081\nregistry:\n  store:\n    backend: memory\n",
        )?;

        let config = load_in(dir.path(), vec![])?;
        assert_eq!(config.get_http_port(), 8081);
        assert_eq!(
            config.get_string_or(&["registry", "store", "backend"], "sqlite"),
            "memory"
        );
        // untouched keys keep their default
        assert_eq!(config.get_log_cache_size()?, 1000);
        Ok(())
    }

    #[test]
    fn test_env_overrides() -> Result<()> {
        let dir = tempdir()?;
        let config = load_in(
            dir.path(),
            vec![
                ("IPTV_REGISTRY_CONFIG__REGISTRY__STORE__TIMEOUT_MS", "250"),
                ("IPTV_REGISTRY_CONFIG__HOST__LOGGER__MIN_LEVEL", "debug"),
                ("UNRELATED", "1"),
            ],
        )?;

        assert_eq!(config.get_u64_or(&["registry", "store", "timeout_ms"], 0), 250);
        assert_eq!(config.get_log_min_level()?, "debug");
        Ok(())
    }

    #[test]
    fn test_legacy_port_variable() -> Result<()> {
        let dir = tempdir()?;
        let config = load_in(dir.path(), vec![("PORT", "4242")])?;
        assert_eq!(config.get_http_port(), 4242);
        Ok(())
    }

    #[test]
    fn test_legacy_port_wins_in_any_order() -> Result<()> {
        let port = ("PORT", "4242");
        let prefixed = ("IPTV_REGISTRY_CONFIG__HOST__HTTP_PORT", "5151");

        for vars in [vec![port, prefixed], vec![prefixed, port]] {
            let dir = tempdir()?;
            let config = load_in(dir.path(), vars)?;
            assert_eq!(config.get_http_port(), 4242);
        }

        let dir = tempdir()?;
        let config = load_in(dir.path(), vec![prefixed])?;
        assert_eq!(config.get_http_port(), 5151);
        Ok(())
    }

    #[test]
    fn test_invalid_port_falls_back() -> Result<()> {
        let dir = tempdir()?;
        let config = load_in(dir.path(), vec![("PORT", "not-a-port")])?;
        assert_eq!(config.get_http_port(), DEFAULT_HTTP_PORT);

        config.set_value(&["host", "http_port"], Value::Number(Number::from(70000)))?;
        assert_eq!(config.get_http_port(), DEFAULT_HTTP_PORT);
        Ok(())
    }

    #[test]
    fn test_set_value_persists() -> Result<()> {
        let dir = tempdir()?;
        let config = load_in(dir.path(), vec![])?;
        config.set_http_port(9000)?;

        let reloaded = load_in(dir.path(), vec![])?;
        assert_eq!(reloaded.get_http_port(), 9000);
        Ok(())
    }

    #[test]
    fn test_missing_path_is_an_error() -> Result<()> {
        let dir = tempdir()?;
        let config = load_in(dir.path(), vec![])?;
        assert!(config.get_value(&["host", "nope"]).is_err());
        Ok(())
    }

    #[test]
    fn test_resolve_data_path() -> Result<()> {
        let dir = tempdir()?;
        let config = load_in(dir.path(), vec![])?;

        let relative = config.resolve_data_path("data/devices.db")?;
        assert_eq!(relative, dir.path().join("data/devices.db"));
        assert!(dir.path().join("data").is_dir());

        let absolute = dir.path().join("abs.db");
        assert_eq!(config.resolve_data_path(&absolute.to_string_lossy())?, absolute);
        Ok(())
    }

    #[test]
    fn test_merge_yaml_replaces_scalars() {
        let mut base: Value = serde_yaml::from_str("a:\n  b: 1\n  c: 2\n").unwrap();
        let ext: Value = serde_yaml::from_str("a:\n  b: 5\n  d: 7\n").unwrap();
        merge_yaml(&mut base, &ext);

        let get = |path: &[&str]| Config::get_value_internal(&base, path).unwrap().as_u64();
        assert_eq!(get(&["a", "b"]), Some(5));
        assert_eq!(get(&["a", "c"]), Some(2));
        assert_eq!(get(&["a", "d"]), Some(7));
    }
}
