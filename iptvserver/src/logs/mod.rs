//! Logging subsystem
//!
//! A reloadable level filter, an in-memory ring buffer fed by [`SseLayer`]
//! and an optional console layer, plus the HTTP handlers that expose them.

mod sselayer;

pub use sselayer::SseLayer;

use std::{
    collections::VecDeque,
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{
        IntoResponse,
        sse::{Event, KeepAlive, Sse},
    },
};
use chrono::{DateTime, Utc};
use iptvconfig::Config;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::Level;
use tracing_subscriber::{
    Registry,
    filter::LevelFilter,
    layer::SubscriberExt,
    reload,
    util::SubscriberInitExt,
};

use crate::server::ServerError;

const AVAILABLE_LEVELS: [&str; 5] = ["ERROR", "WARN", "INFO", "DEBUG", "TRACE"];

/// A captured log event
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub target: String,
    pub message: String,
}

type ReloadHandle = reload::Handle<LevelFilter, Registry>;

/// Shared ring buffer of log entries
#[derive(Clone)]
pub struct LogState {
    buffer: Arc<RwLock<VecDeque<LogEntry>>>,
    capacity: usize,
    tx: broadcast::Sender<LogEntry>,
    max_level: Arc<RwLock<Level>>,
    reload_handle: Option<ReloadHandle>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

impl LogState {
    /// Creates a buffer keeping at most `capacity` entries
    ///
    /// Without a reload handle, level changes only affect what is streamed
    /// to clients, not what the subscriber records.
    pub fn new(capacity: usize, reload_handle: Option<ReloadHandle>) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: Arc::new(RwLock::new(VecDeque::with_capacity(capacity))),
            capacity,
            tx: broadcast::channel(1000).0,
            max_level: Arc::new(RwLock::new(Level::TRACE)),
            reload_handle,
        }
    }

    pub fn set_max_level(&self, level: Level) -> Result<(), String> {
        *write(&self.max_level) = level;

        if let Some(handle) = &self.reload_handle {
            handle
                .reload(level_to_levelfilter(level))
                .map_err(|e| format!("cannot reload log level filter: {}", e))?;
        }
        Ok(())
    }

    pub fn get_max_level(&self) -> Level {
        *read(&self.max_level)
    }

    pub(crate) fn push(&self, entry: LogEntry) {
        let mut buf = write(&self.buffer);
        while buf.len() >= self.capacity {
            buf.pop_front();
        }
        buf.push_back(entry.clone());
        drop(buf);
        let _ = self.tx.send(entry);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.tx.subscribe()
    }

    pub fn dump(&self) -> Vec<LogEntry> {
        read(&self.buffer).iter().cloned().collect()
    }
}

/// Query parameters of `/log-sse`
#[derive(Debug, Default, Deserialize)]
pub struct LogQuery {
    #[serde(default)]
    pub error: Option<bool>,
    #[serde(default)]
    pub warn: Option<bool>,
    #[serde(default)]
    pub info: Option<bool>,
    #[serde(default)]
    pub debug: Option<bool>,
    #[serde(default)]
    pub trace: Option<bool>,
    #[serde(default)]
    pub search: Option<String>,
}

/// SSE handler: buffered history first, then live entries
pub async fn log_sse(
    State(state): State<LogState>,
    Query(params): Query<LogQuery>,
) -> impl IntoResponse {
    let mut rx = state.subscribe();
    let history = state.dump();
    let stream_state = state.clone();
    let current_level = stream_state.get_max_level();

    let stream = async_stream::stream! {
        for entry in history {
            if !is_level_allowed(&entry.level, current_level) || !filter_entry(&entry, &params) {
                continue;
            }
            if let Ok(json) = serde_json::to_string(&entry) {
                yield Ok::<_, axum::Error>(Event::default().data(json));
            }
        }

        loop {
            let entry = match rx.recv().await {
                Ok(entry) => entry,
                // slow client: skip what was dropped and keep streaming
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            };
            let max_level = stream_state.get_max_level();
            if !is_level_allowed(&entry.level, max_level) || !filter_entry(&entry, &params) {
                continue;
            }
            if let Ok(json) = serde_json::to_string(&entry) {
                yield Ok::<_, axum::Error>(Event::default().data(json));
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// REST handler (JSON dump of the buffer)
pub async fn log_dump(State(state): State<LogState>) -> impl IntoResponse {
    Json(state.dump())
}

/// Checks a log level against the configured maximum
fn is_level_allowed(log_level: &str, max_level: Level) -> bool {
    match string_to_level(log_level) {
        // Level ordering: TRACE > DEBUG > INFO > WARN > ERROR
        Some(entry_level) => entry_level <= max_level,
        None => false,
    }
}

fn filter_entry(entry: &LogEntry, q: &LogQuery) -> bool {
    let lvl = entry.level.to_lowercase();
    let flags = [
        (q.error, "error"),
        (q.warn, "warn"),
        (q.info, "info"),
        (q.debug, "debug"),
        (q.trace, "trace"),
    ];

    let any_flag = flags.iter().any(|(flag, _)| flag.unwrap_or(false));
    let mut allowed = !any_flag
        || flags
            .iter()
            .any(|(flag, name)| flag.unwrap_or(false) && lvl == *name);

    if let Some(search) = &q.search {
        allowed &= entry.message.contains(search) || entry.target.contains(search);
    }

    allowed
}

/// Logging initialization options
#[derive(Debug, Clone)]
pub struct LoggingOptions {
    /// Ring buffer capacity (number of entries kept)
    pub buffer_capacity: usize,
    /// Also print to stderr
    pub enable_console: bool,
    /// Initial level filter
    pub min_level: Level,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            buffer_capacity: 1000,
            enable_console: true,
            min_level: Level::INFO,
        }
    }
}

impl LoggingOptions {
    /// Reads the `host.logger` section, keeping defaults for invalid values
    pub fn from_config(config: &Config) -> Self {
        let defaults = Self::default();
        Self {
            buffer_capacity: config
                .get_log_cache_size()
                .unwrap_or(defaults.buffer_capacity),
            enable_console: config
                .get_log_enable_console()
                .unwrap_or(defaults.enable_console),
            min_level: config
                .get_log_min_level()
                .ok()
                .and_then(|l| string_to_level(&l))
                .unwrap_or(defaults.min_level),
        }
    }
}

/// Installs the global tracing subscriber
///
/// Returns the [`LogState`] feeding `/log-dump` and `/log-sse`. Fails if a
/// global subscriber is already installed.
pub fn init_logging(options: LoggingOptions) -> Result<LogState, ServerError> {
    let (filter, reload_handle) = reload::Layer::new(level_to_levelfilter(options.min_level));

    let log_state = LogState::new(options.buffer_capacity, Some(reload_handle));
    *write(&log_state.max_level) = options.min_level;

    // the filter must come first so it applies to every following layer
    let subscriber = Registry::default()
        .with(filter)
        .with(SseLayer::new(log_state.clone()));

    let result = if options.enable_console {
        subscriber
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_ansi(true),
            )
            .try_init()
    } else {
        subscriber.try_init()
    };
    result.map_err(|e| ServerError::Logging(e.to_string()))?;

    Ok(log_state)
}

/// Request body of `POST /api/logs/log_setup`
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct LogSetupRequest {
    pub level: String,
}

/// Response of the log setup endpoints
#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct LogSetupResponse {
    pub current_level: String,
    pub available_levels: Vec<String>,
}

impl LogSetupResponse {
    fn new(level: Level) -> Self {
        Self {
            current_level: level_to_string(level),
            available_levels: AVAILABLE_LEVELS.iter().map(|l| l.to_string()).collect(),
        }
    }
}

/// Handler for GET /api/logs/log_setup
#[utoipa::path(
    get,
    path = "/log_setup",
    responses(
        (status = 200, description = "Log configuration retrieved successfully", body = LogSetupResponse)
    ),
    tag = "logs"
)]
pub async fn log_setup_get(State(state): State<LogState>) -> impl IntoResponse {
    Json(LogSetupResponse::new(state.get_max_level()))
}

/// Handler for POST /api/logs/log_setup
#[utoipa::path(
    post,
    path = "/log_setup",
    request_body = LogSetupRequest,
    responses(
        (status = 200, description = "Log level updated successfully", body = LogSetupResponse),
        (status = 400, description = "Invalid log level"),
        (status = 500, description = "Log filter could not be reloaded")
    ),
    tag = "logs"
)]
pub async fn log_setup_post(
    State(state): State<LogState>,
    Json(payload): Json<LogSetupRequest>,
) -> impl IntoResponse {
    let Some(level) = string_to_level(&payload.level) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "error": "Invalid log level. Must be one of: ERROR, WARN, INFO, DEBUG, TRACE"
            })),
        )
            .into_response();
    };

    if let Err(e) = state.set_max_level(level) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e })),
        )
            .into_response();
    }
    tracing::info!("Log level changed to: {}", level_to_string(level));

    (StatusCode::OK, Json(LogSetupResponse::new(level))).into_response()
}

pub(crate) fn string_to_level(s: &str) -> Option<Level> {
    match s.trim().to_uppercase().as_str() {
        "ERROR" => Some(Level::ERROR),
        "WARN" => Some(Level::WARN),
        "INFO" => Some(Level::INFO),
        "DEBUG" => Some(Level::DEBUG),
        "TRACE" => Some(Level::TRACE),
        _ => None,
    }
}

fn level_to_string(level: Level) -> String {
    level.as_str().to_string()
}

fn level_to_levelfilter(level: Level) -> LevelFilter {
    LevelFilter::from_level(level)
}

/// Router of the log management API
pub fn create_logs_router(log_state: LogState) -> axum::Router {
    use axum::routing::get;
    axum::Router::new()
        .route("/log_setup", get(log_setup_get).post(log_setup_post))
        .with_state(log_state)
}

/// OpenAPI document of the log management API
#[derive(utoipa::OpenApi)]
#[openapi(
    paths(
        log_setup_get,
        log_setup_post,
    ),
    components(
        schemas(LogSetupRequest, LogSetupResponse)
    ),
    tags(
        (name = "logs", description = "Log level configuration endpoints")
    )
)]
pub struct LogsApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(level: &str, target: &str, message: &str) -> LogEntry {
        LogEntry {
            timestamp: Utc::now(),
            level: level.to_string(),
            target: target.to_string(),
            message: message.to_string(),
        }
    }

    #[test]
    fn test_ring_buffer_drops_oldest() {
        let state = LogState::new(2, None);
        state.push(entry("INFO", "a", "one"));
        state.push(entry("INFO", "a", "two"));
        state.push(entry("INFO", "a", "three"));

        let messages: Vec<_> = state.dump().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["two", "three"]);
    }

    #[test]
    fn test_level_ordering() {
        assert!(is_level_allowed("ERROR", Level::WARN));
        assert!(is_level_allowed("warn", Level::WARN));
        assert!(!is_level_allowed("INFO", Level::WARN));
        assert!(is_level_allowed("TRACE", Level::TRACE));
        assert!(!is_level_allowed("BOGUS", Level::TRACE));
    }

    #[test]
    fn test_filter_entry_flags_and_search() {
        let e = entry("WARN", "iptvregistry::registry", "store timeout");

        assert!(filter_entry(&e, &LogQuery::default()));

        let only_errors = LogQuery {
            error: Some(true),
            ..Default::default()
        };
        assert!(!filter_entry(&e, &only_errors));

        let warn_and_search = LogQuery {
            warn: Some(true),
            search: Some("timeout".to_string()),
            ..Default::default()
        };
        assert!(filter_entry(&e, &warn_and_search));

        let by_target = LogQuery {
            search: Some("registry".to_string()),
            ..Default::default()
        };
        assert!(filter_entry(&e, &by_target));
    }

    #[test]
    fn test_set_max_level_without_reload_handle() {
        let state = LogState::new(10, None);
        assert!(state.set_max_level(Level::DEBUG).is_ok());
        assert_eq!(state.get_max_level(), Level::DEBUG);
    }

    #[test]
    fn test_string_to_level() {
        assert_eq!(string_to_level(" debug "), Some(Level::DEBUG));
        assert_eq!(string_to_level("nope"), None);
        assert_eq!(level_to_string(Level::WARN), "WARN");
    }
}
