//! Error types of the device registry

use std::time::Duration;

use thiserror::Error;

/// Failures raised by a [`DeviceStore`](crate::store::DeviceStore) backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("stored record for {key} is corrupted: {reason}")]
    Corrupted { key: String, reason: String },

    #[error("store task failed: {0}")]
    Task(String),

    #[error("store lock poisoned")]
    Poisoned,

    #[error("store is closed")]
    Closed,

    #[error("store did not answer within {0:?}")]
    Timeout(Duration),
}

/// Errors returned by every [`Registry`](crate::Registry) operation
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The hardware address is not six hex octets with a uniform separator
    #[error("invalid MAC address format: {0:?}")]
    InvalidIdentifier(String),

    /// The playlist URL is not an absolute URL with a host
    #[error("invalid M3U URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// No record matches the normalized identifier
    #[error("device {0} not found")]
    NotFound(String),

    /// The backend failed, timed out or was closed
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
}

impl RegistryError {
    /// Stable code sent to HTTP clients in the `error` field
    pub fn code(&self) -> &'static str {
        match self {
            RegistryError::InvalidIdentifier(_) => "INVALID_IDENTIFIER",
            RegistryError::InvalidUrl { .. } => "INVALID_URL",
            RegistryError::NotFound(_) => "NOT_FOUND",
            RegistryError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
        }
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;
