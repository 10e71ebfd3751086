//! # iptvregistry - MAC address to M3U playlist registry
//!
//! Each IPTV set-top box is identified by its MAC address and gets one
//! playlist URL. This crate validates and normalizes the input, keeps the
//! records in a pluggable [`DeviceStore`] and, with the `server` feature,
//! exposes them over HTTP.
//!
//! ## Features
//!
//! - `server` (default): axum REST API and its `iptvserver` extension trait
//! - `openapi`: utoipa schemas for the public types (implied by `server`)
//! - `config` (default): store settings read from `iptvconfig`
//!
//! ## Example
//!
//! ```
//! use iptvregistry::{MemoryStore, Registry, RegistryError};
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let registry = Registry::new(Arc::new(MemoryStore::new()));
//! registry.upsert("AA:BB:CC:DD:EE:FF", "http://example.com/list.m3u").await.unwrap();
//! registry.upsert("aa-bb-cc-dd-ee-ff", "http://example.com/list2.m3u").await.unwrap();
//!
//! let devices = registry.list_all().await.unwrap();
//! assert_eq!(devices.len(), 1);
//! assert_eq!(devices[0].m3u_url, "http://example.com/list2.m3u");
//!
//! assert!(matches!(
//!     registry.upsert("AABBCCDDEEFF", "http://example.com/list.m3u").await,
//!     Err(RegistryError::InvalidIdentifier(_))
//! ));
//! # }
//! ```

pub mod error;
pub mod mac;
pub mod record;
pub mod registry;
pub mod store;

#[cfg(feature = "config")]
pub mod config_ext;

#[cfg(feature = "server")]
pub mod api;

#[cfg(feature = "server")]
pub mod openapi;

#[cfg(feature = "server")]
pub mod server_ext;

pub use error::{RegistryError, StoreError};
pub use mac::{lookup_key, MacAddress};
pub use record::{DeviceRecord, PlaylistUrl, UpsertFields};
pub use registry::{Registry, UpsertOutcome, DEFAULT_STORE_TIMEOUT};
pub use store::{DeviceStore, MemoryStore, SqliteStore};

#[cfg(feature = "config")]
pub use config_ext::{RegistryConfigExt, StoreBackend};

#[cfg(feature = "server")]
pub use openapi::DevicesApiDoc;

#[cfg(feature = "server")]
pub use server_ext::RegistryServerExt;
