//! Device registry: validation, normalization and store orchestration

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{SubsecRound, Utc};
use tracing::{debug, error, info, warn};

use crate::error::{RegistryError, Result, StoreError};
use crate::mac::{lookup_key, MacAddress};
use crate::record::{DeviceRecord, PlaylistUrl, UpsertFields};
use crate::store::DeviceStore;

/// Default bound on every store call
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_millis(5000);

/// Result of [`Registry::upsert`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub record: DeviceRecord,
    /// `true` when the record did not exist before this call
    pub created: bool,
}

/// Entry point for every device operation
///
/// The registry holds no record state of its own. It validates input,
/// normalizes identifiers and forwards one call per operation to the store,
/// bounded by a timeout. Stores that can enforce the timeout themselves
/// (see [`DeviceStore::set_call_timeout`]) are left to do so, so that a call
/// reported as failed never applied its write.
///
/// ```
/// use iptvregistry::{MemoryStore, Registry};
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let registry = Registry::new(Arc::new(MemoryStore::new()));
/// let outcome = registry
///     .upsert("aa-bb-cc-dd-ee-ff", "http://example.com/list.m3u")
///     .await
///     .unwrap();
/// assert!(outcome.created);
/// assert_eq!(outcome.record.mac_address.as_str(), "AA:BB:CC:DD:EE:FF");
/// # }
/// ```
#[derive(Clone)]
pub struct Registry {
    store: Arc<dyn DeviceStore>,
    timeout: Duration,
    store_bounded: bool,
}

impl Registry {
    pub fn new(store: Arc<dyn DeviceStore>) -> Self {
        let store_bounded = store.set_call_timeout(DEFAULT_STORE_TIMEOUT);
        Self {
            store,
            timeout: DEFAULT_STORE_TIMEOUT,
            store_bounded,
        }
    }

    /// Sets the per-call bound, on the store too when it enforces it
    ///
    /// Registries sharing one store share its bound: the last one set wins.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self.store_bounded = self.store.set_call_timeout(timeout);
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn call<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = std::result::Result<T, StoreError>>,
    ) -> Result<T> {
        let outcome = if self.store_bounded {
            fut.await
        } else {
            match tokio::time::timeout(self.timeout, fut).await {
                Ok(outcome) => outcome,
                Err(_) => Err(StoreError::Timeout(self.timeout)),
            }
        };
        outcome.map_err(|e| {
            error!(operation, error = %e, "Device store failure");
            RegistryError::StoreUnavailable(e)
        })
    }

    /// All records, in first-creation order
    pub async fn list_all(&self) -> Result<Vec<DeviceRecord>> {
        let records = self.call("find_all", self.store.find_all()).await?;
        debug!(count = records.len(), "Listed devices");
        Ok(records)
    }

    /// Looks a record up by MAC address, in any accepted spelling
    pub async fn get_by_identifier(&self, identifier: &str) -> Result<DeviceRecord> {
        let key = lookup_key(identifier);
        let found = self.call("find_by_key", self.store.find_by_key(&key)).await?;
        found.ok_or(RegistryError::NotFound(key))
    }

    /// Creates or replaces the playlist of a device
    ///
    /// Both values are validated before the store is touched. Concurrent
    /// upserts on the same address are resolved by the store: last write wins.
    pub async fn upsert(&self, identifier: &str, m3u_url: &str) -> Result<UpsertOutcome> {
        let mac = MacAddress::parse(identifier).inspect_err(|_| {
            warn!(identifier, "Rejected upsert: invalid MAC address");
        })?;
        let m3u_url = PlaylistUrl::parse(m3u_url).inspect_err(|e| {
            warn!(mac = %mac, error = %e, "Rejected upsert: invalid M3U URL");
        })?;

        let fields = UpsertFields {
            m3u_url,
            now: Utc::now().trunc_subsecs(6),
        };
        let (record, created) = self
            .call("upsert_by_key", self.store.upsert_by_key(&mac, fields))
            .await?;

        info!(mac = %record.mac_address, url = %record.m3u_url, created, "Device saved");
        Ok(UpsertOutcome { record, created })
    }

    /// Removes a device, returning the key that was deleted
    pub async fn delete_by_identifier(&self, identifier: &str) -> Result<String> {
        let key = lookup_key(identifier);
        if self.call("delete_by_key", self.store.delete_by_key(&key)).await? {
            info!(mac = %key, "Device deleted");
            Ok(key)
        } else {
            Err(RegistryError::NotFound(key))
        }
    }

    /// Closes the underlying store
    pub async fn close(&self) -> Result<()> {
        self.call("close", self.store.close()).await?;
        info!("Device store closed");
        Ok(())
    }
}
