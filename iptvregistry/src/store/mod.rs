//! Persistence backends for device records
//!
//! A [`DeviceStore`] owns the lifetime of the records. Keys handed to a store
//! are already normalized by the [`Registry`](crate::Registry). The store only
//! has to guarantee that [`DeviceStore::upsert_by_key`] is atomic per key.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::mac::MacAddress;
use crate::record::{DeviceRecord, UpsertFields};

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[async_trait]
pub trait DeviceStore: Send + Sync {
    /// Every record, in first-creation order
    async fn find_all(&self) -> Result<Vec<DeviceRecord>, StoreError>;

    async fn find_by_key(&self, key: &str) -> Result<Option<DeviceRecord>, StoreError>;

    /// Creates the record or replaces its URL and `updated_at` in one step
    ///
    /// Returns the stored record and `true` when it did not exist before.
    /// `updated_at` never goes below the existing `created_at`.
    async fn upsert_by_key(
        &self,
        key: &MacAddress,
        fields: UpsertFields,
    ) -> Result<(DeviceRecord, bool), StoreError>;

    /// Returns `false` when no record had this key
    async fn delete_by_key(&self, key: &str) -> Result<bool, StoreError>;

    /// Releases the backend; later calls fail with [`StoreError::Closed`]
    async fn close(&self) -> Result<(), StoreError>;

    /// Asks the store to bound each of its calls by `timeout` itself
    ///
    /// A store that accepts returns `true` and must fail an overrunning call
    /// with [`StoreError::Timeout`] without applying it. The registry then
    /// awaits its calls to the end. Stores that keep the default are cut off
    /// by the registry instead, which is only sound when dropping a pending
    /// call cannot leave a write behind.
    fn set_call_timeout(&self, _timeout: Duration) -> bool {
        false
    }
}
