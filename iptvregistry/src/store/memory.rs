use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::DeviceStore;
use crate::error::StoreError;
use crate::mac::MacAddress;
use crate::record::{DeviceRecord, UpsertFields};

/// Process-local store, lost when the process exits
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    closed: bool,
    next_seq: u64,
    records: HashMap<String, (u64, DeviceRecord)>,
}

impl MemoryState {
    fn check_open(&self) -> Result<(), StoreError> {
        if self.closed {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeviceStore for MemoryStore {
    async fn find_all(&self) -> Result<Vec<DeviceRecord>, StoreError> {
        let state = self.state.read().await;
        state.check_open()?;

        let mut entries: Vec<_> = state.records.values().collect();
        entries.sort_by_key(|(seq, _)| *seq);
        Ok(entries.into_iter().map(|(_, r)| r.clone()).collect())
    }

    async fn find_by_key(&self, key: &str) -> Result<Option<DeviceRecord>, StoreError> {
        let state = self.state.read().await;
        state.check_open()?;
        Ok(state.records.get(key).map(|(_, r)| r.clone()))
    }

    async fn upsert_by_key(
        &self,
        key: &MacAddress,
        fields: UpsertFields,
    ) -> Result<(DeviceRecord, bool), StoreError> {
        let mut state = self.state.write().await;
        state.check_open()?;

        if let Some((_, record)) = state.records.get_mut(key.as_str()) {
            record.m3u_url = fields.m3u_url.into_string();
            record.updated_at = fields.now.max(record.created_at);
            return Ok((record.clone(), false));
        }

        let record = DeviceRecord {
            mac_address: key.clone(),
            m3u_url: fields.m3u_url.into_string(),
            created_at: fields.now,
            updated_at: fields.now,
        };
        let seq = state.next_seq;
        state.next_seq += 1;
        state
            .records
            .insert(key.as_str().to_string(), (seq, record.clone()));
        Ok((record, true))
    }

    async fn delete_by_key(&self, key: &str) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        state.check_open()?;
        Ok(state.records.remove(key).is_some())
    }

    async fn close(&self) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.closed = true;
        state.records.clear();
        Ok(())
    }
}
