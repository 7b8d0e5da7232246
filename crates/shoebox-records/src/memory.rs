//! In-memory record store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use shoebox_models::{JobId, LocalRecord, RecordStatus};

use crate::error::{RecordStoreError, RecordStoreResult};
use crate::store::RecordStore;

/// HashMap-backed store; the reference implementation used by tests.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: Mutex<HashMap<JobId, LocalRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert(&self, record: &LocalRecord) -> RecordStoreResult<()> {
        let mut records = self.records.lock().await;
        if records.contains_key(&record.id) {
            return Err(RecordStoreError::AlreadyExists(record.id.to_string()));
        }
        records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn get(&self, id: &JobId) -> RecordStoreResult<Option<LocalRecord>> {
        Ok(self.records.lock().await.get(id).cloned())
    }

    async fn all_pending(&self) -> RecordStoreResult<Vec<LocalRecord>> {
        let records = self.records.lock().await;
        let mut pending: Vec<LocalRecord> = records
            .values()
            .filter(|r| r.status == RecordStatus::Creating)
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(pending)
    }

    async fn update(&self, record: &LocalRecord) -> RecordStoreResult<()> {
        let mut records = self.records.lock().await;
        match records.get_mut(&record.id) {
            Some(slot) => {
                *slot = record.clone();
                Ok(())
            }
            None => Err(RecordStoreError::NotFound(record.id.to_string())),
        }
    }

    async fn delete(&self, id: &JobId) -> RecordStoreResult<()> {
        self.records.lock().await.remove(id);
        Ok(())
    }
}
