//! The record store contract.

use async_trait::async_trait;

use shoebox_models::{JobId, LocalRecord};

use crate::error::RecordStoreResult;

/// Persistence operations the pipeline needs from the host's record store.
///
/// `insert` is transactional over the record row and its tag associations:
/// a draft either appears with all of its tags or not at all.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a new record together with its tag rows.
    async fn insert(&self, record: &LocalRecord) -> RecordStoreResult<()>;

    /// Fetch a record by id.
    async fn get(&self, id: &JobId) -> RecordStoreResult<Option<LocalRecord>>;

    /// All records still in `Creating` state, oldest first.
    async fn all_pending(&self) -> RecordStoreResult<Vec<LocalRecord>>;

    /// Replace a record's stored state.
    async fn update(&self, record: &LocalRecord) -> RecordStoreResult<()>;

    /// Delete a record and its tag associations. Idempotent.
    async fn delete(&self, id: &JobId) -> RecordStoreResult<()>;
}
