//! SQLite-backed record store.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use shoebox_models::{JobId, LocalRecord, RecordStatus};

use crate::error::{RecordStoreError, RecordStoreResult};
use crate::store::RecordStore;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS records (
    id         TEXT PRIMARY KEY,
    status     TEXT NOT NULL,
    payload    TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS record_tags (
    record_id TEXT NOT NULL,
    tag_id    TEXT NOT NULL,
    PRIMARY KEY (record_id, tag_id)
);
CREATE INDEX IF NOT EXISTS idx_records_status ON records(status);
";

/// Embedded SQLite store. Rows hold the full record as JSON next to the
/// columns queries filter on.
#[derive(Clone)]
pub struct SqliteRecordStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRecordStore {
    /// Open (and migrate) a store at the given database path.
    pub fn open(path: impl AsRef<Path>) -> RecordStoreResult<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Open an in-memory store.
    pub fn open_in_memory() -> RecordStoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> RecordStoreResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a closure against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> RecordStoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> RecordStoreResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| RecordStoreError::Internal("connection lock poisoned".into()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| RecordStoreError::Internal(e.to_string()))?
    }
}

fn row_to_record(payload: String) -> RecordStoreResult<LocalRecord> {
    Ok(serde_json::from_str(&payload)?)
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn insert(&self, record: &LocalRecord) -> RecordStoreResult<()> {
        let record = record.clone();
        self.with_conn(move |conn| {
            let payload = serde_json::to_string(&record)?;
            let tx = conn.transaction()?;

            let inserted = tx.execute(
                "INSERT OR IGNORE INTO records (id, status, payload, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    record.id.as_str(),
                    record.status.as_str(),
                    payload,
                    record.created_at.to_rfc3339(),
                ],
            )?;
            if inserted == 0 {
                return Err(RecordStoreError::AlreadyExists(record.id.to_string()));
            }

            for tag_id in &record.tag_ids {
                tx.execute(
                    "INSERT OR IGNORE INTO record_tags (record_id, tag_id) VALUES (?1, ?2)",
                    params![record.id.as_str(), tag_id],
                )?;
            }

            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn get(&self, id: &JobId) -> RecordStoreResult<Option<LocalRecord>> {
        let id = id.clone();
        self.with_conn(move |conn| {
            let payload: Option<String> = conn
                .query_row(
                    "SELECT payload FROM records WHERE id = ?1",
                    params![id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            payload.map(row_to_record).transpose()
        })
        .await
    }

    async fn all_pending(&self) -> RecordStoreResult<Vec<LocalRecord>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT payload FROM records WHERE status = ?1 ORDER BY created_at ASC",
            )?;
            let rows = stmt.query_map(params![RecordStatus::Creating.as_str()], |row| {
                row.get::<_, String>(0)
            })?;

            let mut records = Vec::new();
            for payload in rows {
                records.push(row_to_record(payload?)?);
            }
            Ok(records)
        })
        .await
    }

    async fn update(&self, record: &LocalRecord) -> RecordStoreResult<()> {
        let record = record.clone();
        self.with_conn(move |conn| {
            let payload = serde_json::to_string(&record)?;
            let updated = conn.execute(
                "UPDATE records SET status = ?2, payload = ?3 WHERE id = ?1",
                params![record.id.as_str(), record.status.as_str(), payload],
            )?;
            if updated == 0 {
                return Err(RecordStoreError::NotFound(record.id.to_string()));
            }
            Ok(())
        })
        .await
    }

    async fn delete(&self, id: &JobId) -> RecordStoreResult<()> {
        let id = id.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM record_tags WHERE record_id = ?1",
                params![id.as_str()],
            )?;
            tx.execute("DELETE FROM records WHERE id = ?1", params![id.as_str()])?;
            tx.commit()?;
            Ok(())
        })
        .await
    }
}
