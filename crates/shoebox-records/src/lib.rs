//! Local record store contract and implementations.
//!
//! The pipeline core only needs the [`RecordStore`] operations; the host
//! application owns the actual persistence layer. [`SqliteRecordStore`] is
//! the embedded default, [`MemoryRecordStore`] backs tests.

pub mod error;
mod memory;
mod sqlite;
mod store;

pub use error::{RecordStoreError, RecordStoreResult};
pub use memory::MemoryRecordStore;
pub use sqlite::SqliteRecordStore;
pub use store::RecordStore;
