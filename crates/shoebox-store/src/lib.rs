//! Durable per-job descriptor and blob storage.
//!
//! One directory per job holds a JSON descriptor (`job.json`, inspectable
//! for debugging) next to its blobs. The descriptor is rewritten after every
//! durable blob write, so a crash between two blob writes never loses track
//! of which blobs already exist, and it never references a blob that is not
//! on disk.

pub mod error;
mod store;

pub use error::{StoreError, StoreResult};
pub use store::JobStore;
