//! Remote publish coordination and local record finalization.
//!
//! The coordinator drives upload → enrichment → record creation → tag
//! association through injected capabilities, with a cooperative
//! cancellation checkpoint between every step. The finalizer owns the
//! terminal state transition: a record is never `Synced` unless the blobs
//! it needs are actually present on disk.

pub mod capabilities;
pub mod coordinator;
pub mod error;
pub mod finalize;

pub use capabilities::{ContentDescriber, Publisher, TagService, Titler, Uploader};
pub use coordinator::{PublishCoordinator, PublishOutcome};
pub use error::{CoordinatorError, PublishError, UploadError};
pub use finalize::{FinalizeError, LocalRecordFinalizer};
