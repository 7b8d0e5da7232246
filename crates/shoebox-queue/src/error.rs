//! Queue error types.

use thiserror::Error;

use shoebox_models::BlobSlot;
use shoebox_publish::{CoordinatorError, PublishError, UploadError};

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Errors that can fail a job.
///
/// All variants except `Cancelled` settle the record as `Failed` while
/// leaving durable job state untouched, so a retry resumes from exactly
/// where the pipeline stopped.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Missing blob for slot {0}")]
    MissingBlob(BlobSlot),

    #[error("Media error: {0}")]
    Media(#[from] shoebox_media::MediaError),

    #[error("Store error: {0}")]
    Store(#[from] shoebox_store::StoreError),

    #[error("Record store error: {0}")]
    Records(#[from] shoebox_records::RecordStoreError),

    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    #[error("Finalize error: {0}")]
    Finalize(#[from] shoebox_publish::FinalizeError),

    #[error("Operation cancelled")]
    Cancelled,
}

impl From<CoordinatorError> for QueueError {
    fn from(e: CoordinatorError) -> Self {
        match e {
            CoordinatorError::Upload(e) => QueueError::Upload(e),
            CoordinatorError::Publish(e) => QueueError::Publish(e),
            CoordinatorError::Store(e) => QueueError::Store(e),
            CoordinatorError::Cancelled => QueueError::Cancelled,
        }
    }
}

impl QueueError {
    /// Cancellation is not a failure: it must never mutate record status.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, QueueError::Cancelled)
    }
}
