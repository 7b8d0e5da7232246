//! Publish error types.

use thiserror::Error;

/// Errors an [`crate::capabilities::Uploader`] implementation can return.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Upload rejected: {0}")]
    Rejected(String),

    #[error("Upload transport failed: {0}")]
    Transport(String),
}

/// Errors a [`crate::capabilities::Publisher`] implementation can return.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Record creation rejected: {0}")]
    Rejected(String),

    #[error("Publish transport failed: {0}")]
    Transport(String),
}

/// Errors from the publish coordinator.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    #[error("Store error: {0}")]
    Store(#[from] shoebox_store::StoreError),

    #[error("Operation cancelled")]
    Cancelled,
}
