//! Injected capability contracts.
//!
//! The pipeline core only knows these call shapes; the host wires in the
//! actual backend client, AI services and tag storage. Enrichment
//! capabilities are best-effort: their failures are swallowed by the
//! coordinator and never abort a job.

use async_trait::async_trait;

use shoebox_models::{CreationJob, JobId, PublishPayload, RemoteRecord};

use crate::error::{PublishError, UploadError};

/// Uploads a blob and returns its public URL.
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        name: &str,
        content_type: &str,
    ) -> Result<String, UploadError>;
}

/// Creates and deletes the canonical remote record.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn create_record(&self, payload: &PublishPayload) -> Result<RemoteRecord, PublishError>;

    /// Best-effort delete; callers fire-and-forget this.
    async fn delete_record(&self, id: &JobId) -> Result<(), PublishError>;
}

/// Generates a content description (image captioning, transcription, ...).
#[async_trait]
pub trait ContentDescriber: Send + Sync {
    async fn describe(&self, job: &CreationJob) -> anyhow::Result<String>;
}

/// Generates a title for untitled items.
#[async_trait]
pub trait Titler: Send + Sync {
    async fn title(&self, job: &CreationJob) -> anyhow::Result<String>;
}

/// Associates the job's tag set with the published record.
#[async_trait]
pub trait TagService: Send + Sync {
    async fn associate(&self, record_id: &JobId, tag_ids: &[String]) -> anyhow::Result<()>;
}
