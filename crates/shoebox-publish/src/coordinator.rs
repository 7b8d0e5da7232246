//! Publish coordinator.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, warn};

use shoebox_models::{BlobSlot, CreationJob, PublishPayload, RemoteRecord};
use shoebox_store::JobStore;

use crate::capabilities::{ContentDescriber, Publisher, TagService, Titler, Uploader};
use crate::error::CoordinatorError;

/// Result of a successful publish: the remote record plus the payload it
/// was created from (carrying enrichment results for the local record).
#[derive(Debug, Clone)]
pub struct PublishOutcome {
    pub remote: RemoteRecord,
    pub payload: PublishPayload,
}

/// Orchestrates upload, enrichment, remote record creation and tag
/// association for one job, in strict order, through injected capabilities.
pub struct PublishCoordinator {
    uploader: Arc<dyn Uploader>,
    publisher: Arc<dyn Publisher>,
    describer: Arc<dyn ContentDescriber>,
    titler: Arc<dyn Titler>,
    tags: Arc<dyn TagService>,
}

impl PublishCoordinator {
    pub fn new(
        uploader: Arc<dyn Uploader>,
        publisher: Arc<dyn Publisher>,
        describer: Arc<dyn ContentDescriber>,
        titler: Arc<dyn Titler>,
        tags: Arc<dyn TagService>,
    ) -> Self {
        Self {
            uploader,
            publisher,
            describer,
            titler,
            tags,
        }
    }

    /// Publish a job's durable blobs and create its remote record.
    ///
    /// A cancellation checkpoint runs between every step. Cancellation
    /// observed before record creation stops the coordinator with no
    /// further remote side effects; already-uploaded blobs are orphans
    /// cleaned up out of band.
    pub async fn publish(
        &self,
        job: &CreationJob,
        store: &JobStore,
        cancel: &watch::Receiver<bool>,
    ) -> Result<PublishOutcome, CoordinatorError> {
        let mut payload = PublishPayload::new(job.id.clone(), job.kind);
        payload.title = job.title.clone();
        payload.body = job.body.clone();
        payload.link = job.link.clone();
        payload.tag_ids = job.tag_ids.clone();

        // Upload every publishable blob. BTreeMap order keeps this
        // deterministic (video before audio).
        for (slot, state) in &job.slots {
            if *slot == BlobSlot::Raw {
                continue;
            }
            let Some(relative) = state.path() else {
                continue;
            };

            checkpoint(cancel)?;

            let bytes = tokio::fs::read(store.blob_path(&job.id, relative))
                .await
                .map_err(shoebox_store::StoreError::from)?;
            let name = format!("{}/{}", job.id, relative.display());
            let url = self
                .uploader
                .upload(bytes, &name, content_type_for(&name))
                .await?;
            debug!(job_id = %job.id, slot = %slot, %url, "Blob uploaded");

            match slot {
                BlobSlot::Video => payload.video_url = Some(url),
                BlobSlot::Audio => payload.audio_url = Some(url),
                BlobSlot::Image => payload.image_url = Some(url),
                BlobSlot::File => payload.file_url = Some(url),
                BlobSlot::Raw => {}
            }
        }

        // Enrichment is best effort; failures are logged and swallowed.
        checkpoint(cancel)?;
        match self.describer.describe(job).await {
            Ok(description) => payload.description = Some(description),
            Err(e) => warn!(job_id = %job.id, "Content description failed: {e:#}"),
        }

        checkpoint(cancel)?;
        if payload.title.is_none() {
            match self.titler.title(job).await {
                Ok(title) => payload.title = Some(title),
                Err(e) => warn!(job_id = %job.id, "Title generation failed: {e:#}"),
            }
        }

        // Last chance to observe cancellation before the canonical remote
        // record comes into existence.
        checkpoint(cancel)?;
        let remote = self.publisher.create_record(&payload).await?;
        debug!(job_id = %job.id, remote_id = %remote.id, "Remote record created");

        checkpoint(cancel)?;
        if !job.tag_ids.is_empty() {
            if let Err(e) = self.tags.associate(&job.id, &job.tag_ids).await {
                warn!(job_id = %job.id, "Tag association failed: {e:#}");
            }
        }

        Ok(PublishOutcome { remote, payload })
    }
}

fn checkpoint(cancel: &watch::Receiver<bool>) -> Result<(), CoordinatorError> {
    if *cancel.borrow() {
        Err(CoordinatorError::Cancelled)
    } else {
        Ok(())
    }
}

/// Content type by file extension (upload metadata only).
fn content_type_for(name: &str) -> &'static str {
    if name.ends_with(".mp4") {
        "video/mp4"
    } else if name.ends_with(".m4a") {
        "audio/mp4"
    } else if name.ends_with(".jpg") || name.ends_with(".jpeg") {
        "image/jpeg"
    } else if name.ends_with(".png") {
        "image/png"
    } else {
        "application/octet-stream"
    }
}
