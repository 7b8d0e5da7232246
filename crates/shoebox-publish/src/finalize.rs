//! Local record finalization.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::fs;
use tracing::{info, warn};

use shoebox_media::fs_utils::move_file;
use shoebox_models::{BlobSlot, ContentKind, CreationJob, LocalRecord};
use shoebox_records::RecordStore;
use shoebox_store::JobStore;

use crate::coordinator::PublishOutcome;

/// Errors from finalization.
#[derive(Debug, Error)]
pub enum FinalizeError {
    #[error("Local verification failed: a required blob is missing")]
    VerificationFailed,

    #[error("Record store error: {0}")]
    Records(#[from] shoebox_records::RecordStoreError),

    #[error("Media error: {0}")]
    Media(#[from] shoebox_media::MediaError),

    #[error("Store error: {0}")]
    Store(#[from] shoebox_store::StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Performs the terminal state transition for a job's local record.
///
/// `Synced` is only ever reached through [`LocalRecordFinalizer::finalize`],
/// which verifies that every blob the record needs is actually on disk
/// first. A publish that nominally succeeded but left the local media
/// incomplete surfaces [`FinalizeError::VerificationFailed`], and the job
/// settles as `Failed` like any other pipeline error, preserving "`Synced`
/// implies locally playable".
pub struct LocalRecordFinalizer {
    records: Arc<dyn RecordStore>,
    /// Root of the permanent local media store
    media_root: PathBuf,
}

impl LocalRecordFinalizer {
    pub fn new(records: Arc<dyn RecordStore>, media_root: impl Into<PathBuf>) -> Self {
        Self {
            records,
            media_root: media_root.into(),
        }
    }

    /// Complete a successfully published job.
    ///
    /// Moves the published blobs out of job scratch into the permanent
    /// media store, swaps the record's local paths to the transcoded blobs
    /// (so what is shown locally matches exactly what was uploaded), then
    /// verifies and settles the record. On success the job descriptor and
    /// scratch directory are deleted; a verification failure is returned as
    /// an error, leaving the record unsettled and the descriptor in place
    /// for retry.
    pub async fn finalize(
        &self,
        job: &CreationJob,
        outcome: &PublishOutcome,
        store: &JobStore,
    ) -> Result<(), FinalizeError> {
        let Some(mut record) = self.records.get(&job.id).await? else {
            // Record already discarded; nothing to settle.
            return Ok(());
        };

        for (slot, state) in &job.slots {
            if *slot == BlobSlot::Raw {
                continue;
            }
            let Some(relative) = state.path() else {
                continue;
            };
            let Some(file_name) = relative.file_name() else {
                continue;
            };

            let src = store.blob_path(&job.id, relative);
            if !fs::try_exists(&src).await.unwrap_or(false) {
                // Descriptor references a blob that is not on disk; leave
                // the slot unset so verification settles this as Failed.
                warn!(job_id = %job.id, slot = %slot, "Blob missing at finalize");
                continue;
            }

            let dest_relative = Path::new(job.id.as_str()).join(file_name);
            move_file(src, self.media_root.join(&dest_relative)).await?;
            record.set_slot_path(*slot, dest_relative);
        }

        record.description = outcome.payload.description.clone();
        if record.title.is_none() {
            record.title = outcome.payload.title.clone();
        }

        if !self.verify(&record, record.kind).await {
            warn!(job_id = %job.id, "Published record failed local verification");
            return Err(FinalizeError::VerificationFailed);
        }

        record.mark_synced(&outcome.remote);
        self.records.update(&record).await?;
        store.delete(&job.id).await?;

        info!(job_id = %job.id, "Record synced");
        Ok(())
    }

    /// Check that a record is locally playable for its content kind.
    ///
    /// Every path the record references must exist on disk, and the kind's
    /// required slots must all be set (synthesized silence counts for
    /// `Audio`).
    pub async fn verify(&self, record: &LocalRecord, kind: ContentKind) -> bool {
        for slot in kind.required_slots() {
            match record.slot_path(*slot) {
                Some(path) => {
                    if !self.path_exists(path).await {
                        return false;
                    }
                }
                None => return false,
            }
        }

        for slot in [
            BlobSlot::Video,
            BlobSlot::Audio,
            BlobSlot::Image,
            BlobSlot::File,
        ] {
            if let Some(path) = record.slot_path(slot) {
                if !self.path_exists(path).await {
                    return false;
                }
            }
        }

        true
    }

    async fn path_exists(&self, relative: &Path) -> bool {
        // Absolute paths (e.g. a preview screenshot captured up front) pass
        // through `join` unchanged.
        fs::try_exists(self.media_root.join(relative))
            .await
            .unwrap_or(false)
    }

    /// Settle a failed job: record `Failed`, durable job state untouched so
    /// a retry resumes from exactly this point.
    pub async fn mark_failed(
        &self,
        id: &shoebox_models::JobId,
        error: &str,
    ) -> Result<(), FinalizeError> {
        let Some(mut record) = self.records.get(id).await? else {
            return Ok(());
        };
        record.mark_failed(error);
        self.records.update(&record).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shoebox_models::{JobId, RecordStatus, RemoteRecord};
    use shoebox_records::MemoryRecordStore;
    use tempfile::TempDir;

    fn outcome(id: &JobId) -> PublishOutcome {
        PublishOutcome {
            remote: RemoteRecord {
                id: id.to_string(),
                video_url: None,
                audio_url: None,
                image_url: Some("https://cdn.example/i.jpg".to_string()),
                file_url: None,
            },
            payload: shoebox_models::PublishPayload::new(id.clone(), ContentKind::Photo),
        }
    }

    async fn setup() -> (Arc<MemoryRecordStore>, JobStore, LocalRecordFinalizer, TempDir) {
        let dir = TempDir::new().unwrap();
        let records = Arc::new(MemoryRecordStore::new());
        let store = JobStore::new(dir.path().join("jobs"));
        let finalizer =
            LocalRecordFinalizer::new(records.clone(), dir.path().join("media"));
        (records, store, finalizer, dir)
    }

    #[tokio::test]
    async fn test_finalize_moves_blobs_and_syncs() {
        let (records, store, finalizer, dir) = setup().await;

        let mut job = CreationJob::new(ContentKind::Photo);
        store
            .write_blob_if_absent(&mut job, BlobSlot::Image, b"jpeg bytes")
            .await
            .unwrap();
        records.insert(&LocalRecord::from_job(&job)).await.unwrap();

        finalizer
            .finalize(&job, &outcome(&job.id), &store)
            .await
            .unwrap();

        let record = records.get(&job.id).await.unwrap().unwrap();
        assert_eq!(record.status, RecordStatus::Synced);
        assert_eq!(
            record.image_path,
            Some(Path::new(job.id.as_str()).join("image.jpg"))
        );
        // Ownership transferred: blob now lives under the media root and
        // the scratch directory is gone.
        assert!(dir
            .path()
            .join("media")
            .join(job.id.as_str())
            .join("image.jpg")
            .exists());
        assert!(store.load(&job.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unverifiable_record_errors_instead_of_syncing() {
        let (records, store, finalizer, _dir) = setup().await;

        // Simulate a silently failed local write: the descriptor claims an
        // image blob that never made it to disk.
        let mut job = CreationJob::new(ContentKind::Photo);
        job.set_slot_persisted(BlobSlot::Image, PathBuf::from("image.jpg"));
        store.persist(&job).await.unwrap();

        records.insert(&LocalRecord::from_job(&job)).await.unwrap();

        let result = finalizer.finalize(&job, &outcome(&job.id), &store).await;
        assert!(matches!(result, Err(FinalizeError::VerificationFailed)));

        // The record was never marked Synced; settling it as Failed is the
        // caller's job, like any other pipeline error.
        let record = records.get(&job.id).await.unwrap().unwrap();
        assert_eq!(record.status, RecordStatus::Creating);
        // Descriptor preserved for retry.
        assert!(store.load(&job.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_finalize_after_discard_is_noop() {
        let (_records, store, finalizer, _dir) = setup().await;
        let job = CreationJob::new(ContentKind::Text);

        // No record inserted: the job raced a discard.
        finalizer
            .finalize(&job, &outcome(&job.id), &store)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_verify_requires_kind_slots() {
        let (_records, _store, finalizer, _dir) = setup().await;

        let job = CreationJob::new(ContentKind::Video);
        let record = LocalRecord::from_job(&job);
        // Video requires both video and audio blobs; none are set.
        assert!(!finalizer.verify(&record, ContentKind::Video).await);
        // A text record needs nothing.
        assert!(finalizer.verify(&record, ContentKind::Text).await);
    }
}
