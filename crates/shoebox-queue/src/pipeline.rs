//! Per-job blob preparation.
//!
//! Flushes raw buffers and produces the transcoded blobs each content kind
//! needs before publish. Every step re-checks durable state first, so a
//! retry or resume picks up exactly where the last attempt stopped without
//! re-transcoding blobs that are already on disk.

use tokio::sync::watch;

use shoebox_media::{MediaClass, Transcoder};
use shoebox_models::{BlobSlot, ContentKind, CreationJob};
use shoebox_store::JobStore;

use crate::error::{QueueError, QueueResult};

/// Prepare all blobs a job needs for publish.
///
/// A cancellation checkpoint runs before every transcode and every disk
/// write; cancellation observed here aborts with no further side effects.
pub async fn prepare_blobs(
    job: &mut CreationJob,
    store: &JobStore,
    transcoder: &dyn Transcoder,
    cancel: &watch::Receiver<bool>,
) -> QueueResult<()> {
    // Flush in-memory buffers first so the raw input survives a crash.
    for slot in job.buffered_slots() {
        checkpoint(cancel)?;
        let Some(bytes) = job.slots.get(&slot).and_then(|s| s.bytes()).map(<[u8]>::to_vec)
        else {
            continue;
        };
        store.write_blob_if_absent(job, slot, &bytes).await?;
    }

    match job.kind {
        // Nothing to transcode; a photo's raw bytes are its image and an
        // embed's screenshot arrives pre-rendered.
        ContentKind::Text | ContentKind::Photo | ContentKind::Embed => {}

        ContentKind::Video => {
            let raw = read_required(store, job, BlobSlot::Raw).await?;
            transcode_video(job, store, transcoder, &raw, cancel).await?;
        }

        ContentKind::Voice => {
            if !blob_on_disk(store, job, BlobSlot::Audio).await? {
                let raw = read_required(store, job, BlobSlot::Raw).await?;
                let ext = source_ext(job);
                checkpoint(cancel)?;
                let audio = transcoder.compress_audio(&raw, &ext).await?;
                checkpoint(cancel)?;
                store.write_blob_if_absent(job, BlobSlot::Audio, &audio).await?;
            }
        }

        ContentKind::Import => {
            let raw = read_required(store, job, BlobSlot::File).await?;
            checkpoint(cancel)?;
            match transcoder.classify(&raw).await? {
                MediaClass::Video => transcode_video(job, store, transcoder, &raw, cancel).await?,
                MediaClass::Audio => {
                    if !blob_on_disk(store, job, BlobSlot::Audio).await? {
                        let ext = source_ext(job);
                        checkpoint(cancel)?;
                        let audio = transcoder.compress_audio(&raw, &ext).await?;
                        checkpoint(cancel)?;
                        store.write_blob_if_absent(job, BlobSlot::Audio, &audio).await?;
                    }
                }
                // Opaque file: published as-is.
                MediaClass::Other => {}
            }
        }
    }

    Ok(())
}

/// Produce the compressed video and its audio blob (extracted, or
/// synthesized silence for a mute source).
async fn transcode_video(
    job: &mut CreationJob,
    store: &JobStore,
    transcoder: &dyn Transcoder,
    raw: &[u8],
    cancel: &watch::Receiver<bool>,
) -> QueueResult<()> {
    if !blob_on_disk(store, job, BlobSlot::Video).await? {
        checkpoint(cancel)?;
        let video = transcoder.compress_video(raw).await?;
        checkpoint(cancel)?;
        store.write_blob_if_absent(job, BlobSlot::Video, &video).await?;
    }

    if !blob_on_disk(store, job, BlobSlot::Audio).await? {
        checkpoint(cancel)?;
        let audio = transcoder.extract_or_synthesize_silence(raw).await?;
        checkpoint(cancel)?;
        store.write_blob_if_absent(job, BlobSlot::Audio, &audio).await?;
    }

    Ok(())
}

/// Whether a slot's blob is durable and its file actually on disk.
async fn blob_on_disk(
    store: &JobStore,
    job: &CreationJob,
    slot: BlobSlot,
) -> QueueResult<bool> {
    match job.slot_path(slot) {
        Some(relative) => {
            let exists = tokio::fs::try_exists(store.blob_path(&job.id, relative))
                .await
                .map_err(shoebox_store::StoreError::from)?;
            Ok(exists)
        }
        None => Ok(false),
    }
}

/// Read a slot's bytes, failing the job if they are gone.
///
/// A missing required blob means the raw input never became durable (the
/// process died before the first flush); the job cannot make progress.
async fn read_required(
    store: &JobStore,
    job: &CreationJob,
    slot: BlobSlot,
) -> QueueResult<Vec<u8>> {
    match store.read_blob(job, slot).await {
        Ok(Some(bytes)) => Ok(bytes),
        Ok(None) => Err(QueueError::MissingBlob(slot)),
        Err(e) => Err(e.into()),
    }
}

fn source_ext(job: &CreationJob) -> String {
    job.source_ext.clone().unwrap_or_else(|| "bin".to_string())
}

pub(crate) fn checkpoint(cancel: &watch::Receiver<bool>) -> QueueResult<()> {
    if *cancel.borrow() {
        Err(QueueError::Cancelled)
    } else {
        Ok(())
    }
}
