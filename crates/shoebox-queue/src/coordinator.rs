//! The job queue coordinator.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use shoebox_media::{MediaPipeline, Transcoder};
use shoebox_models::{CreationJob, JobId, JobMedia, LocalRecord};
use shoebox_publish::{
    ContentDescriber, LocalRecordFinalizer, PublishCoordinator, Publisher, TagService, Titler,
    Uploader,
};
use shoebox_records::RecordStore;
use shoebox_store::JobStore;

use crate::config::QueueConfig;
use crate::error::QueueResult;
use crate::logging::JobLogger;
use crate::pipeline::{self, checkpoint};
use crate::registry::TaskRegistry;

struct Inner {
    store: JobStore,
    records: Arc<dyn RecordStore>,
    transcoder: Arc<dyn Transcoder>,
    publish: PublishCoordinator,
    publisher: Arc<dyn Publisher>,
    finalizer: LocalRecordFinalizer,
    registry: TaskRegistry,
}

/// Top-level orchestrator for the creation pipeline.
///
/// The UI-facing operations (`enqueue`, `retry`, `discard`) are strictly
/// synchronous: a local record mutation plus a descriptor write, never a
/// wait on transcoding, network I/O or enrichment. All heavy work runs in
/// one cooperative background task per job id.
#[derive(Clone)]
pub struct JobQueueCoordinator {
    inner: Arc<Inner>,
}

impl JobQueueCoordinator {
    /// Coordinator backed by the FFmpeg pipeline, with the configured
    /// transcode timeout applied so a runaway encoder is killed instead of
    /// pinning its job forever.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: QueueConfig,
        records: Arc<dyn RecordStore>,
        uploader: Arc<dyn Uploader>,
        publisher: Arc<dyn Publisher>,
        describer: Arc<dyn ContentDescriber>,
        titler: Arc<dyn Titler>,
        tags: Arc<dyn TagService>,
    ) -> Self {
        let transcoder = Arc::new(MediaPipeline::new().with_timeout(config.transcode_timeout));
        Self::with_transcoder(
            config, records, transcoder, uploader, publisher, describer, titler, tags,
        )
    }

    /// Coordinator with a custom transcoder backend.
    #[allow(clippy::too_many_arguments)]
    pub fn with_transcoder(
        config: QueueConfig,
        records: Arc<dyn RecordStore>,
        transcoder: Arc<dyn Transcoder>,
        uploader: Arc<dyn Uploader>,
        publisher: Arc<dyn Publisher>,
        describer: Arc<dyn ContentDescriber>,
        titler: Arc<dyn Titler>,
        tags: Arc<dyn TagService>,
    ) -> Self {
        let publish = PublishCoordinator::new(
            uploader,
            Arc::clone(&publisher),
            describer,
            titler,
            tags,
        );
        let finalizer = LocalRecordFinalizer::new(Arc::clone(&records), config.media_dir.clone());

        Self {
            inner: Arc::new(Inner {
                store: JobStore::new(config.data_dir),
                records,
                transcoder,
                publish,
                publisher,
                finalizer,
                registry: TaskRegistry::new(),
            }),
        }
    }

    /// Create a content item.
    ///
    /// Synchronously inserts the `Creating` draft record together with its
    /// tag rows, persists the job descriptor, spawns the background task
    /// and returns without waiting for any of that work.
    pub async fn enqueue(&self, mut job: CreationJob, media: JobMedia) -> QueueResult<()> {
        job.merge_media(media);

        let record = LocalRecord::from_job(&job);
        self.inner.records.insert(&record).await?;
        self.inner.store.persist(&job).await?;

        debug!(job_id = %job.id, kind = %job.kind, "Job enqueued");
        self.spawn_task(job).await;
        Ok(())
    }

    /// Retry a failed job from its durable state.
    ///
    /// A missing or corrupt descriptor is unrecoverable: the record settles
    /// as `Failed` and no error escapes to the caller.
    pub async fn retry(&self, id: &JobId) -> QueueResult<()> {
        match self.inner.store.load(id).await {
            Ok(Some(job)) => {
                if let Some(mut record) = self.inner.records.get(id).await? {
                    record.reset_for_retry();
                    self.inner.records.update(&record).await?;
                } else {
                    debug!(job_id = %id, "Retry for a discarded record ignored");
                    return Ok(());
                }

                debug!(job_id = %id, "Job retrying");
                self.spawn_task(job).await;
            }
            Ok(None) => {
                warn!(job_id = %id, "Retry found no job descriptor");
                self.fail_record(id, "job descriptor missing").await;
            }
            Err(e) => {
                warn!(job_id = %id, "Retry found corrupt job descriptor: {e}");
                self.fail_record(id, "job descriptor corrupt").await;
            }
        }
        Ok(())
    }

    /// Discard a job: cancel its task, remove the record and its tag rows,
    /// delete the job directory, and fire one best-effort remote delete.
    ///
    /// Idempotent. The remote delete runs in its own task with its own
    /// lifetime; its failure cannot affect this call's outcome.
    pub async fn discard(&self, id: &JobId) -> QueueResult<()> {
        self.inner.registry.cancel(id).await;

        self.inner.records.delete(id).await?;
        self.inner.store.delete(id).await?;

        let publisher = Arc::clone(&self.inner.publisher);
        let remote_id = id.clone();
        tokio::spawn(async move {
            if let Err(e) = publisher.delete_record(&remote_id).await {
                debug!(job_id = %remote_id, "Best-effort remote delete failed: {e}");
            }
        });

        info!(job_id = %id, "Job discarded");
        Ok(())
    }

    /// Resume every job abandoned by a killed process.
    ///
    /// Run once at process start, before any user action is possible. Scans
    /// all `Creating` records; each one either respawns from its descriptor
    /// or settles as `Failed`. Returns the number of jobs respawned.
    pub async fn resume_incomplete(&self) -> QueueResult<usize> {
        let pending = self.inner.records.all_pending().await?;
        let mut resumed = 0;

        for record in pending {
            if self.inner.registry.is_running(&record.id).await {
                continue;
            }

            match self.inner.store.load(&record.id).await {
                Ok(Some(job)) => {
                    info!(job_id = %record.id, "Resuming incomplete job");
                    self.spawn_task(job).await;
                    resumed += 1;
                }
                Ok(None) => {
                    warn!(job_id = %record.id, "Incomplete record has no job descriptor");
                    self.fail_record(&record.id, "job descriptor missing").await;
                }
                Err(e) => {
                    warn!(job_id = %record.id, "Incomplete record has corrupt descriptor: {e}");
                    self.fail_record(&record.id, "job descriptor corrupt").await;
                }
            }
        }

        Ok(resumed)
    }

    /// Whether a worker currently owns this job id.
    pub async fn is_processing(&self, id: &JobId) -> bool {
        self.inner.registry.is_running(id).await
    }

    /// Spawn the background task for a job, replacing any existing task
    /// for the same id (cancel-then-replace, never both).
    async fn spawn_task(&self, job: CreationJob) {
        let this = self.clone();
        let id = job.id.clone();
        let task_id = job.id.clone();

        self.inner
            .registry
            .spawn(&id, move |cancel, generation| async move {
                this.run_job(job, cancel).await;
                this.inner.registry.finish(&task_id, generation).await;
            })
            .await;
    }

    async fn run_job(&self, mut job: CreationJob, cancel: watch::Receiver<bool>) {
        let logger = JobLogger::new(&job.id, "creation_pipeline");
        logger.log_start(job.kind.as_str());

        match self.process(&mut job, &cancel).await {
            Ok(()) => logger.log_completion("published and verified"),
            Err(e) if e.is_cancellation() => {
                // Discard races the cancellation and already removed the
                // record; no status mutation, no user-visible message.
                debug!(job_id = %job.id, "Job cancelled");
            }
            Err(e) => {
                // A task that was cancelled mid-step can surface the
                // aborted step's error instead of `Cancelled`; it must not
                // settle a record it no longer owns.
                if *cancel.borrow() {
                    debug!(job_id = %job.id, "Job cancelled during a failing step");
                    return;
                }

                logger.log_error(&e.to_string());
                if let Err(update_err) = self
                    .inner
                    .finalizer
                    .mark_failed(&job.id, &e.to_string())
                    .await
                {
                    logger.log_error(&format!("could not settle record: {update_err}"));
                }
            }
        }
    }

    /// The per-job pipeline: transcode, publish, finalize.
    async fn process(
        &self,
        job: &mut CreationJob,
        cancel: &watch::Receiver<bool>,
    ) -> QueueResult<()> {
        pipeline::prepare_blobs(job, &self.inner.store, self.inner.transcoder.as_ref(), cancel)
            .await?;

        let outcome = self
            .inner
            .publish
            .publish(job, &self.inner.store, cancel)
            .await?;

        checkpoint(cancel)?;
        self.inner
            .finalizer
            .finalize(job, &outcome, &self.inner.store)
            .await?;

        Ok(())
    }

    /// Settle a record as failed, swallowing store errors.
    async fn fail_record(&self, id: &JobId, error: &str) {
        if let Err(e) = self.inner.finalizer.mark_failed(id, error).await {
            warn!(job_id = %id, "Could not mark record failed: {e}");
        }
    }
}
