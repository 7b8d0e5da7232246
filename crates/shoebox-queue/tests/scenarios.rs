//! End-to-end pipeline scenarios with fake capabilities.
//!
//! The fake transcoder transforms bytes with recognizable prefixes instead
//! of running FFmpeg, so every durable-state and state-machine guarantee is
//! exercised without media tooling installed.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use shoebox_media::{MediaClass, MediaError, MediaResult, Transcoder};
use shoebox_models::{
    BlobSlot, ContentKind, CreationJob, JobId, JobMedia, LocalRecord, PublishPayload,
    RecordStatus, RemoteRecord,
};
use shoebox_publish::{
    ContentDescriber, LocalRecordFinalizer, PublishError, Publisher, TagService, Titler,
    UploadError, Uploader,
};
use shoebox_records::{MemoryRecordStore, RecordStore};
use shoebox_queue::{JobQueueCoordinator, QueueConfig};

/// Byte-prefix transcoder with a configurable delay (to widen race windows)
/// and concurrency accounting.
struct FakeTranscoder {
    delay: Duration,
    active: AtomicUsize,
    max_active: AtomicUsize,
    video_compressions: AtomicUsize,
}

impl FakeTranscoder {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            video_compressions: AtomicUsize::new(0),
        }
    }

    async fn working(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    async fn compress_video(&self, raw: &[u8]) -> MediaResult<Vec<u8>> {
        self.video_compressions.fetch_add(1, Ordering::SeqCst);
        self.working().await;
        Ok([b"compressed-video:", raw].concat())
    }

    async fn compress_audio(&self, raw: &[u8], _source_ext: &str) -> MediaResult<Vec<u8>> {
        self.working().await;
        Ok([b"compressed-audio:", raw].concat())
    }

    async fn extract_audio_track(&self, video: &[u8]) -> MediaResult<Vec<u8>> {
        self.working().await;
        if video.starts_with(b"MUTE") {
            return Err(MediaError::NoAudioTrack);
        }
        Ok([b"extracted-audio:", video].concat())
    }

    async fn extract_or_synthesize_silence(&self, video: &[u8]) -> MediaResult<Vec<u8>> {
        match self.extract_audio_track(video).await {
            Ok(bytes) => Ok(bytes),
            Err(MediaError::NoAudioTrack) => Ok(b"synthesized-silence".to_vec()),
            Err(e) => Err(e),
        }
    }

    async fn classify(&self, raw: &[u8]) -> MediaResult<MediaClass> {
        if raw.starts_with(b"VID") || raw.starts_with(b"MUTE") {
            Ok(MediaClass::Video)
        } else if raw.starts_with(b"AUD") {
            Ok(MediaClass::Audio)
        } else {
            Ok(MediaClass::Other)
        }
    }
}

/// Uploader that can be told to refuse audio blobs (and later fixed).
#[derive(Default)]
struct ScriptedUploader {
    fail_audio: AtomicBool,
    uploads: Mutex<Vec<String>>,
}

#[async_trait]
impl Uploader for ScriptedUploader {
    async fn upload(
        &self,
        _bytes: Vec<u8>,
        name: &str,
        _content_type: &str,
    ) -> Result<String, UploadError> {
        if self.fail_audio.load(Ordering::SeqCst) && name.contains("audio") {
            return Err(UploadError::Transport("audio upload refused".to_string()));
        }
        self.uploads.lock().unwrap().push(name.to_string());
        Ok(format!("https://cdn.example/{}", name))
    }
}

#[derive(Default)]
struct CountingPublisher {
    created: Mutex<Vec<PublishPayload>>,
    deletes: AtomicUsize,
}

#[async_trait]
impl Publisher for CountingPublisher {
    async fn create_record(&self, payload: &PublishPayload) -> Result<RemoteRecord, PublishError> {
        self.created.lock().unwrap().push(payload.clone());
        Ok(RemoteRecord {
            id: payload.record_id.to_string(),
            video_url: payload.video_url.clone(),
            audio_url: payload.audio_url.clone(),
            image_url: payload.image_url.clone(),
            file_url: payload.file_url.clone(),
        })
    }

    async fn delete_record(&self, _id: &JobId) -> Result<(), PublishError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FakeDescriber;

#[async_trait]
impl ContentDescriber for FakeDescriber {
    async fn describe(&self, job: &CreationJob) -> anyhow::Result<String> {
        Ok(format!("a {} item", job.kind))
    }
}

struct FakeTitler;

#[async_trait]
impl Titler for FakeTitler {
    async fn title(&self, _job: &CreationJob) -> anyhow::Result<String> {
        Ok("Generated title".to_string())
    }
}

#[derive(Default)]
struct RecordingTags {
    calls: Mutex<Vec<Vec<String>>>,
}

#[async_trait]
impl TagService for RecordingTags {
    async fn associate(&self, _record_id: &JobId, tag_ids: &[String]) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(tag_ids.to_vec());
        Ok(())
    }
}

struct Harness {
    coordinator: JobQueueCoordinator,
    records: Arc<MemoryRecordStore>,
    transcoder: Arc<FakeTranscoder>,
    uploader: Arc<ScriptedUploader>,
    publisher: Arc<CountingPublisher>,
    tags: Arc<RecordingTags>,
    dir: TempDir,
}

impl Harness {
    fn new(transcode_delay: Duration) -> Self {
        Self::attach(
            TempDir::new().unwrap(),
            Arc::new(MemoryRecordStore::new()),
            transcode_delay,
        )
    }

    /// Build a coordinator over pre-existing durable state, as a fresh
    /// process start would.
    fn attach(dir: TempDir, records: Arc<MemoryRecordStore>, transcode_delay: Duration) -> Self {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let transcoder = Arc::new(FakeTranscoder::new(transcode_delay));
        let uploader = Arc::new(ScriptedUploader::default());
        let publisher = Arc::new(CountingPublisher::default());
        let tags = Arc::new(RecordingTags::default());

        let coordinator = JobQueueCoordinator::with_transcoder(
            QueueConfig::rooted_at(dir.path()),
            records.clone(),
            transcoder.clone(),
            uploader.clone(),
            publisher.clone(),
            Arc::new(FakeDescriber),
            Arc::new(FakeTitler),
            tags.clone(),
        );

        Self {
            coordinator,
            records,
            transcoder,
            uploader,
            publisher,
            tags,
            dir,
        }
    }

    fn job_dir(&self, id: &JobId) -> std::path::PathBuf {
        self.dir.path().join("jobs").join(id.as_str())
    }

    fn media_path(&self, id: &JobId, file: &str) -> std::path::PathBuf {
        self.dir.path().join("media").join(id.as_str()).join(file)
    }

    async fn wait_for_status(&self, id: &JobId, status: RecordStatus) -> LocalRecord {
        for _ in 0..500 {
            if let Some(record) = self.records.get(id).await.unwrap() {
                if record.status == status {
                    return record;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("record {} never reached {}", id, status);
    }

    async fn wait_until_idle(&self, id: &JobId) {
        for _ in 0..500 {
            if !self.coordinator.is_processing(id).await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task for {} never finished", id);
    }
}

fn photo_job(tags: &[&str]) -> (CreationJob, JobMedia) {
    let mut job = CreationJob::new(ContentKind::Photo);
    job.title = Some("beach day".to_string());
    job.tag_ids = tags.iter().map(|t| t.to_string()).collect();
    let media = JobMedia::new().with(BlobSlot::Image, b"\xFF\xD8jpeg".to_vec());
    (job, media)
}

fn video_job(raw: &[u8]) -> (CreationJob, JobMedia) {
    let mut job = CreationJob::new(ContentKind::Video);
    job.source_ext = Some("mov".to_string());
    let media = JobMedia::new().with(BlobSlot::Raw, raw.to_vec());
    (job, media)
}

// Scenario A: a photo goes Creating → Synced with its local path pointing
// at the published blob and the remote URL recorded.
#[tokio::test]
async fn photo_enqueue_reaches_synced() {
    let harness = Harness::new(Duration::from_millis(1));
    let (job, media) = photo_job(&["summer"]);
    let id = job.id.clone();

    harness.coordinator.enqueue(job, media).await.unwrap();

    // The draft is visible immediately, before any pipeline work settles.
    let draft = harness.records.get(&id).await.unwrap().unwrap();
    assert_eq!(draft.status, RecordStatus::Creating);

    let record = harness.wait_for_status(&id, RecordStatus::Synced).await;
    assert_eq!(
        record.image_path,
        Some(std::path::Path::new(id.as_str()).join("image.jpg"))
    );
    assert!(record.remote_image_url.as_deref().unwrap().contains("image.jpg"));
    assert!(harness.media_path(&id, "image.jpg").exists());
    // Scratch space and descriptor are gone: blobs belong to the media
    // store now.
    assert!(!harness.job_dir(&id).exists());
    // Exactly one blob went out, and tag association went through.
    assert_eq!(harness.uploader.uploads.lock().unwrap().len(), 1);
    assert_eq!(harness.tags.calls.lock().unwrap().len(), 1);
}

// A Synced record always satisfies verification for its kind.
#[tokio::test]
async fn synced_record_is_verifiable() {
    let harness = Harness::new(Duration::from_millis(1));
    let (job, media) = video_job(b"VIDraw-bytes");
    let id = job.id.clone();

    harness.coordinator.enqueue(job, media).await.unwrap();
    let record = harness.wait_for_status(&id, RecordStatus::Synced).await;

    let finalizer = LocalRecordFinalizer::new(
        harness.records.clone(),
        harness.dir.path().join("media"),
    );
    assert!(finalizer.verify(&record, record.kind).await);
}

// Scenario B: the audio upload fails → Failed with durable state intact;
// a retry after fixing the uploader succeeds without re-transcoding.
#[tokio::test]
async fn failed_upload_retries_without_retranscoding() {
    let harness = Harness::new(Duration::from_millis(1));
    harness.uploader.fail_audio.store(true, Ordering::SeqCst);

    let (job, media) = video_job(b"VIDraw-bytes");
    let id = job.id.clone();
    harness.coordinator.enqueue(job, media).await.unwrap();

    let record = harness.wait_for_status(&id, RecordStatus::Failed).await;
    assert!(record.error_message.as_deref().unwrap().contains("audio upload refused"));

    // Transcoded blobs and the descriptor survived the failure.
    assert!(harness.job_dir(&id).join("video.mp4").exists());
    assert!(harness.job_dir(&id).join("audio.m4a").exists());
    assert!(harness.job_dir(&id).join("job.json").exists());
    assert_eq!(harness.transcoder.video_compressions.load(Ordering::SeqCst), 1);

    // Fix the uploader and retry.
    harness.uploader.fail_audio.store(false, Ordering::SeqCst);
    harness.coordinator.retry(&id).await.unwrap();

    let record = harness.wait_for_status(&id, RecordStatus::Synced).await;
    assert!(record.remote_video_url.is_some());
    assert!(record.remote_audio_url.is_some());
    // The video blob was already durable; the retry never re-encoded it.
    assert_eq!(harness.transcoder.video_compressions.load(Ordering::SeqCst), 1);
}

// Scenario C (fake-transcoder variant): a mute video still settles with an
// audio blob, backed by synthesized silence.
#[tokio::test]
async fn mute_video_gets_synthesized_silence() {
    let harness = Harness::new(Duration::from_millis(1));
    let (job, media) = video_job(b"MUTEraw-bytes");
    let id = job.id.clone();

    harness.coordinator.enqueue(job, media).await.unwrap();
    let record = harness.wait_for_status(&id, RecordStatus::Synced).await;

    assert!(record.audio_path.is_some());
    let audio = tokio::fs::read(harness.media_path(&id, "audio.m4a"))
        .await
        .unwrap();
    assert_eq!(audio, b"synthesized-silence");
}

// Scenario D: discard right after enqueue leaves nothing behind and fires
// at most one best-effort remote delete.
#[tokio::test]
async fn discard_shortly_after_enqueue_leaves_nothing() {
    let harness = Harness::new(Duration::from_millis(100));
    let (job, media) = video_job(b"VIDraw-bytes");
    let id = job.id.clone();

    harness.coordinator.enqueue(job, media).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    harness.coordinator.discard(&id).await.unwrap();

    harness.wait_until_idle(&id).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(harness.records.get(&id).await.unwrap().is_none());
    assert!(!harness.job_dir(&id).exists());
    assert!(harness.publisher.created.lock().unwrap().is_empty());
    assert_eq!(harness.publisher.deletes.load(Ordering::SeqCst), 1);
}

// Discard is idempotent.
#[tokio::test]
async fn discard_twice_is_harmless() {
    let harness = Harness::new(Duration::from_millis(50));
    let (job, media) = photo_job(&[]);
    let id = job.id.clone();

    harness.coordinator.enqueue(job, media).await.unwrap();
    harness.coordinator.discard(&id).await.unwrap();
    harness.coordinator.discard(&id).await.unwrap();

    harness.wait_until_idle(&id).await;
    assert!(harness.records.get(&id).await.unwrap().is_none());
}

// Crash recovery: durable state left by a killed process resumes to Synced.
#[tokio::test]
async fn resume_incomplete_finishes_abandoned_job() {
    let dir = TempDir::new().unwrap();
    let records = Arc::new(MemoryRecordStore::new());

    // Simulate the previous process: descriptor + raw blob durable, record
    // Creating, then the process dies with no in-memory state.
    let store = shoebox_store::JobStore::new(dir.path().join("jobs"));
    let mut job = CreationJob::new(ContentKind::Voice);
    job.source_ext = Some("m4a".to_string());
    store
        .write_blob_if_absent(&mut job, BlobSlot::Raw, b"AUDraw-voice")
        .await
        .unwrap();
    records.insert(&LocalRecord::from_job(&job)).await.unwrap();
    let id = job.id.clone();
    drop(store);

    let harness = Harness::attach(dir, records, Duration::from_millis(1));

    let resumed = harness.coordinator.resume_incomplete().await.unwrap();
    assert_eq!(resumed, 1);

    let record = harness.wait_for_status(&id, RecordStatus::Synced).await;
    assert!(record.audio_path.is_some());
    assert!(record.remote_audio_url.is_some());
}

// Crash recovery: a Creating record whose descriptor is gone settles as
// Failed instead of staying Creating forever.
#[tokio::test]
async fn resume_incomplete_fails_orphan_records() {
    let harness = Harness::new(Duration::from_millis(1));

    let job = CreationJob::new(ContentKind::Photo);
    let id = job.id.clone();
    harness
        .records
        .insert(&LocalRecord::from_job(&job))
        .await
        .unwrap();

    let resumed = harness.coordinator.resume_incomplete().await.unwrap();
    assert_eq!(resumed, 0);

    let record = harness.wait_for_status(&id, RecordStatus::Failed).await;
    assert!(record.error_message.as_deref().unwrap().contains("descriptor"));
}

// Retry with a missing descriptor settles Failed and never throws.
#[tokio::test]
async fn retry_without_descriptor_fails_record() {
    let harness = Harness::new(Duration::from_millis(1));

    let job = CreationJob::new(ContentKind::Photo);
    let id = job.id.clone();
    harness
        .records
        .insert(&LocalRecord::from_job(&job))
        .await
        .unwrap();

    harness.coordinator.retry(&id).await.unwrap();
    harness.wait_for_status(&id, RecordStatus::Failed).await;
}

// At-most-one-task: enqueue followed by an immediate retry never runs two
// transcodes of the same raw input concurrently; the replacement task
// chains behind the cancelled one.
#[tokio::test]
async fn enqueue_then_retry_never_overlaps() {
    let harness = Harness::new(Duration::from_millis(50));
    let (job, media) = video_job(b"VIDraw-bytes");
    let id = job.id.clone();

    harness.coordinator.enqueue(job, media).await.unwrap();
    // Let the first task flush the raw blob and enter its transcode.
    tokio::time::sleep(Duration::from_millis(10)).await;
    harness.coordinator.retry(&id).await.unwrap();

    harness.wait_for_status(&id, RecordStatus::Synced).await;
    harness.wait_until_idle(&id).await;

    // The first task's transcode was cancelled before its write, so the
    // retry re-encoded; the two encodes never ran at the same time.
    assert_eq!(harness.transcoder.max_active.load(Ordering::SeqCst), 1);
    assert_eq!(harness.transcoder.video_compressions.load(Ordering::SeqCst), 2);
    // Only one task made it to publish.
    assert_eq!(harness.publisher.created.lock().unwrap().len(), 1);
}

// The enqueue-during-cancellation race: discarding a job and immediately
// re-enqueuing the same id runs exactly the new task to completion.
#[tokio::test]
async fn reenqueue_same_id_after_discard() {
    let harness = Harness::new(Duration::from_millis(50));
    let (job, media) = video_job(b"VIDraw-bytes");
    let id = job.id.clone();

    harness.coordinator.enqueue(job, media).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    harness.coordinator.discard(&id).await.unwrap();

    // Same id, fresh content, while the old task is still winding down.
    let (mut job2, media2) = photo_job(&[]);
    job2.id = id.clone();
    harness.coordinator.enqueue(job2, media2).await.unwrap();

    let record = harness.wait_for_status(&id, RecordStatus::Synced).await;
    assert_eq!(record.kind, ContentKind::Photo);
    harness.wait_until_idle(&id).await;

    // The discarded video task never published; only the photo did.
    let created = harness.publisher.created.lock().unwrap();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].kind, ContentKind::Photo);
}

// An imported file that probes as neither video nor audio is passed through
// untouched and published as a file.
#[tokio::test]
async fn import_of_opaque_file_passes_through() {
    let harness = Harness::new(Duration::from_millis(1));

    let mut job = CreationJob::new(ContentKind::Import);
    job.source_ext = Some("pdf".to_string());
    let id = job.id.clone();
    let media = JobMedia::new().with(BlobSlot::File, b"%PDF-1.7 paper".to_vec());

    harness.coordinator.enqueue(job, media).await.unwrap();
    let record = harness.wait_for_status(&id, RecordStatus::Synced).await;

    assert!(record.file_path.is_some());
    assert!(record.remote_file_url.as_deref().unwrap().contains("file.pdf"));
    let bytes = tokio::fs::read(harness.media_path(&id, "file.pdf"))
        .await
        .unwrap();
    assert_eq!(bytes, b"%PDF-1.7 paper");
}

/// Tag service that deletes a blob file mid-publish, simulating a local
/// write that silently failed after the remote record was created.
struct SabotagingTags {
    victim: Mutex<Option<std::path::PathBuf>>,
}

#[async_trait]
impl TagService for SabotagingTags {
    async fn associate(&self, _record_id: &JobId, _tag_ids: &[String]) -> anyhow::Result<()> {
        let victim = self.victim.lock().unwrap().clone();
        if let Some(path) = victim {
            let _ = tokio::fs::remove_file(path).await;
        }
        Ok(())
    }
}

// Verification invariant: a record whose required blob vanished after a
// logically successful publish settles as Failed, never Synced.
#[tokio::test]
async fn verification_failure_settles_failed() {
    let dir = TempDir::new().unwrap();
    let records = Arc::new(MemoryRecordStore::new());
    let tags = Arc::new(SabotagingTags {
        victim: Mutex::new(None),
    });

    let coordinator = JobQueueCoordinator::with_transcoder(
        QueueConfig::rooted_at(dir.path()),
        records.clone(),
        Arc::new(FakeTranscoder::new(Duration::from_millis(1))),
        Arc::new(ScriptedUploader::default()),
        Arc::new(CountingPublisher::default()),
        Arc::new(FakeDescriber),
        Arc::new(FakeTitler),
        tags.clone(),
    );

    let (mut job, media) = video_job(b"VIDraw-bytes");
    job.tag_ids = vec!["travel".to_string()];
    let id = job.id.clone();
    let job_dir = dir.path().join("jobs").join(id.as_str());
    *tags.victim.lock().unwrap() = Some(job_dir.join("video.mp4"));

    coordinator.enqueue(job, media).await.unwrap();

    for _ in 0..500 {
        if let Some(record) = records.get(&id).await.unwrap() {
            assert_ne!(record.status, RecordStatus::Synced);
            if record.status == RecordStatus::Failed {
                assert!(record
                    .error_message
                    .as_deref()
                    .unwrap()
                    .to_lowercase()
                    .contains("verification"));
                // Descriptor preserved so the job can be retried.
                assert!(job_dir.join("job.json").exists());
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("record never settled Failed");
}

// Voice pipeline: raw recording is compressed and published as audio.
#[tokio::test]
async fn voice_recording_is_compressed_and_published() {
    let harness = Harness::new(Duration::from_millis(1));

    let mut job = CreationJob::new(ContentKind::Voice);
    job.source_ext = Some("wav".to_string());
    let id = job.id.clone();
    let media = JobMedia::new().with(BlobSlot::Raw, b"AUDraw-recording".to_vec());

    harness.coordinator.enqueue(job, media).await.unwrap();
    let record = harness.wait_for_status(&id, RecordStatus::Synced).await;

    let audio = tokio::fs::read(harness.media_path(&id, "audio.m4a"))
        .await
        .unwrap();
    assert_eq!(audio, b"compressed-audio:AUDraw-recording");
    // Enrichment landed on the record.
    assert_eq!(record.description.as_deref(), Some("a voice item"));
    assert_eq!(record.title.as_deref(), Some("Generated title"));
}
