//! The user-visible local record and its status state machine.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::{BlobSlot, ContentKind, CreationJob, JobId};
use crate::publish::RemoteRecord;

/// Record sync status.
///
/// `Creating` is the only transient state: `Creating → {Synced, Failed}`,
/// `Failed → Creating` via retry, any state → removed via discard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// Draft inserted at enqueue, pipeline still running
    #[default]
    Creating,
    /// Published remotely and verified locally playable
    Synced,
    /// Pipeline failed; durable job state kept for retry
    Failed,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Creating => "creating",
            RecordStatus::Synced => "synced",
            RecordStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RecordStatus::Synced | RecordStatus::Failed)
    }
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The user-visible draft, created synchronously at enqueue time.
///
/// Local paths are relative to the permanent media root. Before publish the
/// record renders from raw preview paths already on disk; at finalization
/// the paths are swapped to the transcoded blobs so what is shown locally
/// matches exactly what was uploaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalRecord {
    /// Correlation id, same as the job id
    pub id: JobId,

    /// Content kind
    pub kind: ContentKind,

    /// Sync status
    #[serde(default)]
    pub status: RecordStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,

    /// AI-generated description, best-effort
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_path: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_path: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_path: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,

    /// Remote record id once published
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_video_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_audio_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_image_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_file_url: Option<String>,

    #[serde(default)]
    pub tag_ids: Vec<String>,

    /// Error message when failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl LocalRecord {
    /// Build the draft record for a job, status `Creating`.
    ///
    /// Preview paths point at raw local files that already exist, so the
    /// record is renderable immediately.
    pub fn from_job(job: &CreationJob) -> Self {
        let now = Utc::now();
        Self {
            id: job.id.clone(),
            kind: job.kind,
            status: RecordStatus::Creating,
            title: job.title.clone(),
            body: job.body.clone(),
            link: job.link.clone(),
            description: None,
            video_path: None,
            audio_path: None,
            image_path: job.preview.as_ref().and_then(|p| p.image_path.clone()),
            file_path: None,
            remote_id: None,
            remote_video_url: None,
            remote_audio_url: None,
            remote_image_url: None,
            remote_file_url: None,
            tag_ids: job.tag_ids.clone(),
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Local path for a slot, if set.
    pub fn slot_path(&self, slot: BlobSlot) -> Option<&PathBuf> {
        match slot {
            BlobSlot::Video => self.video_path.as_ref(),
            BlobSlot::Audio => self.audio_path.as_ref(),
            BlobSlot::Image => self.image_path.as_ref(),
            BlobSlot::File => self.file_path.as_ref(),
            BlobSlot::Raw => None,
        }
    }

    /// Set the local path for a slot.
    pub fn set_slot_path(&mut self, slot: BlobSlot, path: PathBuf) {
        match slot {
            BlobSlot::Video => self.video_path = Some(path),
            BlobSlot::Audio => self.audio_path = Some(path),
            BlobSlot::Image => self.image_path = Some(path),
            BlobSlot::File => self.file_path = Some(path),
            BlobSlot::Raw => {}
        }
        self.updated_at = Utc::now();
    }

    /// Terminal success: record is published and locally playable.
    pub fn mark_synced(&mut self, remote: &RemoteRecord) {
        self.status = RecordStatus::Synced;
        self.remote_id = Some(remote.id.clone());
        self.remote_video_url = remote.video_url.clone();
        self.remote_audio_url = remote.audio_url.clone();
        self.remote_image_url = remote.image_url.clone();
        self.remote_file_url = remote.file_url.clone();
        self.error_message = None;
        self.updated_at = Utc::now();
    }

    /// Terminal failure; durable job state stays on disk for retry.
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = RecordStatus::Failed;
        self.error_message = Some(error.into());
        self.updated_at = Utc::now();
    }

    /// Back to `Creating` for a retry attempt.
    pub fn reset_for_retry(&mut self) {
        self.status = RecordStatus::Creating;
        self.error_message = None;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::PreviewMeta;

    fn photo_job() -> CreationJob {
        let mut job = CreationJob::new(ContentKind::Photo);
        job.title = Some("beach".to_string());
        job.tag_ids = vec!["summer".to_string()];
        job
    }

    #[test]
    fn test_from_job_is_creating() {
        let record = LocalRecord::from_job(&photo_job());
        assert_eq!(record.status, RecordStatus::Creating);
        assert!(!record.status.is_terminal());
        assert_eq!(record.title.as_deref(), Some("beach"));
        assert_eq!(record.tag_ids, vec!["summer".to_string()]);
    }

    #[test]
    fn test_preview_path_renders_immediately() {
        let mut job = CreationJob::new(ContentKind::Embed);
        job.preview = Some(PreviewMeta {
            image_path: Some(PathBuf::from("previews/shot.jpg")),
            duration_secs: None,
        });

        let record = LocalRecord::from_job(&job);
        assert_eq!(record.image_path, Some(PathBuf::from("previews/shot.jpg")));
    }

    #[test]
    fn test_status_transitions() {
        let mut record = LocalRecord::from_job(&photo_job());

        record.mark_failed("upload refused");
        assert_eq!(record.status, RecordStatus::Failed);
        assert_eq!(record.error_message.as_deref(), Some("upload refused"));

        record.reset_for_retry();
        assert_eq!(record.status, RecordStatus::Creating);
        assert!(record.error_message.is_none());

        let remote = RemoteRecord {
            id: record.id.to_string(),
            video_url: None,
            audio_url: None,
            image_url: Some("https://cdn.example/img.jpg".to_string()),
            file_url: None,
        };
        record.mark_synced(&remote);
        assert_eq!(record.status, RecordStatus::Synced);
        assert!(record.status.is_terminal());
        assert_eq!(record.remote_id.as_deref(), Some(record.id.as_str()));
        assert!(record.error_message.is_none());
    }
}
