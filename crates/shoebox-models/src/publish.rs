//! Publisher contract types.

use serde::{Deserialize, Serialize};

use crate::job::{ContentKind, JobId};

/// Payload for creating the canonical remote record.
///
/// The record id is client-generated (the job id), so a best-effort remote
/// delete can be issued for a discarded job even before publish completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishPayload {
    /// Client-generated record id, same as the job id
    pub record_id: JobId,

    pub kind: ContentKind,

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
    pub video_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,

    #[serde(default)]
    pub tag_ids: Vec<String>,
}

impl PublishPayload {
    /// Empty payload for a job id and kind; URLs filled in as uploads land.
    pub fn new(record_id: JobId, kind: ContentKind) -> Self {
        Self {
            record_id,
            kind,
            title: None,
            body: None,
            link: None,
            description: None,
            video_url: None,
            audio_url: None,
            image_url: None,
            file_url: None,
            tag_ids: Vec::new(),
        }
    }
}

/// The canonical remote record returned by the Publisher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteRecord {
    /// Remote record id
    pub id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_round_trip() {
        let mut payload = PublishPayload::new(JobId::from("job-1"), ContentKind::Video);
        payload.video_url = Some("https://cdn.example/v.mp4".to_string());
        payload.tag_ids = vec!["travel".to_string()];

        let json = serde_json::to_string(&payload).unwrap();
        let restored: PublishPayload = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.record_id.as_str(), "job-1");
        assert_eq!(restored.kind, ContentKind::Video);
        assert_eq!(restored.video_url, payload.video_url);
        assert_eq!(restored.tag_ids, payload.tag_ids);
    }
}
