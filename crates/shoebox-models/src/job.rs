//! Creation job definitions.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// Unique identifier for a creation job.
///
/// The same id correlates the on-disk descriptor, the local record row and
/// the in-memory task handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Kind of content a job creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    /// Plain text note
    Text,
    /// Single photo
    Photo,
    /// Video clip
    Video,
    /// Voice recording
    Voice,
    /// Link embed (URL plus optional screenshot)
    Embed,
    /// File downloaded from elsewhere
    Import,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Text => "text",
            ContentKind::Photo => "photo",
            ContentKind::Video => "video",
            ContentKind::Voice => "voice",
            ContentKind::Embed => "embed",
            ContentKind::Import => "import",
        }
    }

    /// Minimal set of local blobs a record of this kind needs to be usable
    /// offline. Synthesized silence counts for the `Audio` slot.
    pub fn required_slots(&self) -> &'static [BlobSlot] {
        match self {
            ContentKind::Text => &[],
            ContentKind::Photo => &[BlobSlot::Image],
            ContentKind::Video => &[BlobSlot::Video, BlobSlot::Audio],
            ContentKind::Voice => &[BlobSlot::Audio],
            ContentKind::Embed => &[],
            ContentKind::Import => &[BlobSlot::File],
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Named blob slot on a job.
///
/// Slot names double as on-disk file stems inside the job directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlobSlot {
    /// Source bytes exactly as captured
    Raw,
    /// Transcoded video
    Video,
    /// Transcoded or synthesized audio
    Audio,
    /// Photo or screenshot
    Image,
    /// Imported file passed through untouched
    File,
}

impl BlobSlot {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlobSlot::Raw => "raw",
            BlobSlot::Video => "video",
            BlobSlot::Audio => "audio",
            BlobSlot::Image => "image",
            BlobSlot::File => "file",
        }
    }
}

impl fmt::Display for BlobSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// State of a single blob slot.
///
/// A `Persisted` path is only ever constructed after the bytes behind it
/// have been durably flushed; the descriptor never references a blob that
/// does not exist. `Buffered` bytes are in-memory only and persist to disk
/// as `pending`, so a descriptor round-trip drops the buffer but keeps the
/// slot declared.
#[derive(Debug, Clone, PartialEq)]
pub enum SlotState {
    /// Bytes held in memory, not yet durable
    Buffered(Vec<u8>),
    /// Slot declared but its bytes were never flushed (e.g. after a crash)
    Pending,
    /// Relative path under the job directory, bytes flushed
    Persisted(PathBuf),
}

impl SlotState {
    /// Relative path if the slot is durable.
    pub fn path(&self) -> Option<&Path> {
        match self {
            SlotState::Persisted(p) => Some(p),
            _ => None,
        }
    }

    /// In-memory bytes if the slot is still buffered.
    pub fn bytes(&self) -> Option<&[u8]> {
        match self {
            SlotState::Buffered(b) => Some(b),
            _ => None,
        }
    }

    pub fn is_durable(&self) -> bool {
        matches!(self, SlotState::Persisted(_))
    }
}

/// On-disk representation of a slot state.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
enum SlotStateRepr {
    Pending,
    Persisted { path: PathBuf },
}

impl Serialize for SlotState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let repr = match self {
            SlotState::Buffered(_) | SlotState::Pending => SlotStateRepr::Pending,
            SlotState::Persisted(path) => SlotStateRepr::Persisted { path: path.clone() },
        };
        repr.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SlotState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match SlotStateRepr::deserialize(deserializer)? {
            SlotStateRepr::Pending => SlotState::Pending,
            SlotStateRepr::Persisted { path } => SlotState::Persisted(path),
        })
    }
}

/// Preview metadata available at enqueue time, before any transcoding.
///
/// Points at raw local files already on disk (e.g. a screenshot captured up
/// front) so the draft record can render immediately.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreviewMeta {
    /// Pre-existing local image to render while the job is in flight
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_path: Option<PathBuf>,

    /// Media duration in seconds, when known up front
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
}

/// Raw media buffers handed to `enqueue` alongside a job.
///
/// In-memory only; buffers become durable blobs once the background task
/// flushes them through the job store.
#[derive(Debug, Clone, Default)]
pub struct JobMedia {
    buffers: HashMap<BlobSlot, Vec<u8>>,
}

impl JobMedia {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach raw bytes for a slot.
    pub fn with(mut self, slot: BlobSlot, bytes: Vec<u8>) -> Self {
        self.buffers.insert(slot, bytes);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn into_buffers(self) -> HashMap<BlobSlot, Vec<u8>> {
        self.buffers
    }
}

/// A pending creation unit, serializable to the on-disk job descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreationJob {
    /// Unique job ID
    pub id: JobId,

    /// Content kind
    pub kind: ContentKind,

    /// User-provided title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Free-form text body
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,

    /// Link URL (embeds and imports)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,

    /// File extension of the raw source, e.g. "mov" or "m4a"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_ext: Option<String>,

    /// Named blob slots
    #[serde(default)]
    pub slots: BTreeMap<BlobSlot, SlotState>,

    /// Selected tag ids
    #[serde(default)]
    pub tag_ids: Vec<String>,

    /// Preview metadata available before transcoding
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<PreviewMeta>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl CreationJob {
    /// Create a new empty job of the given kind.
    pub fn new(kind: ContentKind) -> Self {
        Self {
            id: JobId::new(),
            kind,
            title: None,
            body: None,
            link: None,
            source_ext: None,
            slots: BTreeMap::new(),
            tag_ids: Vec::new(),
            preview: None,
            created_at: Utc::now(),
        }
    }

    /// Merge raw media buffers into the job's slots.
    ///
    /// Buffers only fill slots that are not already durable, so a retry
    /// never clobbers blobs that were flushed by an earlier attempt.
    pub fn merge_media(&mut self, media: JobMedia) {
        for (slot, bytes) in media.into_buffers() {
            match self.slots.get(&slot) {
                Some(state) if state.is_durable() => {}
                _ => {
                    self.slots.insert(slot, SlotState::Buffered(bytes));
                }
            }
        }
    }

    /// Relative path of a durable slot, if any.
    pub fn slot_path(&self, slot: BlobSlot) -> Option<&Path> {
        self.slots.get(&slot).and_then(|s| s.path())
    }

    /// Mark a slot durable at the given relative path.
    ///
    /// Callers must only do this after the bytes have been flushed to disk.
    pub fn set_slot_persisted(&mut self, slot: BlobSlot, path: PathBuf) {
        self.slots.insert(slot, SlotState::Persisted(path));
    }

    /// Slots still carrying in-memory buffers, in stable order.
    pub fn buffered_slots(&self) -> Vec<BlobSlot> {
        self.slots
            .iter()
            .filter(|(_, state)| matches!(state, SlotState::Buffered(_)))
            .map(|(slot, _)| *slot)
            .collect()
    }
}
