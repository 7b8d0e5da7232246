//! Shared data models for the shoebox capture pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Creation jobs and their blob slots
//! - Content kinds and their playability requirements
//! - The user-visible local record and its status state machine
//! - The publish payload / remote record contract

pub mod job;
pub mod publish;
pub mod record;

// Re-export common types
pub use job::{BlobSlot, ContentKind, CreationJob, JobId, JobMedia, PreviewMeta, SlotState};
pub use publish::{PublishPayload, RemoteRecord};
pub use record::{LocalRecord, RecordStatus};
