//! FFmpeg CLI wrapper and transcode operations for shoebox.
//!
//! The pipeline operations are pure transformations over byte buffers:
//! inputs land in a scratch directory, FFmpeg runs over them, and the
//! output bytes are read back. Every operation that can play media either
//! produces audio or fails loudly, so playback code never special-cases
//! "no audio track".

pub mod command;
pub mod error;
pub mod fs_utils;
pub mod probe;
pub mod transcode;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use probe::{get_duration, probe_media, MediaInfo};
pub use transcode::{
    audio_bitrate_for, video_profile_for, MediaClass, MediaPipeline, Transcoder, VideoProfile,
};
