//! Transcode operations over byte buffers.
//!
//! Inputs are written into a scratch directory, FFmpeg runs over them, and
//! the output bytes are read back, so callers never deal in paths. Encode
//! profiles are picked by duration: short clips keep more quality, long
//! clips trade quality for a bounded output size.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::fs;
use tracing::debug;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::probe::{probe_media, MediaInfo};

/// Video encode profile.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoProfile {
    /// Constant rate factor (lower is higher quality)
    pub crf: u8,
    /// x264 preset
    pub preset: &'static str,
    /// Cap on output width in pixels, if any
    pub max_width: Option<u32>,
}

/// Pick a video encode profile by clip duration.
pub fn video_profile_for(duration_secs: f64) -> VideoProfile {
    if duration_secs <= 30.0 {
        VideoProfile {
            crf: 21,
            preset: "medium",
            max_width: None,
        }
    } else if duration_secs <= 180.0 {
        VideoProfile {
            crf: 24,
            preset: "medium",
            max_width: None,
        }
    } else {
        VideoProfile {
            crf: 27,
            preset: "fast",
            max_width: Some(1280),
        }
    }
}

/// Pick an audio bitrate by duration.
pub fn audio_bitrate_for(duration_secs: f64) -> &'static str {
    if duration_secs <= 60.0 {
        "128k"
    } else if duration_secs <= 300.0 {
        "96k"
    } else {
        "64k"
    }
}

/// Rough classification of an imported media buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaClass {
    /// Carries a video stream
    Video,
    /// Audio only
    Audio,
    /// Not decodable media; treated as an opaque file
    Other,
}

/// Pure transcoding operations over byte buffers.
///
/// Implemented by [`MediaPipeline`] on top of FFmpeg; tests inject fakes.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Compress a raw video buffer to a normalized h264/aac mp4.
    async fn compress_video(&self, raw: &[u8]) -> MediaResult<Vec<u8>>;

    /// Compress a raw audio buffer to a normalized aac m4a.
    ///
    /// Fails with [`MediaError::NoAudioTrack`] if the buffer has no audio
    /// stream.
    async fn compress_audio(&self, raw: &[u8], source_ext: &str) -> MediaResult<Vec<u8>>;

    /// Extract the audio track of a video as aac m4a.
    ///
    /// Fails with [`MediaError::NoAudioTrack`] if the video is mute.
    async fn extract_audio_track(&self, video: &[u8]) -> MediaResult<Vec<u8>>;

    /// Extract the audio track, or synthesize silence of matching duration
    /// when the video has none.
    ///
    /// Every playable item then exposes the same "has audio" contract to
    /// playback code.
    async fn extract_or_synthesize_silence(&self, video: &[u8]) -> MediaResult<Vec<u8>>;

    /// Classify a buffer as video, audio or an opaque file.
    async fn classify(&self, raw: &[u8]) -> MediaResult<MediaClass>;
}

/// FFmpeg-backed [`Transcoder`].
#[derive(Debug, Clone, Default)]
pub struct MediaPipeline {
    timeout: Option<Duration>,
}

impl MediaPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill any single FFmpeg invocation that outlives this duration.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn runner(&self) -> FfmpegRunner {
        match self.timeout {
            Some(t) => FfmpegRunner::new().with_timeout(t),
            None => FfmpegRunner::new(),
        }
    }

    /// Write an input buffer into a scratch dir and probe it.
    async fn stage_input(
        &self,
        scratch: &TempDir,
        bytes: &[u8],
        file_name: &str,
    ) -> MediaResult<(std::path::PathBuf, MediaInfo)> {
        let input = scratch.path().join(file_name);
        fs::write(&input, bytes).await?;
        let info = probe_media(&input).await?;
        Ok((input, info))
    }

    /// Synthesize a silent aac buffer of the given duration.
    pub async fn synthesize_silence(&self, duration_secs: f64) -> MediaResult<Vec<u8>> {
        let scratch = TempDir::new()?;
        let output = scratch.path().join("silence.m4a");

        let cmd = FfmpegCommand::from_lavfi("anullsrc=r=44100:cl=mono", &output)
            .duration(duration_secs)
            .audio_codec("aac")
            .audio_bitrate("64k");
        self.runner().run(&cmd).await?;

        read_output(&output).await
    }
}

#[async_trait]
impl Transcoder for MediaPipeline {
    async fn compress_video(&self, raw: &[u8]) -> MediaResult<Vec<u8>> {
        let scratch = TempDir::new()?;
        let (input, info) = self.stage_input(&scratch, raw, "input.mp4").await?;
        if !info.has_video {
            return Err(MediaError::invalid_media("no video stream found"));
        }

        let profile = video_profile_for(info.duration);
        debug!(
            duration = info.duration,
            crf = profile.crf,
            preset = profile.preset,
            "Compressing video"
        );

        let output = scratch.path().join("output.mp4");
        let mut cmd = FfmpegCommand::new(&input, &output)
            .video_codec("libx264")
            .preset(profile.preset)
            .crf(profile.crf)
            .faststart();

        if let Some(max_width) = profile.max_width {
            // -2 keeps the height even for yuv420p
            cmd = cmd.video_filter(format!("scale='min({},iw)':-2", max_width));
        }

        cmd = if info.has_audio {
            cmd.audio_codec("aac")
                .audio_bitrate(audio_bitrate_for(info.duration))
        } else {
            cmd.output_arg("-an")
        };

        self.runner().run(&cmd).await?;
        read_output(&output).await
    }

    async fn compress_audio(&self, raw: &[u8], source_ext: &str) -> MediaResult<Vec<u8>> {
        let scratch = TempDir::new()?;
        let file_name = format!("input.{}", source_ext);
        let (input, info) = self.stage_input(&scratch, raw, &file_name).await?;
        if !info.has_audio {
            return Err(MediaError::NoAudioTrack);
        }

        let bitrate = audio_bitrate_for(info.duration);
        debug!(duration = info.duration, bitrate, "Compressing audio");

        let output = scratch.path().join("output.m4a");
        let cmd = FfmpegCommand::new(&input, &output)
            .no_video()
            .audio_codec("aac")
            .audio_bitrate(bitrate);
        self.runner().run(&cmd).await?;

        read_output(&output).await
    }

    async fn extract_audio_track(&self, video: &[u8]) -> MediaResult<Vec<u8>> {
        let scratch = TempDir::new()?;
        let (input, info) = self.stage_input(&scratch, video, "input.mp4").await?;
        if !info.has_audio {
            return Err(MediaError::NoAudioTrack);
        }

        let output = scratch.path().join("audio.m4a");
        let cmd = FfmpegCommand::new(&input, &output)
            .no_video()
            .audio_codec("aac")
            .audio_bitrate(audio_bitrate_for(info.duration));
        self.runner().run(&cmd).await?;

        read_output(&output).await
    }

    async fn extract_or_synthesize_silence(&self, video: &[u8]) -> MediaResult<Vec<u8>> {
        match self.extract_audio_track(video).await {
            Ok(bytes) => Ok(bytes),
            Err(MediaError::NoAudioTrack) => {
                let scratch = TempDir::new()?;
                let (_, info) = self.stage_input(&scratch, video, "input.mp4").await?;
                debug!(duration = info.duration, "Synthesizing silence for mute video");
                self.synthesize_silence(info.duration).await
            }
            Err(e) => Err(e),
        }
    }

    async fn classify(&self, raw: &[u8]) -> MediaResult<MediaClass> {
        let scratch = TempDir::new()?;
        let input = scratch.path().join("input.bin");
        fs::write(&input, raw).await?;

        match probe_media(&input).await {
            Ok(info) if info.has_video => Ok(MediaClass::Video),
            Ok(_) => Ok(MediaClass::Audio),
            // Not decodable media at all; callers treat it as a plain file.
            Err(MediaError::FfprobeFailed { .. }) | Err(MediaError::InvalidMedia(_)) => {
                Ok(MediaClass::Other)
            }
            Err(e) => Err(e),
        }
    }
}

async fn read_output(path: &Path) -> MediaResult<Vec<u8>> {
    let bytes = fs::read(path).await?;
    if bytes.is_empty() {
        return Err(MediaError::ffmpeg_failed(
            "encoder produced an empty output",
            None,
            None,
        ));
    }
    Ok(bytes)
}
