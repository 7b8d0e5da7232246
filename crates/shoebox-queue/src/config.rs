//! Queue configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the job queue coordinator.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Root directory for per-job scratch space and descriptors
    pub data_dir: PathBuf,
    /// Root of the permanent local media store
    pub media_dir: PathBuf,
    /// Timeout for a single transcode invocation
    pub transcode_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/tmp/shoebox/jobs"),
            media_dir: PathBuf::from("/tmp/shoebox/media"),
            transcode_timeout: Duration::from_secs(600),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            data_dir: std::env::var("SHOEBOX_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.data_dir),
            media_dir: std::env::var("SHOEBOX_MEDIA_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.media_dir),
            transcode_timeout: Duration::from_secs(
                std::env::var("SHOEBOX_TRANSCODE_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(600),
            ),
        }
    }

    /// Config rooted at a base directory (jobs and media side by side).
    pub fn rooted_at(base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        Self {
            data_dir: base.join("jobs"),
            media_dir: base.join("media"),
            ..Self::default()
        }
    }
}
