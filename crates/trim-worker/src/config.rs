//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Root of the per-job staging areas
    pub work_dir: PathBuf,
    /// FFmpeg binary name or path
    pub ffmpeg_path: String,
    /// How long finished jobs stay queryable
    pub job_retention: Duration,
    /// Upper bound on retained jobs; oldest finished jobs go first
    pub max_retained_jobs: Option<usize>,
    /// How often the eviction sweep runs
    pub eviction_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            work_dir: std::env::temp_dir().join("trim"),
            ffmpeg_path: "ffmpeg".to_string(),
            job_retention: Duration::from_secs(3600), // 1 hour
            max_retained_jobs: None,
            eviction_interval: Duration::from_secs(60),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            work_dir: std::env::var("TRIM_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            ffmpeg_path: std::env::var("FFMPEG_PATH").unwrap_or(defaults.ffmpeg_path),
            job_retention: std::env::var("JOB_RETENTION_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.job_retention),
            // 0 disables the cap
            max_retained_jobs: std::env::var("MAX_RETAINED_JOBS")
                .ok()
                .and_then(|s| s.parse::<usize>().ok())
                .filter(|n| *n > 0),
            eviction_interval: std::env::var("EVICTION_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.eviction_interval),
        }
    }
}
