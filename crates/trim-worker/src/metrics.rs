//! Job metrics.
//!
//! Recorded through the `metrics` facade; the binary decides the exporter.

use metrics::{counter, histogram};
use trim_models::{JobState, TrimMode};

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_CREATED_TOTAL: &str = "trim_jobs_created_total";
    pub const JOBS_FINISHED_TOTAL: &str = "trim_jobs_finished_total";
    pub const JOBS_EVICTED_TOTAL: &str = "trim_jobs_evicted_total";
    pub const RENDITIONS_FAILED_TOTAL: &str = "trim_renditions_failed_total";
    pub const FFMPEG_DURATION_SECONDS: &str = "trim_ffmpeg_duration_seconds";
}

pub fn record_job_created(mode: TrimMode) {
    let labels = [("mode", mode.as_str().to_string())];
    counter!(names::JOBS_CREATED_TOTAL, &labels).increment(1);
}

pub fn record_job_finished(mode: TrimMode, state: JobState) {
    let labels = [
        ("mode", mode.as_str().to_string()),
        ("state", state.as_str().to_string()),
    ];
    counter!(names::JOBS_FINISHED_TOTAL, &labels).increment(1);
}

pub fn record_jobs_evicted(count: usize) {
    counter!(names::JOBS_EVICTED_TOTAL).increment(count as u64);
}

pub fn record_rendition_failed() {
    counter!(names::RENDITIONS_FAILED_TOTAL).increment(1);
}

pub fn record_ffmpeg_duration(success: bool, duration_secs: f64) {
    let labels = [("success", success.to_string())];
    histogram!(names::FFMPEG_DURATION_SECONDS, &labels).record(duration_secs);
}
