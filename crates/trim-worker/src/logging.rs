//! Structured job logging.
//!
//! Every event carries `job_id` and `operation` so one job's lines can be
//! pulled out of an interleaved stream.

use std::fmt::Display;

use tracing::{error, info, warn, Span};
use trim_models::{JobId, JobState, ObjectLocation};

/// Logger bound to one job run.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    operation: &'static str,
}

impl JobLogger {
    /// `operation` is the production name, e.g. `trim_single`.
    pub fn new(job_id: &JobId, operation: &'static str) -> Self {
        Self {
            job_id: job_id.to_string(),
            operation,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn operation(&self) -> &str {
        self.operation
    }

    /// Span wrapping the whole run.
    pub fn span(&self) -> Span {
        tracing::info_span!("trim_job", job_id = %self.job_id, operation = self.operation)
    }

    pub fn started(&self, sources: usize, segments: usize, destination: &ObjectLocation) {
        info!(
            job_id = %self.job_id,
            operation = self.operation,
            sources,
            segments,
            destination = %destination,
            "Trim job started"
        );
    }

    pub fn skipped(&self, state: JobState) {
        warn!(job_id = %self.job_id, operation = self.operation, state = %state, "Not starting trim job");
    }

    pub fn cutting(&self, segments: usize, inputs: usize) {
        info!(
            job_id = %self.job_id,
            operation = self.operation,
            segments,
            inputs,
            "Cutting segments"
        );
    }

    pub fn rendition_failed(&self, index: usize, source: &str, cause: &impl Display) {
        warn!(
            job_id = %self.job_id,
            operation = self.operation,
            rendition = index,
            source,
            "Rendition failed: {}", cause
        );
    }

    pub fn renditions_published(&self, published: usize, total: usize) {
        info!(
            job_id = %self.job_id,
            operation = self.operation,
            published,
            total,
            "Renditions attempted"
        );
    }

    /// The upload went through but the local copy is still on disk.
    pub fn local_copy_kept(&self, url: &str, cause: &impl Display) {
        warn!(
            job_id = %self.job_id,
            operation = self.operation,
            url,
            "Published but could not remove local copy: {}", cause
        );
    }

    pub fn purge_failed(&self, cause: &impl Display) {
        warn!(job_id = %self.job_id, operation = self.operation, "Failed to purge staging area: {}", cause);
    }

    pub fn failed(&self, cause: &impl Display) {
        error!(job_id = %self.job_id, operation = self.operation, "Trim job failed: {}", cause);
    }

    pub fn finished(&self, state: JobState, outputs: usize) {
        match state {
            JobState::Completed => info!(
                job_id = %self.job_id,
                operation = self.operation,
                outputs,
                "Trim job completed"
            ),
            state => warn!(
                job_id = %self.job_id,
                operation = self.operation,
                state = %state,
                "Trim job ended without completing"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_logger_fields() {
        let job_id = JobId::new();
        let logger = JobLogger::new(&job_id, "trim_single");

        assert_eq!(logger.job_id(), job_id.as_str());
        assert_eq!(logger.operation(), "trim_single");
    }
}
