//! Request validation errors.

use thiserror::Error;

use crate::job::JobState;

/// Result type for request validation.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Reasons a trim request is rejected before any work starts.
///
/// Validation never mutates the job it was raised for.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("No source files provided")]
    NoSources,

    #[error("No segments provided")]
    NoSegments,

    #[error("No output directory provided")]
    NoDestination,

    #[error("EDL name must not be empty")]
    EmptyName,

    #[error("EDL name must be a plain file name: {0}")]
    InvalidName(String),

    #[error("Invalid segment {index}: start={start}, end={end}")]
    InvalidSegment { index: usize, start: f64, end: f64 },

    #[error("Invalid source: {0}")]
    InvalidSource(String),

    #[error("Invalid destination: {0}")]
    InvalidDestination(String),

    #[error("Job already running")]
    AlreadyRunning,

    #[error("Job already finished with state {0}")]
    AlreadyFinished(JobState),
}

impl ValidationError {
    pub fn invalid_source(msg: impl Into<String>) -> Self {
        Self::InvalidSource(msg.into())
    }

    pub fn invalid_destination(msg: impl Into<String>) -> Self {
        Self::InvalidDestination(msg.into())
    }
}
