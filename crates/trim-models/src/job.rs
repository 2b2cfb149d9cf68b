//! Job identifiers, states and snapshots.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::request::TrimRequest;

/// Unique identifier for a trim job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
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

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Trim job lifecycle state.
///
/// `Pending -> Running -> {Completed, Cancelled}`. Terminal states have no
/// outgoing transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Created, no request accepted yet
    #[default]
    Pending,
    /// Request accepted and being processed
    Running,
    /// All work finished
    Completed,
    /// Cancelled by the caller or by a failure
    Cancelled,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Cancelled)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-source result of a rendition attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RenditionOutcome {
    /// Index of the source in the request
    pub source_index: usize,
    /// Source URI as submitted
    pub source: String,
    /// Published URL on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Failure cause otherwise
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RenditionOutcome {
    pub fn published(source_index: usize, source: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            source_index,
            source: source.into(),
            url: Some(url.into()),
            error: None,
        }
    }

    pub fn failed(source_index: usize, source: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            source_index,
            source: source.into(),
            url: None,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.url.is_some()
    }
}

/// Point-in-time view of a job.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobSnapshot {
    pub id: JobId,
    /// Accepted request, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<TrimRequest>,
    pub state: JobState,
    /// Published URLs in request order
    pub produced_outputs: Vec<String>,
    /// Per-source outcomes (one per source in MultiRendition mode)
    #[serde(default)]
    pub renditions: Vec<RenditionOutcome>,
    /// Recorded cause when the job was cancelled by a failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
