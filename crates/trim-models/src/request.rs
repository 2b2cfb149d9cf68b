//! Trim request models.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{ValidationError, ValidationResult};
use crate::location::{ObjectLocation, SourceDescriptor};
use crate::segment::Edl;

/// How sources are combined into deliverables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrimMode {
    /// Every source is cut and concatenated into one output
    #[default]
    Single,
    /// One output per source, sharing the same cut list (ABR ladder)
    #[serde(alias = "abr")]
    MultiRendition,
}

impl TrimMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrimMode::Single => "single",
            TrimMode::MultiRendition => "multi_rendition",
        }
    }
}

/// A request to trim one or more sources against an EDL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TrimRequest {
    /// Source URIs (`s3://bucket/key` or local paths)
    #[serde(alias = "source")]
    pub sources: Vec<String>,

    /// Output mode
    #[serde(default, alias = "sourceType")]
    pub mode: TrimMode,

    /// Destination (`s3://bucket/prefix` or bare bucket name)
    #[serde(alias = "outputDirectory")]
    pub destination: String,

    /// Edit decision list
    pub edl: Edl,
}

/// A request whose sources and destination have been parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRequest {
    pub sources: Vec<SourceDescriptor>,
    pub destination: ObjectLocation,
}

impl TrimRequest {
    pub fn new(
        sources: Vec<String>,
        mode: TrimMode,
        destination: impl Into<String>,
        edl: Edl,
    ) -> Self {
        Self {
            sources,
            mode,
            destination: destination.into(),
            edl,
        }
    }

    /// Validate the request and parse its locations.
    ///
    /// Checks run in order: sources, segments, destination, then the
    /// per-item checks.
    pub fn validate(&self) -> ValidationResult<ResolvedRequest> {
        if self.sources.is_empty() {
            return Err(ValidationError::NoSources);
        }
        if self.edl.segments.is_empty() {
            return Err(ValidationError::NoSegments);
        }
        if self.destination.trim().is_empty() {
            return Err(ValidationError::NoDestination);
        }

        self.edl.validate()?;

        let sources = self
            .sources
            .iter()
            .map(|s| SourceDescriptor::parse(s))
            .collect::<ValidationResult<Vec<_>>>()?;
        let destination = ObjectLocation::parse_destination(&self.destination)?;

        Ok(ResolvedRequest {
            sources,
            destination,
        })
    }
}
