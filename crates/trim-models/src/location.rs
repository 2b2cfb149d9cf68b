//! Object-store locations and source descriptors.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ValidationError, ValidationResult};

/// URI scheme for object-store locations.
pub const S3_SCHEME: &str = "s3";

/// Check whether a string is an `s3://` URI.
pub fn is_s3_uri(uri: &str) -> bool {
    Url::parse(uri)
        .map(|u| u.scheme() == S3_SCHEME)
        .unwrap_or(false)
}

/// A bucket plus key (or key prefix) in the object store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
}

impl ObjectLocation {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Parse an `s3://bucket/key` URI. The key must be present.
    pub fn parse_uri(uri: &str) -> ValidationResult<Self> {
        let rest = uri
            .trim()
            .strip_prefix("s3://")
            .ok_or_else(|| ValidationError::invalid_source(format!("not an s3 URI: {}", uri)))?;

        let (bucket, key) = rest
            .split_once('/')
            .ok_or_else(|| ValidationError::invalid_source(format!("missing object key: {}", uri)))?;

        if bucket.is_empty() || key.is_empty() {
            return Err(ValidationError::invalid_source(format!(
                "missing bucket or key: {}",
                uri
            )));
        }

        Ok(Self::new(bucket, key))
    }

    /// Parse a destination: `s3://bucket[/prefix]` or a bare `bucket[/prefix]`.
    pub fn parse_destination(destination: &str) -> ValidationResult<Self> {
        let trimmed = destination.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::NoDestination);
        }

        let rest = match trimmed.strip_prefix("s3://") {
            Some(rest) => rest,
            None if trimmed.contains("://") => {
                return Err(ValidationError::invalid_destination(format!(
                    "unsupported scheme: {}",
                    trimmed
                )))
            }
            None => trimmed,
        };

        let rest = rest.trim_end_matches('/');
        let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(ValidationError::invalid_destination(format!(
                "missing bucket: {}",
                destination
            )));
        }

        Ok(Self::new(bucket, prefix))
    }

    /// Append a file name to this location's key prefix.
    pub fn join(&self, name: &str) -> Self {
        let key = if self.key.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.key.trim_end_matches('/'), name)
        };
        Self::new(self.bucket.clone(), key)
    }

    /// Last path component of the key.
    pub fn file_name(&self) -> Option<&str> {
        self.key.rsplit('/').next().filter(|s| !s.is_empty())
    }

    /// Render as `s3://bucket/key`.
    pub fn to_uri(&self) -> String {
        if self.key.is_empty() {
            format!("s3://{}", self.bucket)
        } else {
            format!("s3://{}/{}", self.bucket, self.key)
        }
    }
}

impl fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_uri())
    }
}

/// Where a source media file lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceDescriptor {
    /// Object-store location, staged locally before processing
    Remote(ObjectLocation),
    /// File already on the local filesystem
    Local(PathBuf),
}

impl SourceDescriptor {
    pub fn parse(source: &str) -> ValidationResult<Self> {
        let source = source.trim();
        if source.is_empty() {
            return Err(ValidationError::invalid_source("empty source"));
        }
        if is_s3_uri(source) {
            ObjectLocation::parse_uri(source).map(Self::Remote)
        } else {
            Ok(Self::Local(PathBuf::from(source)))
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, SourceDescriptor::Remote(_))
    }
}

impl FromStr for SourceDescriptor {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceDescriptor::Remote(location) => write!(f, "{}", location),
            SourceDescriptor::Local(path) => write!(f, "{}", path.display()),
        }
    }
}
