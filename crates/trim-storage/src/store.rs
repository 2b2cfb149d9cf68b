//! Object store capability.

use std::path::Path;

use async_trait::async_trait;
use trim_models::ObjectLocation;

use crate::error::StorageResult;

/// Remote object store the staging and publishing steps depend on.
///
/// Credential and region resolution belong to the implementation.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Download `location` into the local file `path`, creating parent directories.
    async fn download_file(&self, location: &ObjectLocation, path: &Path) -> StorageResult<()>;

    /// Upload the local file `path` to `location`.
    async fn upload_file(&self, path: &Path, location: &ObjectLocation) -> StorageResult<()>;
}

/// Content type for an uploaded file, from its extension.
pub fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("mp4") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("mkv") => "video/x-matroska",
        Some("webm") => "video/webm",
        _ => "application/octet-stream",
    }
}
