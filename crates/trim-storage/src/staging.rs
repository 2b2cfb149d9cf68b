//! Per-job local working area.
//!
//! Remote sources are downloaded into `<work_dir>/<job_id>/inputs/` and tool
//! outputs are written to `<work_dir>/<job_id>/outputs/`; the whole job
//! directory is removed afterwards. Jobs never share a directory, so one
//! job's purge cannot touch another job's inputs.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info};
use trim_models::{ObjectLocation, SourceDescriptor};

use crate::error::{StorageError, StorageResult};
use crate::store::ObjectStore;

const INPUTS_DIR: &str = "inputs";
const OUTPUTS_DIR: &str = "outputs";

/// Local file name for the source at `index`.
///
/// `{index}_{bucket}_{key}` with path separators replaced by `_`. The index
/// keeps two sources apart even when they name the same object.
pub fn staged_file_name(index: usize, location: &ObjectLocation) -> String {
    format!("{}_{}_{}", index, location.bucket, location.key).replace(['/', '\\'], "_")
}

/// Local working area for one job.
#[derive(Clone)]
pub struct StagingArea {
    root: PathBuf,
    store: Arc<dyn ObjectStore>,
}

impl StagingArea {
    /// Area for `job_id` under `work_dir`. Nothing is created until needed.
    pub fn new(work_dir: &Path, job_id: &str, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            root: work_dir.join(job_id),
            store,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where fetched sources land.
    pub fn inputs_dir(&self) -> PathBuf {
        self.root.join(INPUTS_DIR)
    }

    /// Where tool outputs are written before publishing.
    pub fn outputs_dir(&self) -> PathBuf {
        self.root.join(OUTPUTS_DIR)
    }

    /// Create the area if it does not exist yet.
    pub async fn ensure(&self) -> StorageResult<()> {
        tokio::fs::create_dir_all(self.inputs_dir()).await?;
        tokio::fs::create_dir_all(self.outputs_dir()).await?;
        Ok(())
    }

    /// Make the source at `index` available locally and return its path.
    ///
    /// Local sources are returned unchanged.
    pub async fn fetch(&self, index: usize, source: &SourceDescriptor) -> StorageResult<PathBuf> {
        match source {
            SourceDescriptor::Local(path) => Ok(path.clone()),
            SourceDescriptor::Remote(location) => {
                self.ensure().await?;
                let path = self.inputs_dir().join(staged_file_name(index, location));
                self.store.download_file(location, &path).await?;
                debug!("Staged {} at {}", location, path.display());
                Ok(path)
            }
        }
    }

    /// Fetch every source concurrently; one result per source, in order.
    pub async fn fetch_all(&self, sources: &[SourceDescriptor]) -> Vec<StorageResult<PathBuf>> {
        join_all(
            sources
                .iter()
                .enumerate()
                .map(|(index, source)| self.fetch(index, source)),
        )
        .await
    }

    /// Remove the area and everything in it. A missing area is not an error.
    pub async fn purge(&self) -> StorageResult<()> {
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => {
                info!("Purged staging area {}", self.root.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::cleanup_failed(format!(
                "{}: {}",
                self.root.display(),
                e
            ))),
        }
    }
}
