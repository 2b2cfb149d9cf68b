//! Uploading finished outputs.

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;
use trim_models::ObjectLocation;

use crate::error::StorageError;
use crate::store::ObjectStore;

/// Why a publish did not fully succeed.
#[derive(Debug, Error)]
pub enum PublishError {
    /// Nothing was published.
    #[error("Publish failed: {0}")]
    Upload(#[from] StorageError),

    /// The object was published but the local file could not be removed.
    #[error("Published {url} but failed to remove local file: {source}")]
    Cleanup {
        url: String,
        #[source]
        source: std::io::Error,
    },
}

impl PublishError {
    /// URL of the published object, if the upload itself went through.
    pub fn published_url(&self) -> Option<&str> {
        match self {
            PublishError::Upload(_) => None,
            PublishError::Cleanup { url, .. } => Some(url),
        }
    }
}

/// Uploads local files under a destination prefix.
#[derive(Clone)]
pub struct Publisher {
    store: Arc<dyn ObjectStore>,
}

impl Publisher {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Upload `local` to `destination/<file name>`, delete the local copy and
    /// return the `s3://` URL of the object.
    pub async fn publish(
        &self,
        local: &Path,
        destination: &ObjectLocation,
    ) -> Result<String, PublishError> {
        let name = local
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                StorageError::upload_failed(format!("no file name: {}", local.display()))
            })?;

        let target = destination.join(name);
        self.store.upload_file(local, &target).await?;
        let url = target.to_uri();

        tokio::fs::remove_file(local)
            .await
            .map_err(|source| PublishError::Cleanup {
                url: url.clone(),
                source,
            })?;

        info!("Published {} as {}", local.display(), url);
        Ok(url)
    }
}
