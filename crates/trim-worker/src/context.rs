//! Shared collaborators for running jobs.

use std::sync::Arc;

use trim_media::MediaTool;
use trim_storage::ObjectStore;

use crate::config::WorkerConfig;

/// Everything a job needs from the outside world.
#[derive(Clone)]
pub struct ProcessingContext {
    pub config: WorkerConfig,
    pub store: Arc<dyn ObjectStore>,
    pub tool: Arc<dyn MediaTool>,
}

impl ProcessingContext {
    pub fn new(config: WorkerConfig, store: Arc<dyn ObjectStore>, tool: Arc<dyn MediaTool>) -> Self {
        Self {
            config,
            store,
            tool,
        }
    }
}
