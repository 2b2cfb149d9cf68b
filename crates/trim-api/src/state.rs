//! Application state.

use std::sync::Arc;

use trim_worker::JobRegistry;

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub registry: Arc<JobRegistry>,
}

impl AppState {
    pub fn new(config: ApiConfig, registry: Arc<JobRegistry>) -> Self {
        Self { config, registry }
    }
}
