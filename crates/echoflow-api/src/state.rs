//! Application state.

use echoflow_pipeline::Pipeline;

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub pipeline: Pipeline,
}

impl AppState {
    /// Create new application state.
    pub fn new(config: ApiConfig, pipeline: Pipeline) -> Self {
        Self { config, pipeline }
    }
}
