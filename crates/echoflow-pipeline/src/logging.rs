//! Structured request logging.
//!
//! Every pipeline log line carries the request id and the derived artifact
//! stem so a request can be followed through the tool invocations.

use tracing::{error, info, warn, Span};

use echoflow_models::RequestId;

use crate::stage::Stage;

/// Request logger with consistent contextual fields.
#[derive(Debug, Clone)]
pub struct RequestLogger {
    request_id: String,
    stem: String,
}

impl RequestLogger {
    /// Create a logger for a request. The stem is filled in once derived.
    pub fn new(request_id: &RequestId) -> Self {
        Self {
            request_id: request_id.to_string(),
            stem: String::new(),
        }
    }

    /// Attach the derived artifact stem.
    pub fn with_stem(mut self, stem: impl Into<String>) -> Self {
        self.stem = stem.into();
        self
    }

    pub fn log_stage_start(&self, stage: Stage) {
        info!(
            request_id = %self.request_id,
            stem = %self.stem,
            stage = %stage,
            "Stage started"
        );
    }

    pub fn log_stage_completion(&self, stage: Stage, elapsed_ms: u128) {
        info!(
            request_id = %self.request_id,
            stem = %self.stem,
            stage = %stage,
            elapsed_ms = %elapsed_ms,
            "Stage completed"
        );
    }

    pub fn log_stage_failure(&self, stage: Stage, message: &str) {
        error!(
            request_id = %self.request_id,
            stem = %self.stem,
            stage = %stage,
            "Stage failed: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            request_id = %self.request_id,
            stem = %self.stem,
            "{}", message
        );
    }

    pub fn log_info(&self, message: &str) {
        info!(
            request_id = %self.request_id,
            stem = %self.stem,
            "{}", message
        );
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn stem(&self) -> &str {
        &self.stem
    }

    /// Create a tracing span for this request.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "pipeline",
            request_id = %self.request_id,
            stem = %self.stem
        )
    }
}
