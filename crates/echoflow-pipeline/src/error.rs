//! Pipeline error types.

use std::path::PathBuf;

use echoflow_tools::ToolError;
use thiserror::Error;

use crate::stage::Stage;

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Message for every predictions-table lookup failure.
pub const PREDICTION_NOT_FOUND_MESSAGE: &str = "File name not found or data is insufficient in CSV";

/// Message for an unusable coordinate payload.
pub const MALFORMED_COORDINATES_MESSAGE: &str = "Failed to parse JSON from Python script";

/// Message when the request deadline expires.
pub const TIMEOUT_MESSAGE: &str = "Response timeout";

/// Terminal failure of one pipeline request.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("No files were uploaded")]
    EmptyUpload,

    #[error("Failed to save upload: {0}")]
    Save(#[source] ToolError),

    #[error("{stage} tool failed: {source}")]
    Tool {
        stage: Stage,
        #[source]
        source: ToolError,
    },

    #[error("Malformed coordinate payload: {0}")]
    MalformedCoordinates(String),

    #[error("Failed to read predictions table {}: {source}", path.display())]
    PredictionsRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No usable prediction for {file_name}: {reason}")]
    PredictionNotFound { file_name: String, reason: String },

    #[error("Request deadline expired during {stage}")]
    Timeout { stage: Stage },

    #[error("Request cancelled during {stage}")]
    Cancelled { stage: Stage },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn malformed_coordinates(msg: impl Into<String>) -> Self {
        Self::MalformedCoordinates(msg.into())
    }

    /// Wrap a tool failure for `stage`, lifting timeouts and cancellation
    /// out of the tool error so callers see them uniformly.
    pub fn from_tool(stage: Stage, source: ToolError) -> Self {
        match source {
            ToolError::Timeout { .. } => Self::Timeout { stage },
            ToolError::Cancelled(_) => Self::Cancelled { stage },
            source => Self::Tool { stage, source },
        }
    }

    /// The stage that failed.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::EmptyUpload => Some(Stage::Intake),
            PipelineError::Save(_) => Some(Stage::Persist),
            PipelineError::Tool { stage, .. }
            | PipelineError::Timeout { stage }
            | PipelineError::Cancelled { stage } => Some(*stage),
            PipelineError::MalformedCoordinates(_) => Some(Stage::Positions),
            PipelineError::PredictionsRead { .. } | PipelineError::PredictionNotFound { .. } => {
                Some(Stage::Predictions)
            }
            PipelineError::Config(_) => None,
        }
    }

    /// Short client-facing message.
    pub fn message(&self) -> &'static str {
        match self {
            PipelineError::EmptyUpload => Stage::Intake.failure_message(),
            PipelineError::Save(_) => Stage::Persist.failure_message(),
            PipelineError::Tool { stage, .. } => stage.failure_message(),
            PipelineError::MalformedCoordinates(_) => MALFORMED_COORDINATES_MESSAGE,
            PipelineError::PredictionsRead { .. } => Stage::Predictions.failure_message(),
            PipelineError::PredictionNotFound { .. } => PREDICTION_NOT_FOUND_MESSAGE,
            PipelineError::Timeout { .. } | PipelineError::Cancelled { .. } => TIMEOUT_MESSAGE,
            PipelineError::Config(_) => "Pipeline is misconfigured",
        }
    }

    /// Raw diagnostic detail, where one exists.
    ///
    /// For tool failures this is the tool's stderr, verbatim.
    pub fn details(&self) -> Option<String> {
        match self {
            PipelineError::EmptyUpload
            | PipelineError::PredictionNotFound { .. }
            | PipelineError::Timeout { .. }
            | PipelineError::Cancelled { .. } => None,
            PipelineError::Save(source) => Some(source.to_string()),
            PipelineError::Tool { source, .. } => Some(source.diagnostic()),
            PipelineError::MalformedCoordinates(msg) | PipelineError::Config(msg) => {
                Some(msg.clone())
            }
            PipelineError::PredictionsRead { source, .. } => Some(source.to_string()),
        }
    }

    /// Caused by the request itself rather than the pipeline.
    pub fn is_client_error(&self) -> bool {
        matches!(self, PipelineError::EmptyUpload)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            PipelineError::Timeout { .. } | PipelineError::Cancelled { .. }
        )
    }
}
