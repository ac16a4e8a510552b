//! Pipeline stages.

use std::fmt;

/// One step of the pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Intake,
    Persist,
    Preprocess,
    Segmentation,
    Positions,
    Classification,
    Predictions,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Intake => "intake",
            Stage::Persist => "persist",
            Stage::Preprocess => "preprocess",
            Stage::Segmentation => "segmentation",
            Stage::Positions => "positions",
            Stage::Classification => "classification",
            Stage::Predictions => "predictions",
        }
    }

    /// Client-facing message when this stage fails.
    ///
    /// These strings are part of the wire contract.
    pub fn failure_message(&self) -> &'static str {
        match self {
            Stage::Intake => "No files were uploaded.",
            Stage::Persist => "Failed to save file",
            Stage::Preprocess | Stage::Positions => "Failed to execute Python script",
            Stage::Segmentation => "Failed to execute echonet command",
            Stage::Classification => "Failed to execute echonet video command",
            Stage::Predictions => "Failed to read CSV file",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
