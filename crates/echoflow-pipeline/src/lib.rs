//! Ejection-fraction pipeline orchestrator.
//!
//! This crate provides:
//! - Timestamp-derived artifact naming
//! - The ordered stage sequence (persist, preprocess, segmentation,
//!   coordinate extraction, classification, predictions lookup)
//! - Coordinate payload and predictions table parsing
//! - A workspace lock serializing access to the shared tool state
//! - Structured per-request logging and stage metrics

pub mod config;
pub mod coordinates;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod naming;
pub mod predictions;
pub mod processor;
pub mod stage;

pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineResult};
pub use logging::RequestLogger;
pub use naming::ArtifactNames;
pub use processor::{Pipeline, Upload};
pub use stage::Stage;
