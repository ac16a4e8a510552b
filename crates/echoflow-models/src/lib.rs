//! Shared data models for the EchoFlow pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - The ejection-fraction report returned to clients
//! - Annotated coordinate points
//! - The configurable pacing rule
//! - Request identifiers

pub mod pacing;
pub mod report;
pub mod request;

// Re-export common types
pub use pacing::{Comparison, PacingRule, PacingRuleError};
pub use report::{Coordinate, EjectionReport};
pub use request::RequestId;
