//! Axum HTTP server for the ejection-fraction pipeline.
//!
//! This crate provides:
//! - `POST /receive-video`, the multipart upload endpoint
//! - Liveness and readiness checks
//! - Request id, request logging and security header middleware
//! - Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
