//! Health check handlers.

use std::path::Path;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use echoflow_pipeline::PipelineConfig;
use echoflow_tools::check_tool;

use crate::state::AppState;

/// Health response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub timestamp: String,
}

/// Liveness check.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: Utc::now().to_rfc3339(),
    })
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
    pub checks: ReadinessChecks,
}

/// One entry per resource a pipeline run depends on.
#[derive(Serialize)]
pub struct ReadinessChecks {
    pub tools: CheckStatus,
    pub videos_dir: CheckStatus,
    pub metadata: CheckStatus,
}

impl ReadinessChecks {
    fn all_ok(&self) -> bool {
        [&self.tools, &self.videos_dir, &self.metadata]
            .iter()
            .all(|c| c.status == "ok")
    }
}

#[derive(Serialize)]
pub struct CheckStatus {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

impl CheckStatus {
    /// Time `check` and record its verdict.
    fn measure(check: impl FnOnce() -> Result<(), String>) -> Self {
        let start = Instant::now();
        match check() {
            Ok(()) => Self {
                status: "ok",
                error: None,
                latency_ms: Some(start.elapsed().as_millis() as u64),
            },
            Err(e) => Self {
                status: "error",
                error: Some(e),
                latency_ms: None,
            },
        }
    }
}

/// Readiness check.
///
/// Ready means every configured tool resolves on PATH, the videos directory
/// exists and both metadata tables the preprocessing tool appends to are in
/// place. Anything else answers 503 with the failing checks.
pub async fn ready(
    State(state): State<AppState>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    let config = state.pipeline.config();

    let checks = ReadinessChecks {
        tools: CheckStatus::measure(|| tools_resolve(config)),
        videos_dir: CheckStatus::measure(|| is_directory(&config.videos_dir)),
        metadata: CheckStatus::measure(|| {
            is_file(&config.file_list_path)?;
            is_file(&config.volume_tracings_path)
        }),
    };

    if checks.all_ok() {
        Ok(Json(ReadinessResponse {
            status: "ready",
            checks,
        }))
    } else {
        Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                status: "degraded",
                checks,
            }),
        ))
    }
}

fn tools_resolve(config: &PipelineConfig) -> Result<(), String> {
    for cmd in config.tool_commands() {
        check_tool(cmd.program()).map_err(|e| format!("{}: {}", cmd.name(), e))?;
    }
    Ok(())
}

fn is_directory(path: &Path) -> Result<(), String> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(format!("{} is not a directory", path.display()))
    }
}

fn is_file(path: &Path) -> Result<(), String> {
    if path.is_file() {
        Ok(())
    } else {
        Err(format!("missing {}", path.display()))
    }
}
