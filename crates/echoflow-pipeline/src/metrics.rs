//! Pipeline metrics.
//!
//! Recorded through the `metrics` facade; the API binary installs the
//! Prometheus recorder.

use metrics::{counter, histogram};

use crate::stage::Stage;

/// Metric names as constants for consistency.
pub mod names {
    pub const STAGE_DURATION_SECONDS: &str = "echoflow_stage_duration_seconds";
    pub const PIPELINE_RUNS_TOTAL: &str = "echoflow_pipeline_runs_total";
    pub const PIPELINE_FAILURES_TOTAL: &str = "echoflow_pipeline_failures_total";
    pub const WORKSPACE_LOCK_WAIT_SECONDS: &str = "echoflow_workspace_lock_wait_seconds";
}

/// Record how long a stage took.
pub fn record_stage_duration(stage: Stage, duration_secs: f64) {
    let labels = [("stage", stage.as_str().to_string())];
    histogram!(names::STAGE_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record a finished pipeline run.
pub fn record_run(outcome: &str) {
    let labels = [("outcome", outcome.to_string())];
    counter!(names::PIPELINE_RUNS_TOTAL, &labels).increment(1);
}

/// Record a failed stage.
pub fn record_failure(stage: Option<Stage>) {
    let stage = stage.map(|s| s.as_str()).unwrap_or("none");
    let labels = [("stage", stage.to_string())];
    counter!(names::PIPELINE_FAILURES_TOTAL, &labels).increment(1);
}

/// Record time spent waiting for the workspace lock.
pub fn record_lock_wait(duration_secs: f64) {
    histogram!(names::WORKSPACE_LOCK_WAIT_SECONDS).record(duration_secs);
}
