//! Pipeline orchestration.
//!
//! One request runs these stages strictly in order, stopping at the first
//! failure:
//!
//! 1. persist the upload under its timestamp-derived name
//! 2. preprocess (converts to `.avi`, appends to the metadata tables)
//! 3. segmentation (writes `<stem>.avi` into the segmentation output tree)
//! 4. position extraction (JSON coordinates on stdout)
//! 5. classification (regenerates the predictions table)
//! 6. predictions lookup
//!
//! Stages 2-6 work on state shared by every request (metadata tables, tool
//! output trees, predictions table), so they run under the workspace lock.

use std::collections::HashSet;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, Instrument};

use echoflow_models::{EjectionReport, RequestId};
use echoflow_tools::{write_new_file, ProcessRunner, ToolCommand, ToolError, WriteOutcome};

use crate::config::PipelineConfig;
use crate::coordinates::parse_coordinates;
use crate::error::{PipelineError, PipelineResult};
use crate::logging::RequestLogger;
use crate::metrics;
use crate::naming::ArtifactNames;
use crate::predictions::read_ejection_fraction;
use crate::stage::Stage;

/// Disambiguators tried before giving up on a free upload name.
const MAX_NAME_ATTEMPTS: u32 = 100;

/// An uploaded video.
#[derive(Debug, Clone)]
pub struct Upload {
    /// File name as sent by the client; only its extension is used
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Ejection-fraction pipeline.
///
/// Cheap to clone; clones share the runner and both locks.
#[derive(Clone)]
pub struct Pipeline {
    config: Arc<PipelineConfig>,
    runner: Arc<dyn ProcessRunner>,
    workspace_lock: Arc<Mutex<()>>,
    /// Held while an upload claims its stem
    naming_lock: Arc<Mutex<()>>,
}

impl Pipeline {
    /// Create a new pipeline.
    pub fn new(config: PipelineConfig, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            config: Arc::new(config),
            runner,
            workspace_lock: Arc::new(Mutex::new(())),
            naming_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the pipeline for one upload, naming artifacts from the local clock.
    pub async fn run(&self, request_id: &RequestId, upload: Upload) -> PipelineResult<EjectionReport> {
        let names = ArtifactNames::derive(&Local::now(), &upload.file_name);
        self.run_with_names(request_id, upload, names).await
    }

    /// Run the pipeline with pre-derived artifact names.
    pub async fn run_with_names(
        &self,
        request_id: &RequestId,
        upload: Upload,
        names: ArtifactNames,
    ) -> PipelineResult<EjectionReport> {
        if upload.is_empty() {
            return self.finish(Err(PipelineError::EmptyUpload));
        }

        let logger = RequestLogger::new(request_id).with_stem(names.stem());
        let span = logger.create_span();
        let result = self
            .execute(logger, upload, names)
            .instrument(span)
            .await;
        self.finish(result)
    }

    fn finish(&self, result: PipelineResult<EjectionReport>) -> PipelineResult<EjectionReport> {
        match &result {
            Ok(_) => metrics::record_run("success"),
            Err(e) => {
                metrics::record_run(if e.is_timeout() { "timeout" } else { "failure" });
                metrics::record_failure(e.stage());
            }
        }
        result
    }

    async fn execute(
        &self,
        logger: RequestLogger,
        upload: Upload,
        names: ArtifactNames,
    ) -> PipelineResult<EjectionReport> {
        let deadline = Instant::now() + self.config.request_timeout;
        let config = &self.config;

        let (names, upload_path) = run_stage(
            &logger,
            deadline,
            Stage::Persist,
            self.persist_upload(&logger, &names, &upload.bytes),
        )
        .await?;
        let logger = logger.with_stem(names.stem());
        logger.log_info(&format!("Upload saved at {}", upload_path.display()));

        let _workspace = self.lock_workspace(&logger, deadline).await?;

        let preprocess = config
            .preprocess_command
            .clone()
            .path_arg(&upload_path)
            .path_arg(&config.file_list_path)
            .path_arg(&config.volume_tracings_path);
        run_stage(
            &logger,
            deadline,
            Stage::Preprocess,
            self.run_tool(Stage::Preprocess, preprocess, deadline),
        )
        .await?;

        let segmentation = config
            .echonet_command
            .clone()
            .args(["segmentation", "--save_video", "--run_test", "--weights"])
            .path_arg(&config.segmentation_weights);
        run_stage(
            &logger,
            deadline,
            Stage::Segmentation,
            self.run_tool(Stage::Segmentation, segmentation, deadline),
        )
        .await?;

        let annotated_video = config
            .segmentation_videos_dir()
            .join(names.video_file_name());
        let positions = config.positions_command.clone().path_arg(&annotated_video);
        let coordinates = run_stage(&logger, deadline, Stage::Positions, async {
            let stdout = self.run_tool(Stage::Positions, positions, deadline).await?;
            parse_coordinates(&stdout)
        })
        .await?;

        let classification = config
            .echonet_command
            .clone()
            .args(["video", "--batch_size", "1", "--run_test", "--weights"])
            .path_arg(&config.classification_weights);
        run_stage(
            &logger,
            deadline,
            Stage::Classification,
            self.run_tool(Stage::Classification, classification, deadline),
        )
        .await?;

        let predictions_path = config.predictions_path();
        let video_file_name = names.video_file_name();
        let ejection_fraction = run_stage(
            &logger,
            deadline,
            Stage::Predictions,
            read_ejection_fraction(&predictions_path, &video_file_name),
        )
        .await?;

        let pacing_required = config.pacing_rule.requires_pacing(ejection_fraction);
        logger.log_info(&format!(
            "Extracted ejection fraction {} (pacing required: {}, rule {})",
            ejection_fraction, pacing_required, config.pacing_rule
        ));

        Ok(EjectionReport {
            ejection_fraction,
            pacing_required,
            coordinates,
        })
    }

    /// Write the upload under the first free stem.
    ///
    /// A stem is taken if any file in the videos directory already carries
    /// it, whatever the extension: the upload itself, its converted `.avi`
    /// or another same-second upload of a different format. Two requests in
    /// the same clock second then get `<stem>`, `<stem>_1`, ...
    async fn persist_upload(
        &self,
        logger: &RequestLogger,
        names: &ArtifactNames,
        bytes: &[u8],
    ) -> PipelineResult<(ArtifactNames, PathBuf)> {
        let videos_dir = &self.config.videos_dir;

        // Scan and create must not interleave with another request's
        let _naming = self.naming_lock.lock().await;
        let taken = stems_in(videos_dir, names.stem())
            .await
            .map_err(|e| PipelineError::Save(e.into()))?;

        for n in 0..MAX_NAME_ATTEMPTS {
            let candidate = names.disambiguated(n);
            if taken.contains(candidate.stem()) {
                continue;
            }

            let path = videos_dir.join(candidate.upload_file_name());
            match write_new_file(&path, bytes).await.map_err(PipelineError::Save)? {
                WriteOutcome::Written => {
                    if n > 0 {
                        logger.log_warning(&format!(
                            "Stem {} already taken, stored upload as {}",
                            names.stem(),
                            candidate.upload_file_name()
                        ));
                    }
                    return Ok((candidate, path));
                }
                WriteOutcome::AlreadyExists => continue,
            }
        }

        Err(PipelineError::Save(ToolError::Io(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("no free file name for stem {}", names.stem()),
        ))))
    }

    async fn lock_workspace(
        &self,
        logger: &RequestLogger,
        deadline: Instant,
    ) -> PipelineResult<tokio::sync::MutexGuard<'_, ()>> {
        let remaining = remaining(deadline, Stage::Preprocess)?;
        let started = Instant::now();

        let guard = tokio::time::timeout(remaining, self.workspace_lock.lock())
            .await
            .map_err(|_| PipelineError::Timeout {
                stage: Stage::Preprocess,
            })?;

        let waited = started.elapsed();
        metrics::record_lock_wait(waited.as_secs_f64());
        if waited > Duration::from_secs(1) {
            logger.log_info(&format!(
                "Waited {} ms for the workspace lock",
                waited.as_millis()
            ));
        }
        Ok(guard)
    }

    /// Run a tool with whatever is left of the request deadline.
    async fn run_tool(
        &self,
        stage: Stage,
        cmd: ToolCommand,
        deadline: Instant,
    ) -> PipelineResult<String> {
        let cmd = cmd.timeout(remaining(deadline, stage)?);
        let output = self
            .runner
            .run(&cmd)
            .await
            .map_err(|e| PipelineError::from_tool(stage, e))?;

        debug!(stage = %stage, "{} stdout: {}", cmd.name(), output.stdout.trim());
        Ok(output.stdout)
    }
}

/// File stems in `dir` that start with `prefix`; empty if `dir` is missing.
async fn stems_in(dir: &Path, prefix: &str) -> io::Result<HashSet<String>> {
    let mut stems = HashSet::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(stems),
        Err(e) => return Err(e),
    };

    while let Some(entry) = entries.next_entry().await? {
        let file_name = entry.file_name();
        if let Some(stem) = Path::new(&file_name).file_stem().and_then(|s| s.to_str()) {
            if stem.starts_with(prefix) {
                stems.insert(stem.to_string());
            }
        }
    }
    Ok(stems)
}

fn remaining(deadline: Instant, stage: Stage) -> PipelineResult<Duration> {
    let remaining = deadline.saturating_duration_since(Instant::now());
    if remaining.is_zero() {
        return Err(PipelineError::Timeout { stage });
    }
    Ok(remaining)
}

/// Run one stage with deadline check, logging and timing.
async fn run_stage<T, F>(
    logger: &RequestLogger,
    deadline: Instant,
    stage: Stage,
    work: F,
) -> PipelineResult<T>
where
    F: Future<Output = PipelineResult<T>>,
{
    remaining(deadline, stage)?;
    logger.log_stage_start(stage);
    let started = Instant::now();

    let result = work.await;

    let elapsed = started.elapsed();
    metrics::record_stage_duration(stage, elapsed.as_secs_f64());
    match &result {
        Ok(_) => logger.log_stage_completion(stage, elapsed.as_millis()),
        Err(e) => match e.details() {
            Some(details) => logger.log_stage_failure(stage, &format!("{e}\n{details}")),
            None => logger.log_stage_failure(stage, &e.to_string()),
        },
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use echoflow_models::{Comparison, Coordinate, PacingRule};
    use echoflow_tools::{ToolOutput, ToolResult};
    use mockall::mock;
    use tempfile::TempDir;

    mock! {
        Runner {}

        #[async_trait]
        impl ProcessRunner for Runner {
            async fn run(&self, cmd: &ToolCommand) -> ToolResult<ToolOutput>;
        }
    }

    const COORDINATES: &str = r#"{"2": [41, 56], "3": [38, 97], "4": [88, 30]}"#;

    fn names() -> ArtifactNames {
        ArtifactNames::derive(&Utc.with_ymd_and_hms(2024, 3, 5, 9, 7, 2).unwrap(), "scan.mp4")
    }

    /// `preprocess`, `segmentation`, `positions` or `classification`.
    fn stage_of(cmd: &ToolCommand) -> String {
        match cmd.name() {
            "echonet" if cmd.get_args().first().map(String::as_str) == Some("segmentation") => {
                "segmentation".to_string()
            }
            "echonet" => "classification".to_string(),
            other => other.to_string(),
        }
    }

    struct Fixture {
        _dir: TempDir,
        config: PipelineConfig,
        calls: Arc<StdMutex<Vec<String>>>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let config = PipelineConfig::rooted_at(dir.path());
            Self {
                _dir: dir,
                config,
                calls: Arc::new(StdMutex::new(Vec::new())),
            }
        }

        /// Mock that behaves like the real tools; `fail_at` makes one stage
        /// exit non-zero and `table` is what classification writes.
        fn runner(&self, fail_at: Option<&'static str>, positions_stdout: &str, table: &str) -> MockRunner {
            let calls = Arc::clone(&self.calls);
            let predictions = self.config.predictions_path();
            let positions_stdout = positions_stdout.to_string();
            let table = table.to_string();

            let mut runner = MockRunner::new();
            runner.expect_run().returning(move |cmd| {
                let stage = stage_of(cmd);
                calls.lock().unwrap().push(stage.clone());
                assert!(cmd.get_timeout().is_some(), "every tool gets a deadline");

                if fail_at == Some(stage.as_str()) {
                    return Err(ToolError::failed(cmd.name(), Some(1), "", format!("{stage} exploded\n")));
                }
                match stage.as_str() {
                    "positions" => Ok(ToolOutput::with_stdout(positions_stdout.clone())),
                    "classification" => {
                        std::fs::create_dir_all(predictions.parent().unwrap()).unwrap();
                        std::fs::write(&predictions, &table).unwrap();
                        Ok(ToolOutput::with_stdout(""))
                    }
                    _ => Ok(ToolOutput::with_stdout("")),
                }
            });
            runner
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    const TABLE: &str = "other.avi,0,12.0\n3_5_9_7_2.avi,0,55.25\n";

    #[tokio::test]
    async fn test_successful_run() {
        let fx = Fixture::new();
        let runner = fx.runner(None, COORDINATES, TABLE);
        let pipeline = Pipeline::new(fx.config.clone(), Arc::new(runner));

        let report = pipeline
            .run_with_names(&RequestId::new(), Upload::new("scan.mp4", b"video".to_vec()), names())
            .await
            .unwrap();

        assert!((report.ejection_fraction - 55.25).abs() < 1e-9);
        assert!(report.pacing_required);
        assert_eq!(
            report.coordinates,
            [
                Coordinate::new("41", "56"),
                Coordinate::new("38", "97"),
                Coordinate::new("88", "30"),
            ]
        );
        assert_eq!(
            fx.calls(),
            ["preprocess", "segmentation", "positions", "classification"]
        );

        let saved = fx.config.videos_dir.join("3_5_9_7_2.mp4");
        assert_eq!(std::fs::read(saved).unwrap(), b"video");
    }

    #[tokio::test]
    async fn test_tool_arguments() {
        let fx = Fixture::new();
        let config = fx.config.clone();
        let seen = Arc::new(StdMutex::new(Vec::<ToolCommand>::new()));
        let seen_in_mock = Arc::clone(&seen);
        let predictions = config.predictions_path();

        let mut runner = MockRunner::new();
        runner.expect_run().times(4).returning(move |cmd| {
            seen_in_mock.lock().unwrap().push(cmd.clone());
            if stage_of(cmd) == "classification" {
                std::fs::create_dir_all(predictions.parent().unwrap()).unwrap();
                std::fs::write(&predictions, TABLE).unwrap();
            }
            let stdout = if cmd.name() == "positions" { COORDINATES } else { "" };
            Ok(ToolOutput::with_stdout(stdout))
        });

        Pipeline::new(config.clone(), Arc::new(runner))
            .run_with_names(&RequestId::new(), Upload::new("scan.mp4", b"v".to_vec()), names())
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        let path = |p: &std::path::Path| p.to_string_lossy().to_string();

        assert_eq!(seen[0].program(), "python3");
        assert_eq!(
            seen[0].get_args(),
            &[
                "video_preprocess.py".to_string(),
                path(&config.videos_dir.join("3_5_9_7_2.mp4")),
                path(&config.file_list_path),
                path(&config.volume_tracings_path),
            ]
        );
        assert_eq!(
            seen[1].display(),
            format!(
                "echonet segmentation --save_video --run_test --weights {}",
                path(&config.segmentation_weights)
            )
        );
        assert_eq!(
            seen[2].get_args().last().unwrap(),
            &path(&config.segmentation_videos_dir().join("3_5_9_7_2.avi"))
        );
        assert_eq!(
            seen[3].display(),
            format!(
                "echonet video --batch_size 1 --run_test --weights {}",
                path(&config.classification_weights)
            )
        );
    }

    #[tokio::test]
    async fn test_empty_upload_invokes_nothing() {
        let fx = Fixture::new();
        let mut runner = MockRunner::new();
        runner.expect_run().times(0);

        let err = Pipeline::new(fx.config.clone(), Arc::new(runner))
            .run(&RequestId::new(), Upload::new("scan.mp4", Vec::new()))
            .await
            .unwrap_err();

        assert!(err.is_client_error());
        assert!(!fx.config.videos_dir.exists());
    }

    #[tokio::test]
    async fn test_failure_stops_later_stages() {
        let fx = Fixture::new();
        let runner = fx.runner(Some("segmentation"), COORDINATES, TABLE);

        let err = Pipeline::new(fx.config.clone(), Arc::new(runner))
            .run_with_names(&RequestId::new(), Upload::new("scan.mp4", b"v".to_vec()), names())
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Some(Stage::Segmentation));
        assert_eq!(err.message(), "Failed to execute echonet command");
        assert_eq!(err.details().as_deref(), Some("segmentation exploded\n"));
        assert_eq!(fx.calls(), ["preprocess", "segmentation"]);
    }

    #[tokio::test]
    async fn test_preprocess_failure() {
        let fx = Fixture::new();
        let runner = fx.runner(Some("preprocess"), COORDINATES, TABLE);

        let err = Pipeline::new(fx.config.clone(), Arc::new(runner))
            .run_with_names(&RequestId::new(), Upload::new("scan.mp4", b"v".to_vec()), names())
            .await
            .unwrap_err();

        assert_eq!(err.message(), "Failed to execute Python script");
        assert_eq!(fx.calls(), ["preprocess"]);
    }

    #[tokio::test]
    async fn test_malformed_coordinates_skip_classification() {
        let fx = Fixture::new();
        let runner = fx.runner(None, "Can't open file.\n", TABLE);

        let err = Pipeline::new(fx.config.clone(), Arc::new(runner))
            .run_with_names(&RequestId::new(), Upload::new("scan.mp4", b"v".to_vec()), names())
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::MalformedCoordinates(_)));
        assert_eq!(fx.calls(), ["preprocess", "segmentation", "positions"]);
    }

    #[tokio::test]
    async fn test_missing_prediction_row() {
        let fx = Fixture::new();
        let runner = fx.runner(None, COORDINATES, "other.avi,0,12.0\n");

        let err = Pipeline::new(fx.config.clone(), Arc::new(runner))
            .run_with_names(&RequestId::new(), Upload::new("scan.mp4", b"v".to_vec()), names())
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::PredictionNotFound { .. }));
        assert_eq!(fx.calls().len(), 4);
    }

    #[tokio::test]
    async fn test_pacing_rule_is_configurable() {
        let mut fx = Fixture::new();
        fx.config.pacing_rule = PacingRule::new(Comparison::Below, 40.0);
        let runner = fx.runner(None, COORDINATES, TABLE);

        let report = Pipeline::new(fx.config.clone(), Arc::new(runner))
            .run_with_names(&RequestId::new(), Upload::new("scan.mp4", b"v".to_vec()), names())
            .await
            .unwrap();

        assert!(!report.pacing_required);
    }

    #[tokio::test]
    async fn test_same_second_upload_is_disambiguated() {
        let fx = Fixture::new();
        std::fs::create_dir_all(&fx.config.videos_dir).unwrap();
        // A previous request in the same second already converted its upload.
        std::fs::write(fx.config.videos_dir.join("3_5_9_7_2.avi"), b"old").unwrap();

        let table = "3_5_9_7_2.avi,0,20.0\n3_5_9_7_2_1.avi,0,35.0\n";
        let runner = fx.runner(None, COORDINATES, table);

        let report = Pipeline::new(fx.config.clone(), Arc::new(runner))
            .run_with_names(&RequestId::new(), Upload::new("scan.mp4", b"new".to_vec()), names())
            .await
            .unwrap();

        assert!((report.ejection_fraction - 35.0).abs() < 1e-9);
        assert!(fx.config.videos_dir.join("3_5_9_7_2_1.mp4").exists());
    }

    #[tokio::test]
    async fn test_same_second_upload_with_other_extension_is_disambiguated() {
        let fx = Fixture::new();
        std::fs::create_dir_all(&fx.config.videos_dir).unwrap();
        // A .mov upload from the same second is still waiting for preprocessing.
        std::fs::write(fx.config.videos_dir.join("3_5_9_7_2.mov"), b"mov").unwrap();

        let table = "3_5_9_7_2.avi,0,20.0\n3_5_9_7_2_1.avi,0,35.0\n";
        let runner = fx.runner(None, COORDINATES, table);

        let report = Pipeline::new(fx.config.clone(), Arc::new(runner))
            .run_with_names(&RequestId::new(), Upload::new("scan.mp4", b"mp4".to_vec()), names())
            .await
            .unwrap();

        assert!((report.ejection_fraction - 35.0).abs() < 1e-9);

        let mut stored: Vec<String> = std::fs::read_dir(&fx.config.videos_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        stored.sort();
        assert_eq!(stored, ["3_5_9_7_2.mov", "3_5_9_7_2_1.mp4"]);
    }

    #[tokio::test]
    async fn test_longer_stem_does_not_block_base_stem() {
        let fx = Fixture::new();
        std::fs::create_dir_all(&fx.config.videos_dir).unwrap();
        // 3_5_9_7_20 shares the prefix but is a different second.
        std::fs::write(fx.config.videos_dir.join("3_5_9_7_20.avi"), b"x").unwrap();

        let runner = fx.runner(None, COORDINATES, TABLE);
        Pipeline::new(fx.config.clone(), Arc::new(runner))
            .run_with_names(&RequestId::new(), Upload::new("scan.mp4", b"v".to_vec()), names())
            .await
            .unwrap();

        assert!(fx.config.videos_dir.join("3_5_9_7_2.mp4").exists());
    }

    #[tokio::test]
    async fn test_deadline_expires_while_waiting_for_workspace() {
        let mut fx = Fixture::new();
        fx.config.request_timeout = Duration::from_millis(250);
        let mut runner = MockRunner::new();
        runner.expect_run().times(0);
        let pipeline = Pipeline::new(fx.config.clone(), Arc::new(runner));

        // Another request is mid-pipeline.
        let _held = pipeline.workspace_lock.lock().await;

        let err = pipeline
            .run_with_names(&RequestId::new(), Upload::new("scan.mp4", b"v".to_vec()), names())
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert!(matches!(err, PipelineError::Timeout { stage: Stage::Preprocess }));
        assert_eq!(err.message(), "Response timeout");
        // Persisting happens before the lock.
        assert!(fx.config.videos_dir.join("3_5_9_7_2.mp4").exists());
    }

    #[tokio::test]
    async fn test_expired_deadline_runs_nothing() {
        let mut fx = Fixture::new();
        fx.config.request_timeout = Duration::ZERO;
        let mut runner = MockRunner::new();
        runner.expect_run().times(0);

        let err = Pipeline::new(fx.config.clone(), Arc::new(runner))
            .run_with_names(&RequestId::new(), Upload::new("scan.mp4", b"v".to_vec()), names())
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Timeout { stage: Stage::Persist }));
    }

    #[tokio::test]
    async fn test_tool_timeout_maps_to_pipeline_timeout() {
        let fx = Fixture::new();
        let mut runner = MockRunner::new();
        runner.expect_run().times(1).returning(|cmd| {
            Err(ToolError::Timeout {
                tool: cmd.name().to_string(),
                seconds: 600,
            })
        });

        let err = Pipeline::new(fx.config.clone(), Arc::new(runner))
            .run_with_names(&RequestId::new(), Upload::new("scan.mp4", b"v".to_vec()), names())
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(err.stage(), Some(Stage::Preprocess));
    }

    /// Runner that sleeps in every tool and tracks how many run at once.
    struct SlowRunner {
        active: AtomicUsize,
        max_active: AtomicUsize,
        predictions: PathBuf,
    }

    #[async_trait]
    impl ProcessRunner for SlowRunner {
        async fn run(&self, cmd: &ToolCommand) -> ToolResult<ToolOutput> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);

            if stage_of(cmd) == "classification" {
                tokio::fs::create_dir_all(self.predictions.parent().unwrap()).await?;
                tokio::fs::write(&self.predictions, "3_5_9_7_2.avi,0,50.0\n3_5_9_7_2_1.avi,0,60.0\n")
                    .await?;
            }
            let stdout = if cmd.name() == "positions" { COORDINATES } else { "" };
            Ok(ToolOutput::with_stdout(stdout))
        }
    }

    #[tokio::test]
    async fn test_concurrent_requests_are_serialized() {
        let fx = Fixture::new();
        let runner = Arc::new(SlowRunner {
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            predictions: fx.config.predictions_path(),
        });
        let pipeline = Pipeline::new(fx.config.clone(), runner.clone());

        let (id_a, id_b) = (RequestId::new(), RequestId::new());
        let first = pipeline.run_with_names(&id_a, Upload::new("a.mp4", b"a".to_vec()), names());
        let second = pipeline.run_with_names(&id_b, Upload::new("b.mp4", b"b".to_vec()), names());
        let (first, second) = tokio::join!(first, second);

        let mut fractions = [
            first.unwrap().ejection_fraction,
            second.unwrap().ejection_fraction,
        ];
        fractions.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(fractions, [50.0, 60.0]);
        assert_eq!(runner.max_active.load(Ordering::SeqCst), 1);
    }
}
