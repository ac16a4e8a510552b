//! Pipeline configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use echoflow_models::PacingRule;
use echoflow_tools::ToolCommand;

use crate::error::{PipelineError, PipelineResult};

const DEFAULT_DATA_DIR: &str = "a4c-video-dir";
const DEFAULT_SEGMENTATION_RUN_DIR: &str = "output/segmentation/deeplabv3_resnet50_random";
const DEFAULT_CLASSIFICATION_RUN_DIR: &str = "output/video/r2plus1d_18_32_2_pretrained";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 600;

/// File name of the weights inside a model run directory.
pub const WEIGHTS_FILE_NAME: &str = "best.pt";
/// File name of the classification tool's predictions table.
pub const PREDICTIONS_FILE_NAME: &str = "test_predictions.csv";

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Where uploads are stored (the tools' input directory)
    pub videos_dir: PathBuf,
    /// File-list metadata table mutated by the preprocessing tool
    pub file_list_path: PathBuf,
    /// Volume-tracings metadata table mutated by the preprocessing tool
    pub volume_tracings_path: PathBuf,
    /// Preprocessing tool (video path, file list, tracings are appended)
    pub preprocess_command: ToolCommand,
    /// Position-extraction tool (annotated video path is appended)
    pub positions_command: ToolCommand,
    /// EchoNet CLI used for segmentation and classification
    pub echonet_command: ToolCommand,
    /// Segmentation model run directory
    pub segmentation_run_dir: PathBuf,
    /// Segmentation model weights
    pub segmentation_weights: PathBuf,
    /// Classification model run directory
    pub classification_run_dir: PathBuf,
    /// Classification model weights
    pub classification_weights: PathBuf,
    /// Ejection fraction threshold for a pacing recommendation
    pub pacing_rule: PacingRule,
    /// Deadline for one request, lock wait included
    pub request_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::rooted_at("")
    }
}

impl PipelineConfig {
    /// Default layout with every relative path placed under `root`.
    pub fn rooted_at(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        let data_dir = root.join(DEFAULT_DATA_DIR);
        let segmentation_run_dir = root.join(DEFAULT_SEGMENTATION_RUN_DIR);
        let classification_run_dir = root.join(DEFAULT_CLASSIFICATION_RUN_DIR);

        Self {
            videos_dir: data_dir.join("Videos"),
            file_list_path: data_dir.join("FileList.csv"),
            volume_tracings_path: data_dir.join("VolumeTracings.csv"),
            preprocess_command: default_preprocess_command(),
            positions_command: default_positions_command(),
            echonet_command: default_echonet_command(),
            segmentation_weights: segmentation_run_dir.join(WEIGHTS_FILE_NAME),
            segmentation_run_dir,
            classification_weights: classification_run_dir.join(WEIGHTS_FILE_NAME),
            classification_run_dir,
            pacing_rule: PacingRule::default(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }

    /// Create config from environment variables.
    pub fn from_env() -> PipelineResult<Self> {
        let data_dir = PathBuf::from(env_or("DATA_DIR", DEFAULT_DATA_DIR));
        let segmentation_run_dir =
            PathBuf::from(env_or("SEGMENTATION_RUN_DIR", DEFAULT_SEGMENTATION_RUN_DIR));
        let classification_run_dir =
            PathBuf::from(env_or("CLASSIFICATION_RUN_DIR", DEFAULT_CLASSIFICATION_RUN_DIR));

        let pacing_rule = match std::env::var("PACING_RULE") {
            Ok(rule) => rule
                .parse()
                .map_err(|e| PipelineError::config(format!("PACING_RULE: {e}")))?,
            Err(_) => PacingRule::default(),
        };

        Ok(Self {
            videos_dir: env_path_or("VIDEOS_DIR", data_dir.join("Videos")),
            file_list_path: env_path_or("FILE_LIST_PATH", data_dir.join("FileList.csv")),
            volume_tracings_path: env_path_or(
                "VOLUME_TRACINGS_PATH",
                data_dir.join("VolumeTracings.csv"),
            ),
            preprocess_command: env_command("PREPROCESS_COMMAND", default_preprocess_command())?,
            positions_command: env_command("POSITIONS_COMMAND", default_positions_command())?,
            echonet_command: env_command("ECHONET_COMMAND", default_echonet_command())?,
            segmentation_weights: env_path_or(
                "SEGMENTATION_WEIGHTS",
                segmentation_run_dir.join(WEIGHTS_FILE_NAME),
            ),
            segmentation_run_dir,
            classification_weights: env_path_or(
                "CLASSIFICATION_WEIGHTS",
                classification_run_dir.join(WEIGHTS_FILE_NAME),
            ),
            classification_run_dir,
            pacing_rule,
            request_timeout: Duration::from_secs(
                std::env::var("REQUEST_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            ),
        })
    }

    /// Directory the segmentation tool writes annotated videos to.
    pub fn segmentation_videos_dir(&self) -> PathBuf {
        self.segmentation_run_dir.join("videos")
    }

    /// Predictions table the classification tool regenerates each run.
    pub fn predictions_path(&self) -> PathBuf {
        self.classification_run_dir.join(PREDICTIONS_FILE_NAME)
    }

    /// Every configured tool command.
    pub fn tool_commands(&self) -> [&ToolCommand; 3] {
        [
            &self.preprocess_command,
            &self.positions_command,
            &self.echonet_command,
        ]
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_path_or(key: &str, default: PathBuf) -> PathBuf {
    std::env::var(key).map(PathBuf::from).unwrap_or(default)
}

/// Command line from `key`, keeping the name of `default`.
fn env_command(key: &str, default: ToolCommand) -> PipelineResult<ToolCommand> {
    match std::env::var(key) {
        Ok(line) => parse_command(key, default.name(), &line),
        Err(_) => Ok(default),
    }
}

fn parse_command(key: &str, name: &str, line: &str) -> PipelineResult<ToolCommand> {
    ToolCommand::parse(name, line).map_err(|e| PipelineError::config(format!("{key}: {e}")))
}

fn default_preprocess_command() -> ToolCommand {
    ToolCommand::new("preprocess", "python3").arg("video_preprocess.py")
}

fn default_positions_command() -> ToolCommand {
    ToolCommand::new("positions", "python3").arg("get_three_positions.py")
}

fn default_echonet_command() -> ToolCommand {
    ToolCommand::new("echonet", "echonet")
}
