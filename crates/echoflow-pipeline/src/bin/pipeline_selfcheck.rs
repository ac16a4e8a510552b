use std::path::Path;

use echoflow_pipeline::PipelineConfig;
use echoflow_tools::{check_tool, ensure_dir};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = PipelineConfig::from_env()?;

    println!(
        "pipeline-selfcheck: starting with videos_dir={}",
        config.videos_dir.display()
    );
    ensure_dir(&config.videos_dir).await?;
    ensure_tools(&config)?;
    ensure_files(&[
        config.file_list_path.as_path(),
        config.volume_tracings_path.as_path(),
        config.segmentation_weights.as_path(),
        config.classification_weights.as_path(),
    ])?;

    println!("pipeline-selfcheck: pacing rule {}", config.pacing_rule);
    println!("pipeline-selfcheck: ok");
    Ok(())
}

fn ensure_tools(config: &PipelineConfig) -> anyhow::Result<()> {
    for cmd in config.tool_commands() {
        let path = check_tool(cmd.program())
            .map_err(|e| anyhow::anyhow!("{} tool not available: {}", cmd.name(), e))?;
        println!("pipeline-selfcheck: {} -> {}", cmd.name(), path.display());
    }
    Ok(())
}

fn ensure_files(paths: &[&Path]) -> anyhow::Result<()> {
    for path in paths {
        if !path.is_file() {
            return Err(anyhow::anyhow!("missing required file {}", path.display()));
        }
    }
    Ok(())
}
