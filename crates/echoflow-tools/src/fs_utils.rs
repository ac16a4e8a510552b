//! Filesystem utilities for handing files to the tools.

use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::ToolResult;

/// Outcome of [`write_new_file`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// Something already lives at the path; nothing was written.
    AlreadyExists,
}

/// Create the directory (and parents) if missing.
pub async fn ensure_dir(path: impl AsRef<Path>) -> ToolResult<()> {
    fs::create_dir_all(path.as_ref()).await?;
    Ok(())
}

/// Write `bytes` to `path`, refusing to overwrite.
///
/// The existence check and the create are a single atomic `O_EXCL` open, so
/// two writers racing for the same name cannot both win. The parent
/// directory is created if needed.
///
/// On a failed write the partial file is removed (best effort).
pub async fn write_new_file(path: impl AsRef<Path>, bytes: &[u8]) -> ToolResult<WriteOutcome> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).await?;
        }
    }

    let mut file = match fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
    {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(WriteOutcome::AlreadyExists),
        Err(e) => return Err(e.into()),
    };

    let written = async {
        file.write_all(bytes).await?;
        file.flush().await?;
        file.sync_all().await
    }
    .await;

    if let Err(e) = written {
        tracing::error!("Failed to write {}: {}", path.display(), e);
        if let Err(cleanup) = fs::remove_file(path).await {
            tracing::warn!("Failed to remove partial file {}: {}", path.display(), cleanup);
        }
        return Err(e.into());
    }

    Ok(WriteOutcome::Written)
}
