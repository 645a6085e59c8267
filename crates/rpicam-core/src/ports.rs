use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::{config::ImageSize, Result};

/// Hexagonal port for the still camera.
///
/// The port owns the artifact lifecycle: whatever `capture` produces, the
/// dispatcher hands back to `discard` exactly once.
#[async_trait]
pub trait Camera: Send + Sync {
    /// Take one picture into `output_dir` and return the file path.
    ///
    /// No timeout: a hung device stalls the caller.
    async fn capture(&self, output_dir: &Path, size: ImageSize) -> Result<PathBuf>;

    async fn discard(&self, path: &Path) -> Result<()> {
        tokio::fs::remove_file(path).await?;
        Ok(())
    }
}
