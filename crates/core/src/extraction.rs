//! Keyframe extraction step.
//!
//! [`FrameExtractor`] is the seam between the pipeline and the codec: the
//! service runs [`FfmpegExtractor`], tests substitute an extractor that writes
//! a fixed frame set.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::catalog::is_frame_image;
use crate::ffmpeg::{keyframe_args, run_tool, FfmpegError};
use crate::tool::ToolLocator;

/// Default bound on a single extraction run.
pub const DEFAULT_EXTRACTION_TIMEOUT: Duration = Duration::from_secs(300);

/// Produces numbered frame images (`frame_1.jpg`, `frame_2.jpg`, ...) for
/// the key frames of a video.
#[async_trait]
pub trait FrameExtractor: Send + Sync {
    /// Check that the extractor can run at all. Called before an upload is
    /// staged so an unusable tool fails fast.
    async fn check(&self) -> Result<(), FfmpegError>;

    /// Extract the key frames of `video` into `output_dir`.
    ///
    /// On success `output_dir` holds exactly the frames of this run. On error
    /// its contents are unspecified and must not be trusted.
    async fn extract(&self, video: &Path, output_dir: &Path) -> Result<(), FfmpegError>;
}

/// Extractor backed by the external ffmpeg executable.
#[derive(Debug)]
pub struct FfmpegExtractor {
    locator: ToolLocator,
    timeout: Duration,
}

impl FfmpegExtractor {
    pub fn new(locator: ToolLocator, timeout: Duration) -> Self {
        Self { locator, timeout }
    }
}

#[async_trait]
impl FrameExtractor for FfmpegExtractor {
    async fn check(&self) -> Result<(), FfmpegError> {
        self.locator.locate().await.map(|_| ())
    }

    async fn extract(&self, video: &Path, output_dir: &Path) -> Result<(), FfmpegError> {
        let tool = self.locator.locate().await?;

        tokio::fs::create_dir_all(output_dir).await?;
        let purged = purge_frames(output_dir).await?;
        if purged > 0 {
            tracing::debug!(dir = %output_dir.display(), purged, "Removed stale frames before extraction");
        }

        let mut cmd = Command::new(&tool);
        cmd.args(keyframe_args(video, output_dir));

        tracing::info!(
            tool = %tool.display(),
            video = %video.display(),
            output = %output_dir.display(),
            "Running keyframe extraction"
        );
        let output = run_tool(&mut cmd, self.timeout).await?;
        tracing::info!(duration_ms = output.duration_ms, "Keyframe extraction finished");

        Ok(())
    }
}

/// Remove every frame image (by extension) directly inside `dir`.
///
/// Other files and subdirectories are left alone. Returns the number of
/// files removed; a missing directory counts as already empty.
pub async fn purge_frames(dir: &Path) -> std::io::Result<usize> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let mut removed = 0;
    while let Some(entry) = entries.next_entry().await? {
        let is_frame = entry.file_name().to_str().is_some_and(is_frame_image);
        if is_frame && entry.file_type().await?.is_file() {
            tokio::fs::remove_file(entry.path()).await?;
            removed += 1;
        }
    }
    Ok(removed)
}
