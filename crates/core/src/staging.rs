//! Staging uploaded videos on disk for the duration of one extraction job.

use std::path::{Path, PathBuf};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use uuid::Uuid;

use crate::error::CoreError;

/// Video container extensions kept on the staged file name.
pub const SUPPORTED_VIDEO_EXTENSIONS: &[&str] = &["mp4", "m4v", "mov", "mkv", "webm", "avi"];

/// Extension used when the client name carries no recognized one.
const FALLBACK_EXTENSION: &str = "bin";

/// Chunk size for copying an upload to disk.
const COPY_BUFFER_BYTES: usize = 64 * 1024;

/// Writes inbound payloads to unique files under one directory.
#[derive(Debug, Clone)]
pub struct Stager {
    dir: PathBuf,
    max_bytes: Option<u64>,
}

impl Stager {
    pub fn new(dir: impl Into<PathBuf>, max_bytes: Option<u64>) -> Self {
        Self {
            dir: dir.into(),
            max_bytes,
        }
    }

    /// Copy `reader` to a fresh `<uuid>.<ext>` file.
    ///
    /// The returned [`StagedVideo`] is complete and synced. On any error the
    /// partial file has already been removed.
    pub async fn stage<R>(
        &self,
        reader: R,
        content_type: Option<&str>,
        file_name: Option<&str>,
    ) -> Result<StagedVideo, CoreError>
    where
        R: AsyncRead + Unpin + Send,
    {
        validate_content_type(content_type)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self
            .dir
            .join(format!("{}.{}", Uuid::new_v4(), staged_extension(file_name)));

        match self.write_payload(&path, reader).await {
            Ok(size_bytes) => {
                tracing::debug!(path = %path.display(), size_bytes, "Staged upload");
                Ok(StagedVideo {
                    path,
                    size_bytes,
                    removed: false,
                })
            }
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_file(&path).await {
                    if rm.kind() != std::io::ErrorKind::NotFound {
                        tracing::warn!(path = %path.display(), error = %rm, "Failed to remove partial upload");
                    }
                }
                Err(e)
            }
        }
    }

    async fn write_payload<R>(&self, path: &Path, mut reader: R) -> Result<u64, CoreError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await?;

        let mut buf = vec![0u8; COPY_BUFFER_BYTES];
        let mut written: u64 = 0;
        loop {
            // Read failures belong to the client's payload, not to our disk.
            let n = reader
                .read(&mut buf)
                .await
                .map_err(|e| CoreError::Validation(format!("Upload could not be read: {e}")))?;
            if n == 0 {
                break;
            }
            written += n as u64;
            if let Some(limit) = self.max_bytes {
                if written > limit {
                    return Err(CoreError::PayloadTooLarge { limit });
                }
            }
            file.write_all(&buf[..n]).await?;
        }

        if written == 0 {
            return Err(CoreError::Validation("Uploaded video is empty".into()));
        }

        file.flush().await?;
        file.sync_all().await?;
        Ok(written)
    }
}

/// An uploaded video on disk, owned by exactly one job.
///
/// Call [`StagedVideo::remove`] when the job is done. If the value is dropped
/// instead (early return, panic, cancelled request) the file is unlinked
/// synchronously in `Drop`.
#[derive(Debug)]
pub struct StagedVideo {
    path: PathBuf,
    size_bytes: u64,
    removed: bool,
}

impl StagedVideo {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Delete the staged file. Already-missing files are not an error.
    pub async fn remove(mut self) -> std::io::Result<()> {
        self.removed = true;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl Drop for StagedVideo {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "Removed staged upload on drop"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove staged upload")
            }
        }
    }
}

/// Accept an absent type, `application/octet-stream`, or any `video/*` type.
pub fn validate_content_type(content_type: Option<&str>) -> Result<(), CoreError> {
    let Some(raw) = content_type else {
        return Ok(());
    };
    let essence = raw
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    if essence.is_empty() || essence == "application/octet-stream" || essence.starts_with("video/")
    {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "Unsupported content type '{raw}'. Expected a video upload"
        )))
    }
}

/// Lowercased extension of the client file name when it is a known video
/// container, otherwise a neutral fallback. Client names never reach the
/// filesystem.
fn staged_extension(file_name: Option<&str>) -> &'static str {
    let ext = file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    ext.and_then(|ext| {
        SUPPORTED_VIDEO_EXTENSIONS
            .iter()
            .copied()
            .find(|known| *known == ext)
    })
    .unwrap_or(FALLBACK_EXTENSION)
}
