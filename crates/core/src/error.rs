use crate::ffmpeg::FfmpegError;

/// Domain errors for the extraction and packaging pipeline.
///
/// Every failure is local to the request that produced it; none of these
/// variants leaves the published catalog in a partial state.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("ffmpeg not found on server: {0}")]
    ToolUnavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ffmpeg exited with code {exit_code:?}: {stderr}")]
    ExtractionFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("ffmpeg timed out after {elapsed_ms}ms")]
    ExtractionTimeout { elapsed_ms: u64 },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Upload exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: u64 },

    #[error("No frames selected.")]
    NoFramesSelected,

    #[error("No valid frames found.")]
    NoValidFrames,

    #[error("Frame not found: {0}")]
    FrameNotFound(String),

    #[error("Archive error: {0}")]
    Archive(String),
}

impl From<FfmpegError> for CoreError {
    fn from(err: FfmpegError) -> Self {
        match err {
            FfmpegError::ToolUnavailable(msg) => CoreError::ToolUnavailable(msg),
            FfmpegError::ExecutionFailed { exit_code, stderr } => {
                CoreError::ExtractionFailed { exit_code, stderr }
            }
            FfmpegError::Timeout { elapsed_ms } => CoreError::ExtractionTimeout { elapsed_ms },
            FfmpegError::IoError(e) => CoreError::Io(e),
        }
    }
}

impl From<zip::result::ZipError> for CoreError {
    fn from(err: zip::result::ZipError) -> Self {
        CoreError::Archive(err.to_string())
    }
}
