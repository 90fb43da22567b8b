use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use keyframe_core::error::CoreError;
use keyframe_core::ffmpeg::stderr_tail;
use serde_json::json;

/// Characters of ffmpeg diagnostics included in an error response.
const MAX_DIAGNOSTIC_CHARS: usize = 2000;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `keyframe_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Core(core) => classify_core_error(core),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Map a [`CoreError`] to an HTTP status, error code, and client message.
///
/// - Selection and upload problems are client errors (400/404/413).
/// - Tool failures are 500s that carry the diagnostic so the caller can act.
/// - I/O and archive failures are 500s with a sanitized message.
fn classify_core_error(err: &CoreError) -> (StatusCode, &'static str, String) {
    match err {
        CoreError::NoFramesSelected => (
            StatusCode::BAD_REQUEST,
            "NO_FRAMES_SELECTED",
            err.to_string(),
        ),
        CoreError::NoValidFrames => (StatusCode::BAD_REQUEST, "NO_VALID_FRAMES", err.to_string()),
        CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
        CoreError::PayloadTooLarge { .. } => (
            StatusCode::PAYLOAD_TOO_LARGE,
            "PAYLOAD_TOO_LARGE",
            err.to_string(),
        ),
        CoreError::FrameNotFound(_) => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "Frame not found.".to_string(),
        ),
        CoreError::ToolUnavailable(detail) => {
            tracing::error!(error = %detail, "ffmpeg unavailable");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "TOOL_UNAVAILABLE",
                "ffmpeg not found on server.".to_string(),
            )
        }
        CoreError::ExtractionFailed { exit_code, stderr } => {
            tracing::error!(exit_code = ?exit_code, stderr = %stderr, "Frame extraction failed");
            let detail = stderr_tail(stderr, MAX_DIAGNOSTIC_CHARS);
            let message = match exit_code {
                Some(code) => format!("Error extracting frames (exit code {code}): {detail}"),
                None => format!("Error extracting frames (terminated by signal): {detail}"),
            };
            (StatusCode::INTERNAL_SERVER_ERROR, "EXTRACTION_FAILED", message)
        }
        CoreError::ExtractionTimeout { elapsed_ms } => {
            tracing::error!(elapsed_ms, "Frame extraction timed out");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "EXTRACTION_TIMEOUT",
                format!("Frame extraction timed out after {elapsed_ms}ms"),
            )
        }
        CoreError::Io(e) => {
            tracing::error!(error = %e, "I/O error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "IO_ERROR",
                "A storage error occurred".to_string(),
            )
        }
        CoreError::Archive(msg) => {
            tracing::error!(error = %msg, "Archive error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            )
        }
    }
}
