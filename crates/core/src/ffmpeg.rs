//! ffmpeg process plumbing.
//!
//! Builds the keyframe-extraction argument list and runs the tool as a child
//! process with captured output and a bounded wait. Nothing here knows about
//! catalogs or uploads; see [`crate::extraction`] for the pipeline step.

use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

/// Output file pattern handed to ffmpeg. `%d` starts at 1 and increments per
/// written frame, which gives `frame_1.jpg`, `frame_2.jpg`, ...
pub const FRAME_FILE_PATTERN: &str = "frame_%d.jpg";

/// Maximum stdout or stderr size captured per stream (1 MiB).
const MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// Error type for ffmpeg invocations.
#[derive(Debug, thiserror::Error)]
pub enum FfmpegError {
    #[error("ffmpeg unavailable: {0}")]
    ToolUnavailable(String),

    #[error("ffmpeg execution failed (exit code {exit_code:?}): {stderr}")]
    ExecutionFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("ffmpeg timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Captured output of a successful tool run.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

/// Arguments selecting only intra-coded frames, one output image per key
/// frame (`-vsync vfr` drops the duplicates constant-rate output would add).
pub fn keyframe_args(input: &Path, output_dir: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-hide_banner", "-nostdin", "-loglevel", "error", "-y", "-i"]
        .into_iter()
        .map(OsString::from)
        .collect();
    args.push(input.as_os_str().to_owned());
    args.extend(
        ["-vf", "select='eq(pict_type,PICT_TYPE_I)'", "-vsync", "vfr"]
            .into_iter()
            .map(OsString::from),
    );
    args.push(output_dir.join(FRAME_FILE_PATTERN).into_os_string());
    args
}

/// Spawn `cmd`, capture stdout/stderr, and wait at most `timeout`.
///
/// A process still running at the deadline is killed and reported as
/// [`FfmpegError::Timeout`]. A launch failure means the tool cannot be used
/// at all and is reported as [`FfmpegError::ToolUnavailable`].
pub async fn run_tool(cmd: &mut Command, timeout: Duration) -> Result<ToolOutput, FfmpegError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let program = cmd.as_std().get_program().to_string_lossy().into_owned();
    let start = Instant::now();
    let deadline = tokio::time::Instant::now() + timeout;

    let mut child = cmd
        .spawn()
        .map_err(|e| FfmpegError::ToolUnavailable(format!("{program}: {e}")))?;

    let stdout_task = tokio::spawn(read_stream(child.stdout.take()));
    let stderr_task = tokio::spawn(read_stream(child.stderr.take()));
    let readers = [stdout_task.abort_handle(), stderr_task.abort_handle()];

    let status = match tokio::time::timeout_at(deadline, child.wait()).await {
        Ok(status) => status?,
        Err(_elapsed) => {
            // Reap the child so it does not linger as a zombie.
            if let Err(e) = child.kill().await {
                tracing::warn!(error = %e, program = %program, "Failed to kill timed-out process");
            }
            readers.iter().for_each(|r| r.abort());
            return Err(FfmpegError::Timeout {
                elapsed_ms: start.elapsed().as_millis() as u64,
            });
        }
    };

    // A descendant that inherited the pipes can hold them open after the
    // child exits, so the reads share the same deadline.
    let collected = tokio::time::timeout_at(deadline, async {
        (
            stdout_task.await.unwrap_or_default(),
            stderr_task.await.unwrap_or_default(),
        )
    })
    .await;
    let (stdout, stderr) = match collected {
        Ok((out, err)) => (
            String::from_utf8_lossy(&out).into_owned(),
            String::from_utf8_lossy(&err).into_owned(),
        ),
        Err(_elapsed) => {
            readers.iter().for_each(|r| r.abort());
            tracing::warn!(program = %program, "Output pipes still open at deadline");
            return Err(FfmpegError::Timeout {
                elapsed_ms: start.elapsed().as_millis() as u64,
            });
        }
    };

    if !status.success() {
        return Err(FfmpegError::ExecutionFailed {
            exit_code: status.code(),
            stderr,
        });
    }

    Ok(ToolOutput {
        stdout,
        stderr,
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

/// Last `max_chars` characters of a diagnostic stream, trimmed.
pub fn stderr_tail(stderr: &str, max_chars: usize) -> &str {
    let trimmed = stderr.trim();
    let count = trimmed.chars().count();
    if count <= max_chars {
        return trimmed;
    }
    let skip = count - max_chars;
    match trimmed.char_indices().nth(skip) {
        Some((idx, _)) => &trimmed[idx..],
        None => trimmed,
    }
}

/// Read a stream into memory, keeping at most [`MAX_OUTPUT_BYTES`].
///
/// Anything past the cap is drained and discarded so the child never blocks
/// on a full pipe.
async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = (&mut h)
            .take(MAX_OUTPUT_BYTES as u64)
            .read_to_end(&mut buf)
            .await;
        let _ = tokio::io::copy(&mut h, &mut tokio::io::sink()).await;
    }
    buf
}


#[cfg(test)]
mod tests {
    use super::test_support::write_fake_tool;
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn keyframe_args_select_intra_frames_with_vfr() {
        let args = keyframe_args(Path::new("/tmp/in.mp4"), Path::new("/tmp/out"));
        let args: Vec<String> = args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        let i = args.iter().position(|a| a == "-i").expect("-i flag");
        assert_eq!(args[i + 1], "/tmp/in.mp4");

        let vf = args.iter().position(|a| a == "-vf").expect("-vf flag");
        assert_eq!(args[vf + 1], "select='eq(pict_type,PICT_TYPE_I)'");

        let vsync = args.iter().position(|a| a == "-vsync").expect("-vsync flag");
        assert_eq!(args[vsync + 1], "vfr");

        assert_eq!(args.last().map(String::as_str), Some("/tmp/out/frame_%d.jpg"));
    }

    #[test]
    fn stderr_tail_keeps_the_end() {
        assert_eq!(stderr_tail("  short \n", 100), "short");
        assert_eq!(stderr_tail("abcdefgh", 3), "fgh");
    }

    #[tokio::test]
    async fn run_tool_captures_output() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let tool = write_fake_tool(dir.path(), "tool", "echo out\necho err >&2\n");

        let output = run_tool(&mut Command::new(&tool), Duration::from_secs(5))
            .await
            .expect("run tool");
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
    }

    #[tokio::test]
    async fn run_tool_reports_nonzero_exit_with_stderr() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let tool = write_fake_tool(dir.path(), "tool", "echo 'moov atom not found' >&2\nexit 1\n");

        let result = run_tool(&mut Command::new(&tool), Duration::from_secs(5)).await;
        assert_matches!(
            result,
            Err(FfmpegError::ExecutionFailed { exit_code: Some(1), ref stderr })
                if stderr.contains("moov atom not found")
        );
    }

    #[tokio::test]
    async fn run_tool_kills_on_timeout() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let tool = write_fake_tool(dir.path(), "tool", "sleep 60\n");

        let result = run_tool(&mut Command::new(&tool), Duration::from_millis(200)).await;
        assert_matches!(result, Err(FfmpegError::Timeout { .. }));
    }

    #[tokio::test]
    async fn run_tool_does_not_wait_past_deadline_for_inherited_pipes() {
        let dir = tempfile::tempdir().expect("create temp dir");
        // The background sleep keeps stdout and stderr open after sh exits.
        let tool = write_fake_tool(dir.path(), "tool", "sleep 30 &\nexit 0\n");

        let start = Instant::now();
        let result = run_tool(&mut Command::new(&tool), Duration::from_millis(500)).await;
        assert_matches!(result, Err(FfmpegError::Timeout { .. }));
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn run_tool_missing_binary_is_unavailable() {
        let result = run_tool(
            &mut Command::new("/nonexistent/ffmpeg"),
            Duration::from_secs(5),
        )
        .await;
        assert_matches!(result, Err(FfmpegError::ToolUnavailable(_)));
    }
}
