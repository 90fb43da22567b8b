//! Locating the ffmpeg executable.
//!
//! A copy bundled next to the running program wins over whatever is on
//! `PATH`. Either candidate must answer `-version` before it is used.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::process::Command;
use tokio::sync::OnceCell;

use crate::ffmpeg::{run_tool, FfmpegError};

/// Upper bound for the `-version` probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a failed lookup is answered from memory before probing again.
pub const DEFAULT_FAILURE_TTL: Duration = Duration::from_secs(10);

/// Resolves and verifies the external extraction tool.
///
/// A successful lookup is cached for the life of the locator. A failure is
/// remembered only for the failure TTL, so a tool installed after startup is
/// picked up shortly after without re-probing on every call.
#[derive(Debug)]
pub struct ToolLocator {
    program: String,
    bundled_dir: Option<PathBuf>,
    resolved: OnceCell<PathBuf>,
    failure_ttl: Duration,
    last_failure: Mutex<Option<(Instant, String)>>,
}

impl ToolLocator {
    /// Locator for `program`, checking `bundled_dir` before `PATH`.
    pub fn new(program: impl Into<String>, bundled_dir: Option<PathBuf>) -> Self {
        Self {
            program: program.into(),
            bundled_dir,
            resolved: OnceCell::new(),
            failure_ttl: DEFAULT_FAILURE_TTL,
            last_failure: Mutex::new(None),
        }
    }

    pub fn with_failure_ttl(mut self, ttl: Duration) -> Self {
        self.failure_ttl = ttl;
        self
    }

    /// Return the verified tool path, resolving it on first use.
    pub async fn locate(&self) -> Result<PathBuf, FfmpegError> {
        if let Some(path) = self.resolved.get() {
            return Ok(path.clone());
        }
        if let Some(reason) = self.recent_failure() {
            return Err(FfmpegError::ToolUnavailable(reason));
        }

        match self.resolved.get_or_try_init(|| self.resolve()).await {
            Ok(path) => Ok(path.clone()),
            Err(e) => {
                let reason = match &e {
                    FfmpegError::ToolUnavailable(reason) => reason.clone(),
                    other => other.to_string(),
                };
                *self.failure_slot() = Some((Instant::now(), reason));
                Err(e)
            }
        }
    }

    fn recent_failure(&self) -> Option<String> {
        match &*self.failure_slot() {
            Some((at, reason)) if at.elapsed() < self.failure_ttl => Some(reason.clone()),
            _ => None,
        }
    }

    fn failure_slot(&self) -> std::sync::MutexGuard<'_, Option<(Instant, String)>> {
        self.last_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    async fn resolve(&self) -> Result<PathBuf, FfmpegError> {
        let mut last_error = None;

        if let Some(bundled) = self.bundled_candidate().await {
            match probe(&bundled).await {
                Ok(()) => {
                    tracing::info!(path = %bundled.display(), "Using bundled ffmpeg");
                    return Ok(bundled);
                }
                Err(e) => {
                    tracing::warn!(path = %bundled.display(), error = %e, "Bundled ffmpeg failed its probe");
                    last_error = Some(e);
                }
            }
        }

        let system = PathBuf::from(&self.program);
        match probe(&system).await {
            Ok(()) => {
                tracing::info!(program = %self.program, "Using ffmpeg from PATH");
                Ok(system)
            }
            Err(e) => {
                tracing::debug!(program = %self.program, error = %e, "ffmpeg not usable from PATH");
                Err(FfmpegError::ToolUnavailable(match last_error {
                    Some(bundled) => format!("{e}; bundled copy: {bundled}"),
                    None => e.to_string(),
                }))
            }
        }
    }

    /// The bundled executable, made runnable if it exists.
    async fn bundled_candidate(&self) -> Option<PathBuf> {
        let path = self.bundled_dir.as_ref()?.join(&self.program);
        let metadata = tokio::fs::metadata(&path).await.ok()?;
        if !metadata.is_file() {
            return None;
        }
        if let Err(e) = ensure_executable(&path, &metadata).await {
            tracing::warn!(path = %path.display(), error = %e, "Could not mark bundled ffmpeg executable");
        }
        Some(path)
    }
}

/// Run `<tool> -version`; any launch failure or non-zero exit disqualifies it.
async fn probe(tool: &Path) -> Result<(), FfmpegError> {
    let mut cmd = Command::new(tool);
    cmd.arg("-version");
    match run_tool(&mut cmd, PROBE_TIMEOUT).await {
        Ok(_) => Ok(()),
        Err(FfmpegError::ToolUnavailable(msg)) => Err(FfmpegError::ToolUnavailable(msg)),
        Err(other) => Err(FfmpegError::ToolUnavailable(format!(
            "{}: {other}",
            tool.display()
        ))),
    }
}

#[cfg(unix)]
async fn ensure_executable(path: &Path, metadata: &std::fs::Metadata) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mode = metadata.permissions().mode();
    if mode & 0o111 != 0 {
        return Ok(());
    }
    tracing::info!(path = %path.display(), mode = %format!("{mode:#o}"), "Granting execute permission");
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).await
}

#[cfg(not(unix))]
async fn ensure_executable(_path: &Path, _metadata: &std::fs::Metadata) -> std::io::Result<()> {
    Ok(())
}
