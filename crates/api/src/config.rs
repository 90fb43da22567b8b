use std::path::PathBuf;
use std::time::Duration;

use keyframe_core::extraction::DEFAULT_EXTRACTION_TIMEOUT;
use keyframe_core::store::StoreConfig;
use keyframe_core::tool::DEFAULT_FAILURE_TTL;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `600`). Must cover a full
    /// upload plus extraction.
    pub request_timeout_secs: u64,
    /// Directory holding the current frame images (default: `output_frames`).
    pub frames_dir: PathBuf,
    /// Directory for staged uploads and per-job scratch output (default: `work`).
    pub work_dir: PathBuf,
    /// Optional directory of static front-end files served as the fallback route.
    pub static_dir: Option<PathBuf>,
    /// ffmpeg program name or path looked up on `PATH` (default: `ffmpeg`).
    pub ffmpeg_bin: String,
    /// Directory checked for a bundled ffmpeg before `PATH`. Defaults to the
    /// directory of the running executable.
    pub ffmpeg_bundled_dir: Option<PathBuf>,
    /// Upper bound for one ffmpeg run in seconds (default: `300`).
    pub extraction_timeout_secs: u64,
    /// Seconds a failed ffmpeg lookup is remembered before probing again
    /// (default: `10`).
    pub ffmpeg_retry_secs: u64,
    /// Maximum accepted upload size in bytes (default: 2 GiB).
    pub max_upload_bytes: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default                    |
    /// |---------------------------|----------------------------|
    /// | `HOST`                    | `0.0.0.0`                  |
    /// | `PORT`                    | `3000`                     |
    /// | `CORS_ORIGINS`            | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS`    | `600`                      |
    /// | `FRAMES_DIR`              | `output_frames`            |
    /// | `WORK_DIR`                | `work`                     |
    /// | `STATIC_DIR`              | unset                      |
    /// | `FFMPEG_BIN`              | `ffmpeg`                   |
    /// | `FFMPEG_BUNDLED_DIR`      | directory of the binary    |
    /// | `EXTRACTION_TIMEOUT_SECS` | `300`                      |
    /// | `FFMPEG_RETRY_SECS`       | `10`                       |
    /// | `MAX_UPLOAD_BYTES`        | `2147483648`               |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "600".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let frames_dir = PathBuf::from(
            std::env::var("FRAMES_DIR").unwrap_or_else(|_| "output_frames".into()),
        );
        let work_dir = PathBuf::from(std::env::var("WORK_DIR").unwrap_or_else(|_| "work".into()));

        let static_dir = std::env::var("STATIC_DIR")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        let ffmpeg_bin = std::env::var("FFMPEG_BIN").unwrap_or_else(|_| "ffmpeg".into());

        let ffmpeg_bundled_dir = std::env::var("FFMPEG_BUNDLED_DIR")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .or_else(|| {
                std::env::current_exe()
                    .ok()
                    .and_then(|exe| exe.parent().map(PathBuf::from))
            });

        let extraction_timeout_secs: u64 = std::env::var("EXTRACTION_TIMEOUT_SECS")
            .unwrap_or_else(|_| DEFAULT_EXTRACTION_TIMEOUT.as_secs().to_string())
            .parse()
            .expect("EXTRACTION_TIMEOUT_SECS must be a valid u64");

        let ffmpeg_retry_secs: u64 = std::env::var("FFMPEG_RETRY_SECS")
            .unwrap_or_else(|_| DEFAULT_FAILURE_TTL.as_secs().to_string())
            .parse()
            .expect("FFMPEG_RETRY_SECS must be a valid u64");

        let max_upload_bytes: u64 = std::env::var("MAX_UPLOAD_BYTES")
            .unwrap_or_else(|_| (2u64 * 1024 * 1024 * 1024).to_string())
            .parse()
            .expect("MAX_UPLOAD_BYTES must be a valid u64");

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            frames_dir,
            work_dir,
            static_dir,
            ffmpeg_bin,
            ffmpeg_bundled_dir,
            extraction_timeout_secs,
            ffmpeg_retry_secs,
            max_upload_bytes,
        }
    }

    pub fn extraction_timeout(&self) -> Duration {
        Duration::from_secs(self.extraction_timeout_secs)
    }

    pub fn ffmpeg_retry(&self) -> Duration {
        Duration::from_secs(self.ffmpeg_retry_secs)
    }

    /// Layout handed to the frame store.
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            output_dir: self.frames_dir.clone(),
            work_dir: self.work_dir.clone(),
            max_upload_bytes: Some(self.max_upload_bytes),
        }
    }
}
