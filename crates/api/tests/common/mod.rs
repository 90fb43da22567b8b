#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use keyframe_api::config::ServerConfig;
use keyframe_api::router::build_app_router;
use keyframe_api::state::AppState;
use keyframe_core::extraction::FrameExtractor;
use keyframe_core::ffmpeg::FfmpegError;
use keyframe_core::store::FrameStore;
use tower::ServiceExt;

pub const BOUNDARY: &str = "keyframe-test-boundary";

/// Build a test `ServerConfig` rooted at `root`.
pub fn test_config(root: &Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        frames_dir: root.join("frames"),
        work_dir: root.join("work"),
        static_dir: None,
        ffmpeg_bin: "ffmpeg".to_string(),
        ffmpeg_bundled_dir: None,
        extraction_timeout_secs: 30,
        ffmpeg_retry_secs: 10,
        max_upload_bytes: 1024 * 1024,
    }
}

/// Build the full application router over a store using `extractor`.
///
/// Goes through `build_app_router`, so tests exercise the same middleware
/// stack (CORS, request ID, timeout, tracing, panic recovery) as production.
pub async fn build_test_app(root: &Path, extractor: Arc<dyn FrameExtractor>) -> Router {
    let config = test_config(root);
    let frames = FrameStore::open(config.store_config(), extractor)
        .await
        .expect("open frame store");

    let state = AppState {
        config: Arc::new(config.clone()),
        frames: Arc::new(frames),
    };
    build_app_router(state, &config)
}

pub fn frames_dir(root: &Path) -> PathBuf {
    root.join("frames")
}

pub fn uploads_dir(root: &Path) -> PathBuf {
    root.join("work").join("uploads")
}

pub fn jobs_dir(root: &Path) -> PathBuf {
    root.join("work").join("jobs")
}

pub fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|d| {
            d.map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

// ---------------------------------------------------------------------------
// Fake extractors
// ---------------------------------------------------------------------------

/// Writes `frames` numbered JPEG stand-ins.
pub struct FakeExtractor {
    pub frames: usize,
}

#[async_trait]
impl FrameExtractor for FakeExtractor {
    async fn check(&self) -> Result<(), FfmpegError> {
        Ok(())
    }

    async fn extract(&self, _video: &Path, output_dir: &Path) -> Result<(), FfmpegError> {
        tokio::fs::create_dir_all(output_dir).await?;
        for n in 1..=self.frames {
            tokio::fs::write(
                output_dir.join(format!("frame_{n}.jpg")),
                format!("jpeg bytes {n}"),
            )
            .await?;
        }
        Ok(())
    }
}

/// Exits like ffmpeg rejecting its input.
pub struct FailingExtractor;

#[async_trait]
impl FrameExtractor for FailingExtractor {
    async fn check(&self) -> Result<(), FfmpegError> {
        Ok(())
    }

    async fn extract(&self, _video: &Path, _output_dir: &Path) -> Result<(), FfmpegError> {
        Err(FfmpegError::ExecutionFailed {
            exit_code: Some(1),
            stderr: "upload.bin: Invalid data found when processing input".into(),
        })
    }
}

/// No ffmpeg anywhere.
pub struct MissingTool;

#[async_trait]
impl FrameExtractor for MissingTool {
    async fn check(&self) -> Result<(), FfmpegError> {
        Err(FfmpegError::ToolUnavailable("ffmpeg: No such file or directory".into()))
    }

    async fn extract(&self, _video: &Path, _output_dir: &Path) -> Result<(), FfmpegError> {
        Err(FfmpegError::ToolUnavailable("ffmpeg: No such file or directory".into()))
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_raw(app: Router, uri: &str, content_type: &str, body: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", content_type)
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// Multipart body with one file field.
pub fn multipart_body(field: &str, file_name: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub async fn post_multipart(app: Router, uri: &str, body: Vec<u8>) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// Upload a small fake video to the extract route.
pub async fn upload_video(app: Router) -> Response<Body> {
    post_multipart(
        app,
        "/api/v1/frames/extract",
        multipart_body("file", "clip.mp4", "video/mp4", b"not really a video"),
    )
    .await
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
