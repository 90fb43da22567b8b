//! Handlers for the `/frames` resource.
//!
//! Uploading a video replaces the published frame set; the remaining
//! handlers read whichever generation is current.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Path, State};
use axum::http::header;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::TryStreamExt;
use keyframe_core::archive::{ArchiveRequest, ARCHIVE_CONTENT_TYPE};
use keyframe_core::store::CatalogListing;
use serde::Deserialize;
use tokio_util::io::StreamReader;

use crate::error::{AppError, AppResult};
use crate::response::{DataMessageResponse, DataResponse};
use crate::state::AppState;

/// Multipart field carrying the video.
const UPLOAD_FIELD: &str = "file";

/// Body of an archive request.
#[derive(Debug, Deserialize)]
pub struct FrameSelection {
    #[serde(default)]
    pub filenames: Vec<String>,
}

/// Guess a Content-Type from a frame file name.
fn content_type_for_frame(id: &str) -> &'static str {
    let ext = id.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        _ => "application/octet-stream",
    }
}

/// POST /api/v1/frames/extract
///
/// Accepts a multipart form with a required `file` field holding the video.
/// The upload is streamed to disk, its key frames extracted, and the new
/// frame set published. Returns the refreshed listing.
pub async fn extract(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<Json<DataMessageResponse<CatalogListing>>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue; // ignore unknown fields
        }

        let content_type = field.content_type().map(str::to_string);
        let file_name = field.file_name().map(str::to_string);
        tracing::info!(
            file_name = ?file_name,
            content_type = ?content_type,
            "Received video upload"
        );

        // A broken body is the client's fault; staging reports it as a 400.
        let reader = StreamReader::new(Box::pin(
            field.map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
        ));
        let snapshot = state
            .frames
            .extract_upload(reader, content_type.as_deref(), file_name.as_deref())
            .await?;

        return Ok(Json(DataMessageResponse {
            data: CatalogListing::from(&snapshot),
            message: "Frames extracted successfully!".to_string(),
        }));
    }

    Err(AppError::BadRequest(format!(
        "Missing required '{UPLOAD_FIELD}' field"
    )))
}

/// GET /api/v1/frames
///
/// List the current frames in ascending ordinal order.
pub async fn list(State(state): State<AppState>) -> Json<DataResponse<CatalogListing>> {
    let snapshot = state.frames.snapshot().await;
    Json(DataResponse {
        data: CatalogListing::from(&snapshot),
    })
}

/// GET /api/v1/frames/{id}
///
/// Raw image bytes of one cataloged frame. Also the way to download frames
/// individually.
pub async fn get_frame(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let (frame, data) = state.frames.read_frame(&id).await?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type_for_frame(&frame.id)),
            // Ids are reused by the next extraction.
            (header::CACHE_CONTROL, "no-cache"),
        ],
        data,
    )
        .into_response())
}

/// POST /api/v1/frames/archive
///
/// Zip the selected frames. Unknown names are skipped; an empty selection
/// or one with no known names is a 400, as is a body that is not JSON.
pub async fn archive(
    State(state): State<AppState>,
    payload: Result<Json<FrameSelection>, JsonRejection>,
) -> AppResult<Response> {
    let Json(selection) = payload.map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
    let request = ArchiveRequest::new(selection.filenames);
    let bundle = state.frames.build_archive(&request).await?;

    let disposition = format!("attachment; filename=\"{}\"", bundle.file_name);
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, ARCHIVE_CONTENT_TYPE.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bundle.bytes,
    )
        .into_response())
}
