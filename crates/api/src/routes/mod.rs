pub mod frames;
pub mod health;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /frames                                          list (GET)
/// /frames/extract                                  upload video and extract key frames (POST)
/// /frames/archive                                  zip selected frames (POST)
/// /frames/{id}                                     raw frame image (GET)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/frames", frames::router())
}
