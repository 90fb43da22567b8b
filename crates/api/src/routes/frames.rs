//! Route definitions for extracted frames.
//!
//! Mounted at `/frames`.
//!
//! ```text
//! GET  /                 list
//! POST /extract          extract
//! POST /archive          archive
//! GET  /{id}             get_frame
//! ```

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;

use crate::handlers::frames;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(frames::list))
        // Upload size is enforced while staging, against MAX_UPLOAD_BYTES.
        .route(
            "/extract",
            post(frames::extract).layer(DefaultBodyLimit::disable()),
        )
        .route("/archive", post(frames::archive))
        .route("/{id}", get(frames::get_frame))
}
