use std::sync::Arc;

use keyframe_core::store::FrameStore;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Extraction pipeline and the published frame catalog.
    pub frames: Arc<FrameStore>,
}
