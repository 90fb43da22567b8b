use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use keyframe_api::config::ServerConfig;
use keyframe_api::router::build_app_router;
use keyframe_api::state::AppState;
use keyframe_core::extraction::FfmpegExtractor;
use keyframe_core::store::FrameStore;
use keyframe_core::tool::ToolLocator;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    init_tracing();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = %config.port,
        frames_dir = %config.frames_dir.display(),
        work_dir = %config.work_dir.display(),
        "Loaded server configuration"
    );

    // --- Extraction tool ---
    let locator = ToolLocator::new(config.ffmpeg_bin.clone(), config.ffmpeg_bundled_dir.clone())
        .with_failure_ttl(config.ffmpeg_retry());
    match locator.locate().await {
        Ok(path) => tracing::info!(path = %path.display(), "ffmpeg available"),
        // Not fatal: uploads fail with a server error until ffmpeg appears.
        Err(e) => tracing::warn!(error = %e, "ffmpeg not available at startup"),
    }
    let extractor = FfmpegExtractor::new(locator, config.extraction_timeout());

    // --- Frame store ---
    let frames = FrameStore::open(config.store_config(), Arc::new(extractor))
        .await
        .expect("Failed to prepare frame directories");

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        frames: Arc::new(frames),
    };

    // --- Router ---
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    tracing::info!("Graceful shutdown complete");
}

/// Install the global subscriber. `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "keyframe_api=debug,keyframe_core=debug,tower_http=debug".into()
    });

    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager (e.g. systemd, Docker, Kubernetes).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
