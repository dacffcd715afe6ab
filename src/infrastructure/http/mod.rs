pub mod request_id;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::controllers::{audio::AudioController, health};
use crate::infrastructure::config::Config;
use crate::infrastructure::db::DbPool;
use request_id::request_id_middleware;

/// Start the HTTP server with all routes configured
pub async fn start_http_server(
    pool: Arc<DbPool>,
    config: Arc<Config>,
    audio_controller: Arc<AudioController>,
) -> Result<(), Box<dyn std::error::Error>> {
    // Playback-facing audio routes
    let audio_routes = Router::new()
        .route(
            "/api/audio/segment",
            get(AudioController::get_segment_audio),
        )
        .route("/api/audio/prefetch", post(AudioController::prefetch_batch))
        .with_state(audio_controller.clone());

    // Maintenance routes (externally scheduled)
    let admin_routes = Router::new()
        .route(
            "/api/admin/eviction-sweep",
            post(AudioController::run_eviction_sweep),
        )
        .with_state(audio_controller.clone());

    // Build application routes
    let app = Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::health_ready))
        .with_state(pool.clone())
        .merge(audio_routes)
        .merge(admin_routes)
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http());

    // Start server
    let listener =
        tokio::net::TcpListener::bind(format!("{}:{}", config.host, config.port)).await?;

    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
