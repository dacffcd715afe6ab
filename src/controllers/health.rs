use crate::infrastructure::db::{check_connection, DbPool};
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use std::sync::Arc;

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Readiness gates on the metadata store only; the synthesis providers and
/// object storage are checked lazily per request.
pub async fn health_ready(State(pool): State<Arc<DbPool>>) -> impl IntoResponse {
    match check_connection(&pool).await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "status": "ready",
                "metadata_store": "connected"
            })),
        ),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "not_ready",
                "metadata_store": "disconnected"
            })),
        ),
    }
}
