//! HTTP and WebSocket handlers.

pub mod voice;

use axum::Json;
use axum::response::IntoResponse;

/// Health check endpoint.
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
