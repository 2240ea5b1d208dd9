//! Route definitions.

use axum::Router;
use axum::routing::get;
use tower_http::trace::TraceLayer;

use crate::handlers::{health_check, voice::voice_handler};
use crate::state::AppState;

/// Build the application router: a health check and the voice WebSocket.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", get(health_check))
        .route("/ws", get(voice_handler))
        .layer(TraceLayer::new_for_http())
}
