//! Web API router construction.

use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;
use crate::web::middleware::request_id::RequestIdLayer;
use crate::web::{status, translate};
use tower_http::compression::CompressionLayer;

/// Creates the web server router
pub fn create_router(app_state: AppState) -> Router {
    let api_router = Router::new()
        .route("/health", get(status::health))
        .route("/status", get(status::status))
        .route("/translate", post(translate::translate))
        .with_state(app_state);

    Router::new().nest("/api", api_router).layer((
        // Outermost: per-request ID span + severity-proportional response logging.
        RequestIdLayer,
        CompressionLayer::new()
            .zstd(true)
            .br(true)
            .gzip(true)
            .quality(tower_http::CompressionLevel::Fastest),
    ))
}
