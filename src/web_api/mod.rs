//! WebAPI - REST API Endpoints
//!
//! ## Responsibilities
//!
//! - HTTP API routes
//! - MJPEG and snapshot responses
//! - Static frontend serving

mod extract;
mod routes;

pub use extract::ApiJson;

pub use routes::create_router;

use axum::response::IntoResponse;
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::models::HealthzResponse;
use crate::state::AppState;

/// Liveness endpoint
pub async fn healthz() -> impl IntoResponse {
    Json(HealthzResponse {
        status: "ok".to_string(),
        service: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Router with frontend fallback, CORS and request tracing
pub fn build_app(state: AppState) -> Router {
    let frontend_dir = state.config.frontend_dir.clone();
    let mut app = create_router(state);

    if let Some(dir) = frontend_dir {
        tracing::info!(frontend_dir = %dir.display(), "Static file serving enabled");
        let serve_dir = ServeDir::new(&dir).not_found_service(ServeFile::new(dir.join("index.html")));
        app = app.fallback_service(serve_dir);
    }

    app.layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
}
