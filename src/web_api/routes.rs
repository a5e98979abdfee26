//! API Routes

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use super::extract::ApiJson;
use crate::config_store::{CameraRecord, CameraUpdate};
use crate::event_log_service::DEFAULT_CAPACITY;
use crate::models::{ApiResponse, LogsQuery};
use crate::ptz_controller::PtzRequest;
use crate::state::AppState;
use crate::stream_gateway::MJPEG_CONTENT_TYPE;

const NO_CACHE: &str = "no-cache, no-store, must-revalidate";

/// Create API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/api/healthz", get(super::healthz))
        .route("/api/health", get(fleet_health))
        // Cameras
        .route("/api/cameras", get(list_cameras).post(create_camera))
        .route(
            "/api/cameras/:id",
            get(get_camera).put(update_camera).delete(delete_camera),
        )
        .route("/api/cameras/:id/health", get(camera_health))
        // PTZ
        .route("/api/cameras/:id/ptz", post(ptz))
        .route("/api/cameras/:id/reconnect", post(reconnect))
        .route("/api/cameras/:id/presets", get(list_presets))
        .route("/api/cameras/:id/presets/refresh", post(refresh_presets))
        .route("/api/cameras/:id/presets/:preset/goto", post(goto_preset))
        .route("/api/cameras/:id/presets/:preset/set", post(set_preset))
        // Discovery
        .route("/api/ndi/sources", get(ndi_sources))
        // Video
        .route("/api/video/:id/mjpeg", get(mjpeg_stream))
        .route("/api/video/:id/frame.jpg", get(latest_frame))
        // Events
        .route("/api/logs", get(list_logs))
        .with_state(state)
}

// ========================================
// Camera Handlers
// ========================================

async fn list_cameras(State(state): State<AppState>) -> impl IntoResponse {
    let cameras = state.orchestrator.list_cameras().await;
    Json(ApiResponse::success(cameras))
}

async fn get_camera(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.orchestrator.camera(&id).await {
        Ok(camera) => Json(ApiResponse::success(camera)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn create_camera(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CameraRecord>,
) -> impl IntoResponse {
    match state.orchestrator.add_camera(req).await {
        Ok(camera) => (StatusCode::CREATED, Json(ApiResponse::success(camera))).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn update_camera(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<CameraUpdate>,
) -> impl IntoResponse {
    match state.orchestrator.update_camera(&id, req).await {
        Ok(camera) => Json(ApiResponse::success(camera)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn delete_camera(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.orchestrator.delete_camera(&id).await {
        Ok(()) => Json(json!({"ok": true})).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn camera_health(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.orchestrator.camera_health(&id).await {
        Ok(health) => Json(health).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn fleet_health(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.orchestrator.fleet_health().await)
}

// ========================================
// PTZ Handlers
// ========================================

async fn ptz(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<PtzRequest>,
) -> impl IntoResponse {
    match state.orchestrator.ptz(&id, req).await {
        Ok(response) => Json(ApiResponse::success(response)).into_response(),
        Err(e) => {
            tracing::warn!(camera_id = %id, error = %e, "PTZ command failed");
            e.into_response()
        }
    }
}

async fn reconnect(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.orchestrator.reconnect(&id).await {
        Ok(()) => Json(ApiResponse::success(json!({
            "camera_id": id,
            "reconnecting": true,
        })))
        .into_response(),
        Err(e) => e.into_response(),
    }
}

async fn list_presets(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.orchestrator.presets(&id, false).await {
        Ok(presets) => Json(ApiResponse::success(presets)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn refresh_presets(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.orchestrator.presets(&id, true).await {
        Ok(presets) => Json(ApiResponse::success(presets)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn goto_preset(
    State(state): State<AppState>,
    Path((id, preset)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.orchestrator.goto_preset(&id, &preset).await {
        Ok(outcome) => Json(ApiResponse::success(json!({
            "preset": preset,
            "outcome": outcome,
        })))
        .into_response(),
        Err(e) => e.into_response(),
    }
}

async fn set_preset(
    State(state): State<AppState>,
    Path((id, preset)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.orchestrator.set_preset(&id, &preset).await {
        Ok(outcome) => Json(ApiResponse::success(json!({
            "preset": preset,
            "outcome": outcome,
        })))
        .into_response(),
        Err(e) => e.into_response(),
    }
}

// ========================================
// Discovery Handlers
// ========================================

async fn ndi_sources(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(state.ndi_discovery.scan().await))
}

// ========================================
// Video Handlers
// ========================================

async fn mjpeg_stream(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.orchestrator.stream().mjpeg(&id).await {
        Ok(body) => (
            [
                (header::CONTENT_TYPE, MJPEG_CONTENT_TYPE),
                (header::CACHE_CONTROL, NO_CACHE),
                (header::PRAGMA, "no-cache"),
            ],
            Body::from_stream(body),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

async fn latest_frame(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.orchestrator.stream().latest_frame(&id).await {
        Ok(frame) => (
            [
                (header::CONTENT_TYPE, "image/jpeg"),
                (header::CACHE_CONTROL, NO_CACHE),
            ],
            frame,
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

// ========================================
// Event Handlers
// ========================================

async fn list_logs(
    State(state): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(100).min(DEFAULT_CAPACITY);
    let event_log = state.orchestrator.event_log();

    let events = match query.camera_id.as_deref() {
        Some(camera_id) => event_log.get_by_camera(camera_id, limit).await,
        None => event_log.get_latest(limit).await,
    };
    Json(ApiResponse::success(events))
}
