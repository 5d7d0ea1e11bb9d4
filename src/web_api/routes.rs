//! API Routes

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{get, post},
    Json, Router,
};
use futures::{Stream, StreamExt};
use image::ImageFormat;
use serde::Deserialize;
use std::io::Cursor;

use crate::detection_sink::clamp_limit;
use crate::error::{Error, Result};
use crate::live_state::LiveStateEntry;
use crate::models::ApiResponse;
use crate::state::AppState;

const DEFAULT_DETECTION_LIMIT: usize = 100;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(super::health_check))
        // Cameras
        .route("/api/cameras", get(list_cameras).post(register_camera))
        .route("/api/cameras/:id", get(get_camera).delete(remove_camera))
        .route("/api/cameras/:id/stop", post(stop_camera))
        // Live state
        .route("/api/live", get(list_live))
        .route("/api/live/:id", get(get_live))
        .route("/api/live/:id/snapshot", get(get_snapshot))
        // Detections and alerts
        .route("/api/detections", get(list_detections))
        .route("/api/alerts", get(alert_stream))
        .with_state(state)
}

// ========================================
// Camera Handlers
// ========================================

#[derive(Debug, Deserialize)]
struct RegisterCameraRequest {
    camera_id: Option<String>,
    location: Option<String>,
    #[serde(alias = "rtsp_url")]
    source_uri: Option<String>,
}

async fn register_camera(
    State(state): State<AppState>,
    Json(req): Json<RegisterCameraRequest>,
) -> Result<impl IntoResponse> {
    let camera = state
        .supervisor
        .register(
            req.camera_id.as_deref().unwrap_or_default(),
            req.location.as_deref().unwrap_or_default(),
            req.source_uri.as_deref().unwrap_or_default(),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(camera))))
}

async fn list_cameras(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(state.supervisor.list().await))
}

async fn get_camera(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let camera = state
        .supervisor
        .get(&id)
        .await
        .ok_or_else(|| Error::NotFound(format!("Camera {} not found", id)))?;
    Ok(Json(ApiResponse::success(camera)))
}

async fn stop_camera(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let camera = state.supervisor.stop(&id).await?;
    Ok((StatusCode::ACCEPTED, Json(ApiResponse::success(camera))))
}

async fn remove_camera(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    state.supervisor.remove(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ========================================
// Live State Handlers
// ========================================

async fn list_live(State(state): State<AppState>) -> impl IntoResponse {
    let entries: Vec<LiveStateEntry> = state
        .live_state
        .list()
        .iter()
        .map(|e| e.as_ref().clone())
        .collect();
    Json(ApiResponse::success(entries))
}

async fn get_live(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let entry = state
        .live_state
        .get(&id)
        .ok_or_else(|| Error::NotFound(format!("No live state for camera {}", id)))?;
    Ok(Json(ApiResponse::success(entry.as_ref().clone())))
}

/// Latest annotated frame as JPEG
async fn get_snapshot(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let snapshot = state
        .live_state
        .get(&id)
        .and_then(|e| e.snapshot.clone())
        .ok_or_else(|| Error::NotFound(format!("No snapshot for camera {}", id)))?;

    let jpeg = tokio::task::spawn_blocking(move || {
        let mut buf = Cursor::new(Vec::new());
        snapshot
            .write_to(&mut buf, ImageFormat::Jpeg)
            .map(|_| buf.into_inner())
    })
    .await
    .map_err(|e| Error::Internal(format!("snapshot task failed: {}", e)))?
    .map_err(|e| Error::Internal(format!("snapshot encoding failed: {}", e)))?;

    Ok(([(header::CONTENT_TYPE, "image/jpeg")], jpeg))
}

// ========================================
// Detection / Alert Handlers
// ========================================

#[derive(Debug, Deserialize)]
struct DetectionQuery {
    camera_id: Option<String>,
    limit: Option<usize>,
}

async fn list_detections(
    State(state): State<AppState>,
    Query(query): Query<DetectionQuery>,
) -> Result<impl IntoResponse> {
    let limit = clamp_limit(query.limit.unwrap_or(DEFAULT_DETECTION_LIMIT));
    let events = state.sink.query(query.camera_id.as_deref(), limit).await?;
    Ok(Json(ApiResponse::success(events)))
}

/// Server-sent alert stream; the subscription ends with the connection
async fn alert_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = std::result::Result<Event, axum::Error>>> {
    let stream = state
        .alerts
        .subscribe()
        .into_stream()
        .map(|alert| Event::default().json_data(alert));

    Sse::new(stream).keep_alive(KeepAlive::default())
}
