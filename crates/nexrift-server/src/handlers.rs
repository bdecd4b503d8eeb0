//! HTTP request handlers.
//!
//! Read endpoints return the bare JSON document the dashboard renders; mutating
//! endpoints wrap their result in [`ApiResponse`]. Every failure is an
//! `ApiResponse` with `success: false`, the error text and its kind.

use crate::server::AppState;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use nexrift_core::{
    ApiResponse, AppConfig, AppStatus, CommandPreview, HealthReport, LogsResponse, NexriftError,
    ServerStatusResponse, StartResponse,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, warn};

// ============================================================================
// Error mapping
// ============================================================================

/// A supervisor error on its way to the client.
pub struct ApiError(NexriftError);

impl From<NexriftError> for ApiError {
    fn from(err: NexriftError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let status =
            StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!("Request failed: {}", err);
        } else {
            debug!("Request rejected: {}", err);
        }
        (status, Json(ApiResponse::<()>::from_error(&err))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Confirmation body for operations without a richer result.
#[derive(Debug, Serialize)]
pub struct Message {
    pub message: String,
}

impl Message {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// ============================================================================
// Server
// ============================================================================

pub async fn handle_health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

pub async fn handle_server_status(
    State(state): State<Arc<AppState>>,
) -> ApiResult<ServerStatusResponse> {
    Ok(Json(state.supervisor.server_status().await?))
}

// ============================================================================
// Status
// ============================================================================

pub async fn handle_list(State(state): State<Arc<AppState>>) -> Json<Vec<AppStatus>> {
    Json(state.supervisor.list().await)
}

pub async fn handle_status(
    State(state): State<Arc<AppState>>,
    Path(app_id): Path<String>,
) -> ApiResult<AppStatus> {
    Ok(Json(state.supervisor.status(&app_id).await?))
}

pub async fn handle_health_detailed(
    State(state): State<Arc<AppState>>,
    Path(app_id): Path<String>,
) -> ApiResult<HealthReport> {
    Ok(Json(state.supervisor.health(&app_id).await?))
}

pub async fn handle_preview(
    State(state): State<Arc<AppState>>,
    Path(app_id): Path<String>,
) -> ApiResult<CommandPreview> {
    Ok(Json(state.supervisor.preview(&app_id)?))
}

pub async fn handle_logs(
    State(state): State<Arc<AppState>>,
    Path(app_id): Path<String>,
) -> ApiResult<LogsResponse> {
    Ok(Json(state.supervisor.logs(&app_id)?))
}

// ============================================================================
// Lifecycle
// ============================================================================

pub async fn handle_start(
    State(state): State<Arc<AppState>>,
    Path(app_id): Path<String>,
) -> ApiResult<ApiResponse<StartResponse>> {
    let started = state.supervisor.start(&app_id).await?;
    Ok(Json(ApiResponse::success(started)))
}

pub async fn handle_stop(
    State(state): State<Arc<AppState>>,
    Path(app_id): Path<String>,
) -> ApiResult<ApiResponse<Message>> {
    state.supervisor.stop(&app_id).await?;
    Ok(Json(ApiResponse::success(Message::new(format!(
        "Stopped {}",
        app_id
    )))))
}

pub async fn handle_restart(
    State(state): State<Arc<AppState>>,
    Path(app_id): Path<String>,
) -> ApiResult<ApiResponse<StartResponse>> {
    let started = state.supervisor.restart(&app_id).await?;
    Ok(Json(ApiResponse::success(started)))
}

// ============================================================================
// Config management
// ============================================================================

/// Parse a config body, filling a missing `id` with `default_id`.
///
/// Malformed bodies become `Validation` errors so they share the error envelope.
fn parse_config(body: &[u8], default_id: Option<&str>) -> Result<AppConfig, NexriftError> {
    let invalid = |e: serde_json::Error| NexriftError::Validation {
        field: "body".into(),
        message: e.to_string(),
    };
    let mut value: Value = serde_json::from_slice(body).map_err(invalid)?;
    if let (Some(fields), Some(id)) = (value.as_object_mut(), default_id) {
        fields
            .entry("id")
            .or_insert_with(|| Value::String(id.to_string()));
    }
    serde_json::from_value(value).map_err(invalid)
}

pub async fn handle_add_app(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<(StatusCode, Json<ApiResponse<AppConfig>>), ApiError> {
    let config = parse_config(&body, None).inspect_err(|e| warn!("Rejected new app: {}", e))?;
    let added = state.supervisor.add_app(config).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(added))))
}

/// Replace a config. A body without an `id` takes the one from the path.
pub async fn handle_update_app(
    State(state): State<Arc<AppState>>,
    Path(app_id): Path<String>,
    body: Bytes,
) -> ApiResult<ApiResponse<AppConfig>> {
    let config = parse_config(&body, Some(&app_id))
        .inspect_err(|e| warn!("Rejected config update for {}: {}", app_id, e))?;
    let updated = state.supervisor.update_app(&app_id, config).await?;
    Ok(Json(ApiResponse::success(updated)))
}

pub async fn handle_remove_app(
    State(state): State<Arc<AppState>>,
    Path(app_id): Path<String>,
) -> ApiResult<ApiResponse<Message>> {
    state.supervisor.remove_app(&app_id).await?;
    Ok(Json(ApiResponse::success(Message::new(format!(
        "Removed {}",
        app_id
    )))))
}
