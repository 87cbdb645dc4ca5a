use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;

use crate::api::rest::ws::live_tracking;
use crate::error::AppError;
use crate::models::tracking::TrackingEvent;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tracking", post(append_event))
        .route("/tracking/:tracking_id", get(history))
        .route("/tracking/:tracking_id/live", get(live_tracking))
}

#[derive(Deserialize)]
pub struct AppendEventRequest {
    pub tracking_id: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

async fn append_event(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AppendEventRequest>,
) -> Result<(StatusCode, Json<TrackingEvent>), AppError> {
    let tracking_id = payload.tracking_id.unwrap_or_default();
    let status = payload.status.unwrap_or_default();
    let event = state
        .tracking
        .append(&tracking_id, &status, payload.note)
        .await?;
    Ok((StatusCode::CREATED, Json(event)))
}

async fn history(
    State(state): State<Arc<AppState>>,
    Path(tracking_id): Path<String>,
) -> Result<Json<Vec<TrackingEvent>>, AppError> {
    Ok(Json(state.tracking.history(&tracking_id).await?))
}
