use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, patch};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::rest::auth::Authenticated;
use crate::error::AppError;
use crate::models::parcel::Parcel;
use crate::models::rider::{Rider, RiderApplication, RiderStatus};
use crate::models::user::Role;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/riders", get(list_by_region).post(apply))
        .route("/riders/pending", get(list_pending))
        .route("/riders/active", get(list_active))
        .route("/riders/available", get(list_available))
        .route("/riders/parcels", get(assigned_parcels))
        .route("/riders/parcels/completed", get(completed_parcels))
        .route("/riders/earnings", get(earnings))
        .route("/riders/:id/status", patch(set_status))
        .route("/riders/:id/busy", patch(mark_busy))
}

#[derive(Deserialize)]
pub struct RegionQuery {
    pub region: String,
}

#[derive(Deserialize)]
pub struct DistrictQuery {
    pub district: Option<String>,
}

#[derive(Deserialize)]
pub struct SetStatusRequest {
    pub status: RiderStatus,
    #[serde(default)]
    pub email: Option<String>,
}

async fn apply(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
    Json(payload): Json<RiderApplication>,
) -> Result<(StatusCode, Json<Rider>), AppError> {
    if payload.email != principal.email {
        return Err(AppError::Forbidden("cannot apply on behalf of another account".into()));
    }
    let rider = state.riders.create(payload).await?;
    Ok((StatusCode::CREATED, Json(rider)))
}

async fn list_by_region(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
    Query(query): Query<RegionQuery>,
) -> Result<Json<Vec<Rider>>, AppError> {
    state.auth.authorize(&principal, Role::Admin).await?;
    Ok(Json(state.riders.list_by_region(&query.region).await?))
}

async fn list_pending(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
    Query(query): Query<DistrictQuery>,
) -> Result<Json<Vec<Rider>>, AppError> {
    state.auth.authorize(&principal, Role::Admin).await?;
    Ok(Json(state.riders.list_pending(query.district.as_deref()).await?))
}

async fn list_active(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
    Query(query): Query<DistrictQuery>,
) -> Result<Json<Vec<Rider>>, AppError> {
    state.auth.authorize(&principal, Role::Admin).await?;
    Ok(Json(state.riders.list_active(query.district.as_deref()).await?))
}

async fn list_available(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
    Query(query): Query<DistrictQuery>,
) -> Result<Json<Vec<Rider>>, AppError> {
    state.auth.authorize(&principal, Role::Admin).await?;
    Ok(Json(state.riders.list_available(query.district.as_deref()).await?))
}

async fn set_status(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetStatusRequest>,
) -> Result<Json<Rider>, AppError> {
    state.auth.authorize(&principal, Role::Admin).await?;
    state
        .riders
        .set_approval_status(id, payload.status, payload.email.as_deref())
        .await?;
    Ok(Json(state.riders.get(id).await?))
}

async fn mark_busy(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
    Path(id): Path<Uuid>,
) -> Result<Json<Rider>, AppError> {
    state.auth.authorize(&principal, Role::Rider).await?;
    let rider = state.riders.get(id).await?;
    if rider.email != principal.email {
        return Err(AppError::Forbidden("cannot change another rider".into()));
    }
    state.riders.mark_busy(id).await?;
    Ok(Json(state.riders.get(id).await?))
}

async fn assigned_parcels(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
) -> Result<Json<Vec<Parcel>>, AppError> {
    state.auth.authorize(&principal, Role::Rider).await?;
    Ok(Json(
        state.riders.list_assigned_parcels(&principal.email, true).await?,
    ))
}

async fn completed_parcels(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
) -> Result<Json<Vec<Parcel>>, AppError> {
    state.auth.authorize(&principal, Role::Rider).await?;
    Ok(Json(
        state.riders.list_assigned_parcels(&principal.email, false).await?,
    ))
}

async fn earnings(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
) -> Result<Json<Vec<Parcel>>, AppError> {
    state.auth.authorize(&principal, Role::Rider).await?;
    Ok(Json(state.riders.earnings(&principal.email).await?))
}
