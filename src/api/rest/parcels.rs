use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, patch};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::rest::auth::Authenticated;
use crate::engine::assignment::RiderAssignment;
use crate::engine::lifecycle::ParcelQuery;
use crate::error::AppError;
use crate::models::parcel::{DeliveryStatus, Parcel, ParcelDetails, StatusCount};
use crate::models::user::Role;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/parcels", get(list_parcels).post(create_parcel))
        .route("/parcels/status-counts", get(own_status_counts))
        .route("/parcels/track/:tracking_id", get(get_by_tracking_id))
        .route("/parcels/:id", get(get_parcel).delete(delete_parcel))
        .route("/parcels/:id/status", patch(update_status))
        .route("/parcels/:id/assign", patch(assign_rider))
        .route("/parcels/:id/cashout", patch(cash_out))
        .route("/admin/parcels/status-counts", get(all_status_counts))
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub delivery_status: DeliveryStatus,
}

async fn list_parcels(
    State(state): State<Arc<AppState>>,
    Authenticated(_principal): Authenticated,
    Query(query): Query<ParcelQuery>,
) -> Result<Json<Vec<Parcel>>, AppError> {
    Ok(Json(state.parcels.query(&query).await?))
}

async fn create_parcel(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
    Json(payload): Json<ParcelDetails>,
) -> Result<(StatusCode, Json<Parcel>), AppError> {
    let parcel = state.parcels.create(payload, &principal.email).await?;
    Ok((StatusCode::CREATED, Json(parcel)))
}

async fn get_parcel(
    State(state): State<Arc<AppState>>,
    Authenticated(_principal): Authenticated,
    Path(id): Path<Uuid>,
) -> Result<Json<Parcel>, AppError> {
    Ok(Json(state.parcels.get(id).await?))
}

async fn get_by_tracking_id(
    State(state): State<Arc<AppState>>,
    Path(tracking_id): Path<String>,
) -> Result<Json<Parcel>, AppError> {
    Ok(Json(state.parcels.find_by_tracking_id(&tracking_id).await?))
}

/// Creators may delete their own parcels; admins may delete any.
async fn delete_parcel(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let parcel = state.parcels.get(id).await?;
    if parcel.created_by != principal.email {
        state.auth.authorize(&principal, Role::Admin).await?;
    }
    state.parcels.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Admins move any parcel; riders only the parcels assigned to them.
async fn update_status(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Parcel>, AppError> {
    match state.auth.role_of(&principal).await? {
        Some(Role::Admin) => {}
        Some(Role::Rider) => {
            let parcel = state.parcels.get(id).await?;
            ensure_assigned_to(&parcel, &principal.email)?;
        }
        _ => return Err(AppError::Forbidden("insufficient role".into())),
    }

    Ok(Json(
        state.parcels.advance_status(id, payload.delivery_status).await?,
    ))
}

async fn assign_rider(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
    Path(id): Path<Uuid>,
    Json(payload): Json<RiderAssignment>,
) -> Result<Json<Parcel>, AppError> {
    state.auth.authorize(&principal, Role::Admin).await?;
    state.riders.assign(id, &payload).await?;
    Ok(Json(state.parcels.get(id).await?))
}

async fn cash_out(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
    Path(id): Path<Uuid>,
) -> Result<Json<Parcel>, AppError> {
    state.auth.authorize(&principal, Role::Rider).await?;
    let parcel = state.parcels.get(id).await?;
    ensure_assigned_to(&parcel, &principal.email)?;
    Ok(Json(state.parcels.cash_out(id).await?))
}

async fn own_status_counts(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
) -> Result<Json<Vec<StatusCount>>, AppError> {
    Ok(Json(state.parcels.status_counts(Some(&principal.email)).await?))
}

async fn all_status_counts(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
) -> Result<Json<Vec<StatusCount>>, AppError> {
    state.auth.authorize(&principal, Role::Admin).await?;
    Ok(Json(state.parcels.status_counts(None).await?))
}

fn ensure_assigned_to(parcel: &Parcel, email: &str) -> Result<(), AppError> {
    match &parcel.assigned_rider {
        Some(rider) if rider.email == email => Ok(()),
        _ => Err(AppError::Forbidden(format!(
            "parcel {} is not assigned to you",
            parcel.id
        ))),
    }
}
