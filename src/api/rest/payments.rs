use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::rest::auth::Authenticated;
use crate::engine::payments::PaymentDetails;
use crate::error::AppError;
use crate::models::payment::Payment;
use crate::models::user::Role;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/payments", get(list_payments).post(record_payment))
        .route("/payments/intent", post(create_intent))
        .route("/payments/:id", delete(delete_payment))
}

#[derive(Deserialize)]
pub struct IntentRequest {
    pub amount_minor_units: i64,
}

#[derive(Serialize)]
pub struct IntentResponse {
    pub client_secret: String,
}

#[derive(Deserialize)]
pub struct PaymentsQuery {
    pub email: Option<String>,
}

async fn create_intent(
    State(state): State<Arc<AppState>>,
    Authenticated(_principal): Authenticated,
    Json(payload): Json<IntentRequest>,
) -> Result<Json<IntentResponse>, AppError> {
    let client_secret = state.payments.create_intent(payload.amount_minor_units).await?;
    Ok(Json(IntentResponse { client_secret }))
}

/// Callers list their own payments; the unscoped listing is admin-only.
async fn list_payments(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
    Query(query): Query<PaymentsQuery>,
) -> Result<Json<Vec<Payment>>, AppError> {
    match query.email.as_deref() {
        Some(email) if email == principal.email => {}
        Some(_) => return Err(AppError::Forbidden("cannot list another payer".into())),
        None => state.auth.authorize(&principal, Role::Admin).await?,
    }
    Ok(Json(state.payments.list_payments(query.email.as_deref()).await?))
}

async fn record_payment(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
    Json(payload): Json<PaymentDetails>,
) -> Result<(StatusCode, Json<Payment>), AppError> {
    let payment = state.payments.record_payment(&principal.email, payload).await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

async fn delete_payment(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.auth.authorize(&principal, Role::Admin).await?;
    state.payments.delete_payment(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
