pub mod auth;
pub mod parcels;
pub mod payments;
pub mod riders;
pub mod tracking;
pub mod users;
pub mod ws;

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::Serialize;
use tower_http::cors::CorsLayer;

use crate::error::AppError;
use crate::store::{Collection, Filter};
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(parcels::router())
        .merge(users::router())
        .merge(riders::router())
        .merge(payments::router())
        .merge(tracking::router())
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    parcels: usize,
    riders: usize,
    users: usize,
    payments: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> Result<Json<HealthResponse>, AppError> {
    let count = |collection: Collection| {
        let store = state.store.clone();
        async move {
            store
                .find(collection, &Filter::new(), None)
                .await
                .map(|docs| docs.len())
        }
    };

    Ok(Json(HealthResponse {
        status: "ok",
        parcels: count(Collection::Parcels).await?,
        riders: count(Collection::Riders).await?,
        users: count(Collection::Users).await?,
        payments: count(Collection::Payments).await?,
    }))
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    }
}
