use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::rest::auth::Authenticated;
use crate::error::AppError;
use crate::models::user::{Role, User};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users", post(register_user))
        .route("/users/search", get(search_users))
        .route("/users/role/:email", get(get_role))
        .route("/users/:id/role", patch(set_role))
}

#[derive(Deserialize)]
pub struct RegisterUserRequest {
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Deserialize)]
pub struct SearchQuery {
    pub email: Option<String>,
}

#[derive(Deserialize)]
pub struct SetRoleRequest {
    pub role: Role,
}

#[derive(Serialize)]
pub struct RoleResponse {
    pub email: String,
    pub role: Role,
}

/// Idempotent: an existing account answers 200, a new one 201.
async fn register_user(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
    Json(payload): Json<RegisterUserRequest>,
) -> Result<(StatusCode, Json<User>), AppError> {
    if payload.email.trim() != principal.email {
        return Err(AppError::Forbidden("cannot register another account".into()));
    }

    let (user, created) = state
        .users
        .create_if_absent(&payload.email, payload.name)
        .await?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(user)))
}

async fn search_users(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<User>>, AppError> {
    state.auth.authorize(&principal, Role::Admin).await?;
    let fragment = query
        .email
        .ok_or_else(|| AppError::InvalidInput("missing email query".into()))?;
    Ok(Json(state.users.search(&fragment).await?))
}

async fn get_role(
    State(state): State<Arc<AppState>>,
    Authenticated(_principal): Authenticated,
    Path(email): Path<String>,
) -> Result<Json<RoleResponse>, AppError> {
    let role = state.users.role(&email).await?;
    Ok(Json(RoleResponse { email, role }))
}

async fn set_role(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetRoleRequest>,
) -> Result<StatusCode, AppError> {
    state.auth.authorize(&principal, Role::Admin).await?;
    state.users.set_role(id, payload.role).await?;
    Ok(StatusCode::NO_CONTENT)
}
