use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use crate::auth::Principal;
use crate::error::AppError;
use crate::state::AppState;

/// Request guard resolving the `Authorization: Bearer` credential.
pub struct Authenticated(pub Principal);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Authenticated {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());
        let principal = state.auth.authenticate(header).await?;
        Ok(Self(principal))
    }
}
