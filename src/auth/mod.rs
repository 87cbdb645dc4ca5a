use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::AppError;
use crate::models::user::{Role, User};
use crate::store::{decode, Collection, DocumentStore, Filter};

/// Verified identity behind a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    pub email: String,
    #[serde(default)]
    pub claims: Map<String, Value>,
}

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("token rejected")]
    Rejected,
}

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Principal, VerifyError>;
}

/// Verifier backed by a fixed token table, loaded from configuration.
#[derive(Debug, Default)]
pub struct StaticTokenVerifier {
    tokens: DashMap<String, String>,
}

impl StaticTokenVerifier {
    pub fn new(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            tokens: pairs.into_iter().collect(),
        }
    }
}

#[async_trait]
impl IdentityVerifier for StaticTokenVerifier {
    async fn verify(&self, token: &str) -> Result<Principal, VerifyError> {
        let email = self
            .tokens
            .get(token)
            .map(|entry| entry.value().clone())
            .ok_or(VerifyError::Rejected)?;

        let mut claims = Map::new();
        claims.insert("email".to_string(), Value::String(email.clone()));
        Ok(Principal { email, claims })
    }
}

/// Extracts the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: Option<&str>) -> Result<&str, AppError> {
    let header = header.ok_or_else(|| AppError::Unauthenticated("missing authorization header".into()))?;
    let (scheme, token) = header
        .trim()
        .split_once(' ')
        .ok_or_else(|| AppError::Unauthenticated("malformed authorization header".into()))?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(AppError::Unauthenticated("malformed authorization header".into()));
    }
    Ok(token)
}

#[derive(Clone)]
pub struct AuthGate {
    verifier: Arc<dyn IdentityVerifier>,
    store: Arc<dyn DocumentStore>,
}

impl AuthGate {
    pub fn new(verifier: Arc<dyn IdentityVerifier>, store: Arc<dyn DocumentStore>) -> Self {
        Self { verifier, store }
    }

    pub async fn authenticate(&self, raw_credential: Option<&str>) -> Result<Principal, AppError> {
        let token = bearer_token(raw_credential)?;
        self.verifier.verify(token).await.map_err(|err| {
            warn!(error = %err, "credential verification failed");
            AppError::Unauthenticated("invalid credential".into())
        })
    }

    /// Stored role of the principal; `None` when no user record exists.
    pub async fn role_of(&self, principal: &Principal) -> Result<Option<Role>, AppError> {
        let doc = self
            .store
            .find_one(Collection::Users, &Filter::new().eq("email", principal.email.as_str()))
            .await?;
        Ok(doc.map(decode::<User>).transpose()?.map(|user| user.role))
    }

    /// Exact-match role check; roles carry no hierarchy.
    pub async fn authorize(&self, principal: &Principal, required: Role) -> Result<(), AppError> {
        self.authorize_any(principal, &[required]).await
    }

    pub async fn authorize_any(&self, principal: &Principal, allowed: &[Role]) -> Result<(), AppError> {
        match self.role_of(principal).await? {
            Some(role) if allowed.contains(&role) => Ok(()),
            role => {
                debug!(email = %principal.email, ?role, ?allowed, "role check denied");
                Err(AppError::Forbidden("insufficient role".into()))
            }
        }
    }
}
