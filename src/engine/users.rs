use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::user::{Role, User};
use crate::store::{
    decode, decode_all, encode, Collection, DocumentStore, Filter, Patch, StoreError,
};

#[derive(Clone)]
pub struct UserDirectory {
    store: Arc<dyn DocumentStore>,
}

impl UserDirectory {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Case-insensitive substring search over user emails.
    pub async fn search(&self, email_fragment: &str) -> Result<Vec<User>, AppError> {
        let fragment = email_fragment.trim();
        if fragment.is_empty() {
            return Err(AppError::InvalidInput("missing email query".into()));
        }
        let docs = self
            .store
            .find(
                Collection::Users,
                &Filter::new().contains_ignore_case("email", fragment),
                None,
            )
            .await?;
        Ok(decode_all(docs)?)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<User, AppError> {
        let doc = self
            .store
            .find_one(Collection::Users, &Filter::new().eq("email", email))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user {email} not found")))?;
        Ok(decode(doc)?)
    }

    pub async fn role(&self, email: &str) -> Result<Role, AppError> {
        Ok(self.find_by_email(email).await?.role)
    }

    /// Inserts a user unless one with the same email exists. The flag reports
    /// whether a record was created.
    pub async fn create_if_absent(&self, email: &str, name: Option<String>) -> Result<(User, bool), AppError> {
        let email = email.trim();
        if email.is_empty() {
            return Err(AppError::InvalidInput("email is required".into()));
        }

        if let Some(doc) = self
            .store
            .find_one(Collection::Users, &Filter::new().eq("email", email))
            .await?
        {
            return Ok((decode(doc)?, false));
        }

        let user = User::new(email.to_string(), name);
        match self
            .store
            .insert_unique(Collection::Users, encode(&user)?, "email")
            .await
        {
            Ok(_) => {}
            // A concurrent registration of the same email got there first.
            Err(StoreError::DuplicateKey { .. }) => {
                return Ok((self.find_by_email(email).await?, false));
            }
            Err(err) => return Err(err.into()),
        }
        info!(user_id = %user.id, email = %user.email, "user registered");
        Ok((user, true))
    }

    pub async fn set_role(&self, user_id: Uuid, role: Role) -> Result<(), AppError> {
        let matched = self
            .store
            .update_one(
                Collection::Users,
                &Filter::by_id(user_id),
                &Patch::new().set("role", role.as_str()),
            )
            .await?;
        if matched == 0 {
            return Err(AppError::NotFound(format!("user {user_id} not found")));
        }
        info!(user_id = %user_id, role = role.as_str(), "user role changed");
        Ok(())
    }
}
