use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::timestamp;

/// Capability set of an account. Roles are disjoint: none implies another.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    User,
    Rider,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Rider => "rider",
            Role::Admin => "admin",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub role: Role,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(email: String, name: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            email,
            name,
            role: Role::User,
            created_at: Utc::now(),
        }
    }
}
