use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::timestamp;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub parcel_id: Uuid,
    pub email: String,
    /// Minor currency units.
    pub amount: i64,
    pub payment_method: String,
    pub transaction_id: String,
    #[serde(with = "timestamp")]
    pub paid_at: DateTime<Utc>,
}
