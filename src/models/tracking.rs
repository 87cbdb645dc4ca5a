use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::timestamp;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackingEvent {
    pub id: Uuid,
    pub tracking_id: String,
    pub status: String,
    pub note: Option<String>,
    #[serde(with = "timestamp")]
    pub timestamp: DateTime<Utc>,
}

impl TrackingEvent {
    pub fn new(tracking_id: String, status: String, note: Option<String>, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tracking_id,
            status,
            note,
            timestamp: at,
        }
    }
}
