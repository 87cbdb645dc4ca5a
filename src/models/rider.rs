use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::timestamp;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RiderStatus {
    Pending,
    Active,
    Rejected,
}

impl RiderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiderStatus::Pending => "pending",
            RiderStatus::Active => "active",
            RiderStatus::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkStatus {
    Available,
    Busy,
    InDelivery,
}

impl WorkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkStatus::Available => "available",
            WorkStatus::Busy => "busy",
            WorkStatus::InDelivery => "in_delivery",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiderApplication {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub region: String,
    pub district: String,
    #[serde(default)]
    pub bike_registration: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rider {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub region: String,
    pub district: String,
    pub bike_registration: Option<String>,
    pub status: RiderStatus,
    pub work_status: WorkStatus,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

impl Rider {
    pub fn from_application(application: RiderApplication) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: application.name,
            email: application.email,
            phone: application.phone,
            region: application.region,
            district: application.district,
            bike_registration: application.bike_registration,
            status: RiderStatus::Pending,
            work_status: WorkStatus::Available,
            created_at: Utc::now(),
        }
    }
}
