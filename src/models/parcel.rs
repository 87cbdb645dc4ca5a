use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::timestamp;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Paid => "paid",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    RiderAssigned,
    InTransit,
    Delivered,
    ServiceCenterDelivered,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::RiderAssigned => "rider_assigned",
            DeliveryStatus::InTransit => "in_transit",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::ServiceCenterDelivered => "service_center_delivered",
        }
    }

    /// Statuses reachable from `self` in one step of the delivery workflow.
    pub fn successors(&self) -> &'static [DeliveryStatus] {
        match self {
            DeliveryStatus::Pending => &[DeliveryStatus::RiderAssigned],
            DeliveryStatus::RiderAssigned => &[DeliveryStatus::InTransit],
            DeliveryStatus::InTransit => &[
                DeliveryStatus::Delivered,
                DeliveryStatus::ServiceCenterDelivered,
            ],
            DeliveryStatus::Delivered | DeliveryStatus::ServiceCenterDelivered => &[],
        }
    }

    pub fn can_transition_to(&self, target: DeliveryStatus) -> bool {
        self.successors().contains(&target)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CashoutStatus {
    NotCashed,
    CashOut,
}

impl CashoutStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CashoutStatus::NotCashed => "not_cashed",
            CashoutStatus::CashOut => "cash_out",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssignedRider {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

/// Shipment details supplied by the sender.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParcelDetails {
    pub title: String,
    #[serde(default)]
    pub parcel_type: Option<String>,
    #[serde(default)]
    pub weight_kg: Option<f64>,
    pub sender_name: String,
    pub sender_region: String,
    pub sender_district: String,
    pub receiver_name: String,
    pub receiver_region: String,
    pub receiver_district: String,
    #[serde(default)]
    pub receiver_contact: Option<String>,
    /// Delivery charge in minor currency units.
    pub cost: i64,
    #[serde(default)]
    pub tracking_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parcel {
    pub id: Uuid,
    pub tracking_id: String,
    pub created_by: String,
    pub title: String,
    pub parcel_type: Option<String>,
    pub weight_kg: Option<f64>,
    pub sender_name: String,
    pub sender_region: String,
    pub sender_district: String,
    pub receiver_name: String,
    pub receiver_region: String,
    pub receiver_district: String,
    pub receiver_contact: Option<String>,
    pub cost: i64,
    pub payment_status: PaymentStatus,
    pub delivery_status: DeliveryStatus,
    pub assigned_rider: Option<AssignedRider>,
    pub cashout_status: CashoutStatus,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "timestamp::option")]
    pub picked_at: Option<DateTime<Utc>>,
    #[serde(default, with = "timestamp::option")]
    pub delivered_at: Option<DateTime<Utc>>,
    #[serde(default, with = "timestamp::option")]
    pub cashout_at: Option<DateTime<Utc>>,
}

impl Parcel {
    pub fn new(details: ParcelDetails, created_by: String, tracking_id: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            tracking_id,
            created_by,
            title: details.title,
            parcel_type: details.parcel_type,
            weight_kg: details.weight_kg,
            sender_name: details.sender_name,
            sender_region: details.sender_region,
            sender_district: details.sender_district,
            receiver_name: details.receiver_name,
            receiver_region: details.receiver_region,
            receiver_district: details.receiver_district,
            receiver_contact: details.receiver_contact,
            cost: details.cost,
            payment_status: PaymentStatus::Unpaid,
            delivery_status: DeliveryStatus::Pending,
            assigned_rider: None,
            cashout_status: CashoutStatus::NotCashed,
            created_at: Utc::now(),
            picked_at: None,
            delivered_at: None,
            cashout_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusCount {
    pub status: DeliveryStatus,
    pub count: u64,
}

#[cfg(test)]
mod tests {
    use super::DeliveryStatus;

    #[test]
    fn workflow_allows_only_forward_steps() {
        assert!(DeliveryStatus::Pending.can_transition_to(DeliveryStatus::RiderAssigned));
        assert!(DeliveryStatus::RiderAssigned.can_transition_to(DeliveryStatus::InTransit));
        assert!(DeliveryStatus::InTransit.can_transition_to(DeliveryStatus::Delivered));
        assert!(
            DeliveryStatus::InTransit.can_transition_to(DeliveryStatus::ServiceCenterDelivered)
        );

        assert!(!DeliveryStatus::Pending.can_transition_to(DeliveryStatus::Delivered));
        assert!(!DeliveryStatus::Delivered.can_transition_to(DeliveryStatus::Pending));
        assert!(DeliveryStatus::ServiceCenterDelivered.successors().is_empty());
    }

    #[test]
    fn status_labels_match_wire_format() {
        let encoded = serde_json::to_value(DeliveryStatus::ServiceCenterDelivered).unwrap();
        assert_eq!(encoded, DeliveryStatus::ServiceCenterDelivered.as_str());
    }
}
