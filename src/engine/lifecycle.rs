use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::tracking::TrackingLedger;
use crate::error::AppError;
use crate::models::parcel::{
    CashoutStatus, DeliveryStatus, Parcel, ParcelDetails, PaymentStatus, StatusCount,
};
use crate::models::timestamp;
use crate::observability::metrics::Metrics;
use crate::store::{
    decode, decode_all, encode, Aggregation, Collection, DocumentStore, Filter, Patch, Sort,
    StoreError,
};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ParcelQuery {
    pub email: Option<String>,
    pub payment_status: Option<PaymentStatus>,
    pub delivery_status: Option<DeliveryStatus>,
}

/// Owns parcel delivery state, cash-out state and their timestamps.
#[derive(Clone)]
pub struct ParcelLifecycle {
    store: Arc<dyn DocumentStore>,
    tracking: TrackingLedger,
    metrics: Metrics,
    enforce_transitions: bool,
}

impl ParcelLifecycle {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        tracking: TrackingLedger,
        metrics: Metrics,
        enforce_transitions: bool,
    ) -> Self {
        Self {
            store,
            tracking,
            metrics,
            enforce_transitions,
        }
    }

    pub async fn create(&self, details: ParcelDetails, creator_email: &str) -> Result<Parcel, AppError> {
        if creator_email.trim().is_empty() {
            return Err(AppError::InvalidInput("creator email is required".into()));
        }
        if details.title.trim().is_empty() {
            return Err(AppError::InvalidInput("title cannot be empty".into()));
        }
        if details.cost < 0 {
            return Err(AppError::InvalidInput("cost cannot be negative".into()));
        }

        let tracking_id = match details.tracking_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => generate_tracking_id(),
        };

        let parcel = Parcel::new(details, creator_email.to_string(), tracking_id);
        match self
            .store
            .insert_unique(Collection::Parcels, encode(&parcel)?, "tracking_id")
            .await
        {
            Ok(_) => {}
            Err(StoreError::DuplicateKey { .. }) => {
                return Err(AppError::Conflict(format!(
                    "tracking id {} already in use",
                    parcel.tracking_id
                )));
            }
            Err(err) => return Err(err.into()),
        }
        self.metrics.parcels_created_total.inc();

        self.tracking
            .append(&parcel.tracking_id, "parcel_created", None)
            .await?;

        info!(
            parcel_id = %parcel.id,
            tracking_id = %parcel.tracking_id,
            created_by = %parcel.created_by,
            "parcel created"
        );
        Ok(parcel)
    }

    pub async fn get(&self, parcel_id: Uuid) -> Result<Parcel, AppError> {
        let doc = self
            .store
            .find_one(Collection::Parcels, &Filter::by_id(parcel_id))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("parcel {parcel_id} not found")))?;
        Ok(decode(doc)?)
    }

    pub async fn find_by_tracking_id(&self, tracking_id: &str) -> Result<Parcel, AppError> {
        let doc = self
            .store
            .find_one(Collection::Parcels, &Filter::new().eq("tracking_id", tracking_id))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("tracking id {tracking_id} not found")))?;
        Ok(decode(doc)?)
    }

    /// Writes `target` as the parcel's delivery status. Entering `in_transit`
    /// stamps `picked_at`, entering `delivered` stamps `delivered_at`.
    pub async fn advance_status(&self, parcel_id: Uuid, target: DeliveryStatus) -> Result<Parcel, AppError> {
        let current = self.get(parcel_id).await?;

        let mut filter = Filter::by_id(parcel_id);
        if self.enforce_transitions {
            if !current.delivery_status.can_transition_to(target) {
                return Err(AppError::Conflict(format!(
                    "cannot move parcel from {} to {}",
                    current.delivery_status.as_str(),
                    target.as_str()
                )));
            }
            filter = filter.eq("delivery_status", current.delivery_status.as_str());
        }

        let now = Utc::now();
        let mut patch = Patch::new().set("delivery_status", target.as_str());
        match target {
            DeliveryStatus::InTransit => patch = patch.set("picked_at", timestamp::to_value(&now)),
            DeliveryStatus::Delivered => patch = patch.set("delivered_at", timestamp::to_value(&now)),
            _ => {}
        }

        let matched = self.store.update_one(Collection::Parcels, &filter, &patch).await?;
        if matched == 0 {
            warn!(parcel_id = %parcel_id, target = target.as_str(), "status write matched nothing");
            return Err(if self.enforce_transitions {
                AppError::Conflict(format!("parcel {parcel_id} changed concurrently"))
            } else {
                AppError::NotFound(format!("parcel {parcel_id} not found"))
            });
        }

        self.metrics
            .status_transitions_total
            .with_label_values(&[target.as_str()])
            .inc();
        self.tracking
            .append(&current.tracking_id, target.as_str(), None)
            .await?;

        info!(
            parcel_id = %parcel_id,
            from = current.delivery_status.as_str(),
            to = target.as_str(),
            "parcel status advanced"
        );
        self.get(parcel_id).await
    }

    /// Marks the rider earnings for a parcel as paid out.
    pub async fn cash_out(&self, parcel_id: Uuid) -> Result<Parcel, AppError> {
        let mut filter = Filter::by_id(parcel_id);
        if self.enforce_transitions {
            filter = filter.eq("delivery_status", DeliveryStatus::Delivered.as_str());
        }

        let patch = Patch::new()
            .set("cashout_status", CashoutStatus::CashOut.as_str())
            .set("cashout_at", timestamp::to_value(&Utc::now()));

        let matched = self.store.update_one(Collection::Parcels, &filter, &patch).await?;
        if matched == 0 {
            // Distinguish a missing parcel from one not yet delivered.
            self.get(parcel_id).await?;
            return Err(AppError::Conflict(format!(
                "parcel {parcel_id} is not delivered"
            )));
        }

        info!(parcel_id = %parcel_id, "parcel cashed out");
        self.get(parcel_id).await
    }

    pub async fn delete(&self, parcel_id: Uuid) -> Result<(), AppError> {
        let deleted = self
            .store
            .delete_one(Collection::Parcels, &Filter::by_id(parcel_id))
            .await?;
        if deleted == 0 {
            return Err(AppError::NotFound(format!("parcel {parcel_id} not found")));
        }
        info!(parcel_id = %parcel_id, "parcel deleted");
        Ok(())
    }

    /// Parcels matching every supplied field, newest first.
    pub async fn query(&self, query: &ParcelQuery) -> Result<Vec<Parcel>, AppError> {
        let filter = Filter::new()
            .eq_opt("created_by", query.email.as_deref())
            .eq_opt("payment_status", query.payment_status.map(|s| s.as_str()))
            .eq_opt("delivery_status", query.delivery_status.map(|s| s.as_str()));

        let docs = self
            .store
            .find(Collection::Parcels, &filter, Some(&Sort::desc("created_at")))
            .await?;
        Ok(decode_all(docs)?)
    }

    /// Parcel count per delivery status, optionally scoped to one creator.
    pub async fn status_counts(&self, creator_email: Option<&str>) -> Result<Vec<StatusCount>, AppError> {
        let aggregation = Aggregation::count_by("delivery_status")
            .matching(Filter::new().eq_opt("created_by", creator_email));

        let groups = self.store.aggregate(Collection::Parcels, &aggregation).await?;
        groups
            .into_iter()
            .map(|group| -> Result<StatusCount, AppError> {
                let status: DeliveryStatus = serde_json::from_value(group.key)
                    .map_err(|err| StoreError::Codec(err.to_string()))?;
                Ok(StatusCount {
                    status,
                    count: group.count,
                })
            })
            .collect()
    }
}

fn generate_tracking_id() -> String {
    let raw = Uuid::new_v4().simple().to_string();
    format!("TRK-{}", raw[..12].to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::details;
    use crate::store::InMemoryStore;

    fn lifecycle(enforce: bool) -> (ParcelLifecycle, TrackingLedger) {
        let store: Arc<dyn DocumentStore> = Arc::new(InMemoryStore::new());
        let metrics = Metrics::new();
        let tracking = TrackingLedger::new(store.clone(), 16, metrics.clone());
        (
            ParcelLifecycle::new(store, tracking.clone(), metrics, enforce),
            tracking,
        )
    }

    #[tokio::test]
    async fn created_parcels_start_pending_and_unpaid() {
        let (lifecycle, tracking) = lifecycle(false);
        let parcel = lifecycle.create(details("Docs"), "a@x.com").await.unwrap();

        assert_eq!(parcel.delivery_status, DeliveryStatus::Pending);
        assert_eq!(parcel.payment_status, PaymentStatus::Unpaid);
        assert_eq!(parcel.cashout_status, CashoutStatus::NotCashed);
        assert!(parcel.assigned_rider.is_none());
        assert!(parcel.tracking_id.starts_with("TRK-"));

        let stored = lifecycle.get(parcel.id).await.unwrap();
        assert_eq!(stored.created_by, "a@x.com");

        let history = tracking.history(&parcel.tracking_id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, "parcel_created");
    }

    #[tokio::test]
    async fn create_keeps_supplied_tracking_id() {
        let (lifecycle, _) = lifecycle(false);
        let mut input = details("Box");
        input.tracking_id = Some("CUSTOM-1".into());

        let parcel = lifecycle.create(input.clone(), "a@x.com").await.unwrap();
        let found = lifecycle.find_by_tracking_id("CUSTOM-1").await.unwrap();
        assert_eq!(found.id, parcel.id);

        let err = lifecycle.create(input, "b@x.com").await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_creates_share_no_tracking_id() {
        let (lifecycle, _) = lifecycle(false);
        let handles: Vec<_> = (0..8)
            .map(|n| {
                let lifecycle = lifecycle.clone();
                let mut input = details("Box");
                input.tracking_id = Some("RACE-1".into());
                tokio::spawn(async move { lifecycle.create(input, &format!("s{n}@x.com")).await })
            })
            .collect();

        let mut created = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => created += 1,
                Err(err) => assert!(matches!(err, AppError::Conflict(_))),
            }
        }
        assert_eq!(created, 1);

        let all = lifecycle.query(&ParcelQuery::default()).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].tracking_id, "RACE-1");
    }

    #[tokio::test]
    async fn create_rejects_blank_title() {
        let (lifecycle, _) = lifecycle(false);
        let err = lifecycle.create(details(" "), "a@x.com").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn advance_stamps_pick_and_delivery_times() {
        let (lifecycle, tracking) = lifecycle(false);
        let parcel = lifecycle.create(details("Box"), "a@x.com").await.unwrap();

        let picked = lifecycle
            .advance_status(parcel.id, DeliveryStatus::InTransit)
            .await
            .unwrap();
        assert_eq!(picked.delivery_status, DeliveryStatus::InTransit);
        assert!(picked.picked_at.is_some());
        assert!(picked.delivered_at.is_none());

        let delivered = lifecycle
            .advance_status(parcel.id, DeliveryStatus::Delivered)
            .await
            .unwrap();
        assert!(delivered.delivered_at.is_some());
        assert_eq!(delivered.picked_at, picked.picked_at);

        let statuses: Vec<String> = tracking
            .history(&parcel.tracking_id)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.status)
            .collect();
        assert_eq!(statuses, vec!["parcel_created", "in_transit", "delivered"]);
    }

    #[tokio::test]
    async fn unenforced_advance_accepts_any_target() {
        let (lifecycle, _) = lifecycle(false);
        let parcel = lifecycle.create(details("Box"), "a@x.com").await.unwrap();

        let updated = lifecycle
            .advance_status(parcel.id, DeliveryStatus::ServiceCenterDelivered)
            .await
            .unwrap();
        assert_eq!(updated.delivery_status, DeliveryStatus::ServiceCenterDelivered);
    }

    #[tokio::test]
    async fn enforced_advance_rejects_skipped_steps() {
        let (lifecycle, _) = lifecycle(true);
        let parcel = lifecycle.create(details("Box"), "a@x.com").await.unwrap();

        let err = lifecycle
            .advance_status(parcel.id, DeliveryStatus::Delivered)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(
            lifecycle.get(parcel.id).await.unwrap().delivery_status,
            DeliveryStatus::Pending
        );
    }

    #[tokio::test]
    async fn advance_unknown_parcel_is_not_found() {
        let (lifecycle, _) = lifecycle(false);
        let err = lifecycle
            .advance_status(Uuid::new_v4(), DeliveryStatus::InTransit)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn cash_out_is_unconditional_unless_enforced() {
        let (loose, _) = lifecycle(false);
        let parcel = loose.create(details("Box"), "a@x.com").await.unwrap();
        let cashed = loose.cash_out(parcel.id).await.unwrap();
        assert_eq!(cashed.cashout_status, CashoutStatus::CashOut);
        assert!(cashed.cashout_at.is_some());

        let (strict, _) = lifecycle(true);
        let parcel = strict.create(details("Box"), "a@x.com").await.unwrap();
        let err = strict.cash_out(parcel.id).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let err = strict.cash_out(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn query_filters_and_orders_newest_first() {
        let (lifecycle, _) = lifecycle(false);
        let first = lifecycle.create(details("One"), "a@x.com").await.unwrap();
        let second = lifecycle.create(details("Two"), "a@x.com").await.unwrap();
        lifecycle.create(details("Other"), "b@x.com").await.unwrap();

        let mine = lifecycle
            .query(&ParcelQuery {
                email: Some("a@x.com".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        let ids: Vec<Uuid> = mine.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);

        let paid = lifecycle
            .query(&ParcelQuery {
                payment_status: Some(PaymentStatus::Paid),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(paid.is_empty());

        assert_eq!(lifecycle.query(&ParcelQuery::default()).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn status_counts_group_by_delivery_status() {
        let (lifecycle, _) = lifecycle(false);
        let a = lifecycle.create(details("One"), "a@x.com").await.unwrap();
        lifecycle.create(details("Two"), "a@x.com").await.unwrap();
        lifecycle.create(details("Three"), "b@x.com").await.unwrap();
        lifecycle
            .advance_status(a.id, DeliveryStatus::InTransit)
            .await
            .unwrap();

        let scoped = lifecycle.status_counts(Some("a@x.com")).await.unwrap();
        assert_eq!(scoped.len(), 2);
        assert!(scoped.contains(&StatusCount { status: DeliveryStatus::Pending, count: 1 }));
        assert!(scoped.contains(&StatusCount { status: DeliveryStatus::InTransit, count: 1 }));

        let global = lifecycle.status_counts(None).await.unwrap();
        assert!(global.contains(&StatusCount { status: DeliveryStatus::Pending, count: 2 }));
    }

    #[tokio::test]
    async fn delete_missing_parcel_is_not_found() {
        let (lifecycle, _) = lifecycle(false);
        let parcel = lifecycle.create(details("Box"), "a@x.com").await.unwrap();

        lifecycle.delete(parcel.id).await.unwrap();
        let err = lifecycle.delete(parcel.id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
