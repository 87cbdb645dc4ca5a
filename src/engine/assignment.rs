use std::sync::Arc;

use serde::Deserialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::engine::tracking::TrackingLedger;
use crate::error::AppError;
use crate::models::parcel::{AssignedRider, DeliveryStatus, Parcel};
use crate::models::rider::{Rider, RiderApplication, RiderStatus, WorkStatus};
use crate::models::user::Role;
use crate::observability::metrics::Metrics;
use crate::store::{
    decode, decode_all, encode, Collection, DocumentStore, Filter, Patch, Sort, StoreError,
};

#[derive(Debug, Clone, Deserialize)]
pub struct RiderAssignment {
    pub rider_id: Uuid,
    pub rider_name: String,
    pub rider_email: String,
}

/// Links parcels to riders and owns rider availability.
///
/// Parcel and rider records are written independently: a failure on one side
/// never rolls back the other, and the call reports the first failure.
#[derive(Clone)]
pub struct RiderCoordinator {
    store: Arc<dyn DocumentStore>,
    tracking: TrackingLedger,
    metrics: Metrics,
    enforce_transitions: bool,
}

impl RiderCoordinator {
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

    pub async fn create(&self, application: RiderApplication) -> Result<Rider, AppError> {
        for (field, value) in [
            ("name", &application.name),
            ("email", &application.email),
            ("region", &application.region),
            ("district", &application.district),
        ] {
            if value.trim().is_empty() {
                return Err(AppError::InvalidInput(format!("{field} cannot be empty")));
            }
        }

        let rider = Rider::from_application(application);
        self.store.insert_one(Collection::Riders, encode(&rider)?).await?;
        info!(rider_id = %rider.id, email = %rider.email, "rider application received");
        Ok(rider)
    }

    pub async fn get(&self, rider_id: Uuid) -> Result<Rider, AppError> {
        let doc = self
            .store
            .find_one(Collection::Riders, &Filter::by_id(rider_id))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("rider {rider_id} not found")))?;
        Ok(decode(doc)?)
    }

    pub async fn assign(&self, parcel_id: Uuid, assignment: &RiderAssignment) -> Result<(), AppError> {
        if assignment.rider_name.trim().is_empty() || assignment.rider_email.trim().is_empty() {
            return Err(AppError::InvalidInput("rider name and email are required".into()));
        }

        let assigned = encode(&AssignedRider {
            id: assignment.rider_id,
            name: assignment.rider_name.clone(),
            email: assignment.rider_email.clone(),
        })?;

        let mut parcel_filter = Filter::by_id(parcel_id);
        if self.enforce_transitions {
            let current = self.parcel(parcel_id).await?;
            if !current
                .delivery_status
                .can_transition_to(DeliveryStatus::RiderAssigned)
            {
                return Err(AppError::Conflict(format!(
                    "cannot assign a rider to a {} parcel",
                    current.delivery_status.as_str()
                )));
            }
            parcel_filter = parcel_filter.eq("delivery_status", current.delivery_status.as_str());
        }

        let parcel_write = self
            .store
            .update_one(
                Collection::Parcels,
                &parcel_filter,
                &Patch::new()
                    .set("delivery_status", DeliveryStatus::RiderAssigned.as_str())
                    .set("assigned_rider", assigned),
            )
            .await;

        let rider_write = self
            .store
            .update_one(
                Collection::Riders,
                &Filter::by_id(assignment.rider_id),
                &Patch::new().set("work_status", WorkStatus::InDelivery.as_str()),
            )
            .await;

        let parcel_outcome = match parcel_write {
            Ok(0) if self.enforce_transitions => Err(AppError::Conflict(format!(
                "parcel {parcel_id} changed concurrently"
            ))),
            write => write_outcome(write, || format!("parcel {parcel_id} not found")),
        };
        let rider_outcome = write_outcome(rider_write, || {
            format!("rider {} not found", assignment.rider_id)
        });

        if parcel_outcome.is_ok() != rider_outcome.is_ok() {
            error!(
                parcel_id = %parcel_id,
                rider_id = %assignment.rider_id,
                parcel_written = parcel_outcome.is_ok(),
                rider_written = rider_outcome.is_ok(),
                "assignment partially applied"
            );
        }

        if let Err(err) = parcel_outcome.and(rider_outcome) {
            self.metrics
                .assignments_total
                .with_label_values(&["error"])
                .inc();
            return Err(err);
        }

        self.metrics
            .assignments_total
            .with_label_values(&["success"])
            .inc();
        self.metrics
            .status_transitions_total
            .with_label_values(&[DeliveryStatus::RiderAssigned.as_str()])
            .inc();

        let parcel = self.parcel(parcel_id).await?;
        self.tracking
            .append(
                &parcel.tracking_id,
                DeliveryStatus::RiderAssigned.as_str(),
                Some(format!("assigned to {}", assignment.rider_name)),
            )
            .await?;

        info!(
            parcel_id = %parcel_id,
            rider_id = %assignment.rider_id,
            "parcel assigned"
        );
        Ok(())
    }

    /// Sets a rider's approval status. Activation also grants the rider role
    /// to the user with `email`, as a second write after the rider update.
    pub async fn set_approval_status(
        &self,
        rider_id: Uuid,
        status: RiderStatus,
        email: Option<&str>,
    ) -> Result<(), AppError> {
        let email = email.map(str::trim).filter(|e| !e.is_empty());
        if status == RiderStatus::Active && email.is_none() {
            return Err(AppError::InvalidInput("email is required to activate a rider".into()));
        }

        let matched = self
            .store
            .update_one(
                Collection::Riders,
                &Filter::by_id(rider_id),
                &Patch::new().set("status", status.as_str()),
            )
            .await?;
        if matched == 0 {
            return Err(AppError::NotFound(format!("rider {rider_id} not found")));
        }
        info!(rider_id = %rider_id, status = status.as_str(), "rider status updated");

        if let (RiderStatus::Active, Some(email)) = (status, email) {
            let promoted = self
                .store
                .update_one(
                    Collection::Users,
                    &Filter::new().eq("email", email),
                    &Patch::new().set("role", Role::Rider.as_str()),
                )
                .await?;
            if promoted == 0 {
                warn!(rider_id = %rider_id, email = %email, "active rider has no user record");
                return Err(AppError::NotFound(format!("user {email} not found")));
            }
            info!(rider_id = %rider_id, email = %email, "user promoted to rider");
        }

        Ok(())
    }

    pub async fn mark_busy(&self, rider_id: Uuid) -> Result<(), AppError> {
        let matched = self
            .store
            .update_one(
                Collection::Riders,
                &Filter::by_id(rider_id),
                &Patch::new().set("work_status", WorkStatus::Busy.as_str()),
            )
            .await?;
        if matched == 0 {
            return Err(AppError::NotFound(format!("rider {rider_id} not found")));
        }
        Ok(())
    }

    pub async fn list_by_region(&self, region: &str) -> Result<Vec<Rider>, AppError> {
        self.list(Filter::new().eq("region", region)).await
    }

    pub async fn list_pending(&self, district: Option<&str>) -> Result<Vec<Rider>, AppError> {
        self.list(
            Filter::new()
                .eq("status", RiderStatus::Pending.as_str())
                .eq_opt("district", district),
        )
        .await
    }

    pub async fn list_active(&self, district: Option<&str>) -> Result<Vec<Rider>, AppError> {
        self.list(
            Filter::new()
                .eq("status", RiderStatus::Active.as_str())
                .eq_opt("district", district),
        )
        .await
    }

    /// Active riders free to take a parcel.
    pub async fn list_available(&self, district: Option<&str>) -> Result<Vec<Rider>, AppError> {
        self.list(
            Filter::new()
                .eq("status", RiderStatus::Active.as_str())
                .eq("work_status", WorkStatus::Available.as_str())
                .eq_opt("district", district),
        )
        .await
    }

    /// Parcels assigned to the rider, newest first. `open_only` selects work
    /// still in progress, otherwise finished deliveries.
    pub async fn list_assigned_parcels(&self, rider_email: &str, open_only: bool) -> Result<Vec<Parcel>, AppError> {
        let statuses = if open_only {
            [DeliveryStatus::RiderAssigned, DeliveryStatus::InTransit]
        } else {
            [DeliveryStatus::Delivered, DeliveryStatus::ServiceCenterDelivered]
        };
        let filter = Filter::new()
            .eq("assigned_rider.email", rider_email)
            .one_of("delivery_status", statuses.iter().map(|s| s.as_str()));

        let docs = self
            .store
            .find(Collection::Parcels, &filter, Some(&Sort::desc("created_at")))
            .await?;
        Ok(decode_all(docs)?)
    }

    /// Delivered parcels of the rider, most recently cashed out first.
    pub async fn earnings(&self, rider_email: &str) -> Result<Vec<Parcel>, AppError> {
        let filter = Filter::new()
            .eq("assigned_rider.email", rider_email)
            .eq("delivery_status", DeliveryStatus::Delivered.as_str());

        let docs = self
            .store
            .find(Collection::Parcels, &filter, Some(&Sort::desc("cashout_at")))
            .await?;
        Ok(decode_all(docs)?)
    }

    async fn parcel(&self, parcel_id: Uuid) -> Result<Parcel, AppError> {
        let doc = self
            .store
            .find_one(Collection::Parcels, &Filter::by_id(parcel_id))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("parcel {parcel_id} not found")))?;
        Ok(decode(doc)?)
    }

    async fn list(&self, filter: Filter) -> Result<Vec<Rider>, AppError> {
        let docs = self
            .store
            .find(Collection::Riders, &filter, Some(&Sort::desc("created_at")))
            .await?;
        Ok(decode_all(docs)?)
    }
}

fn write_outcome(
    write: Result<u64, StoreError>,
    not_found: impl FnOnce() -> String,
) -> Result<(), AppError> {
    match write {
        Ok(0) => Err(AppError::NotFound(not_found())),
        Ok(_) => Ok(()),
        Err(err) => Err(AppError::Store(err)),
    }
}
