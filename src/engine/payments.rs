use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::tracking::TrackingLedger;
use crate::error::AppError;
use crate::gateway::{ChargeGateway, DEFAULT_CURRENCY};
use crate::models::parcel::{Parcel, PaymentStatus};
use crate::models::payment::Payment;
use crate::observability::metrics::Metrics;
use crate::store::{decode, decode_all, encode, Collection, DocumentStore, Filter, Patch, Sort};

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentDetails {
    pub parcel_id: Uuid,
    pub amount: i64,
    pub payment_method: String,
    pub transaction_id: String,
}

#[derive(Clone)]
pub struct PaymentLedger {
    store: Arc<dyn DocumentStore>,
    gateway: Arc<dyn ChargeGateway>,
    tracking: TrackingLedger,
    metrics: Metrics,
}

impl PaymentLedger {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        gateway: Arc<dyn ChargeGateway>,
        tracking: TrackingLedger,
        metrics: Metrics,
    ) -> Self {
        Self {
            store,
            gateway,
            tracking,
            metrics,
        }
    }

    /// Opens a payment intent with the gateway and returns its client secret.
    pub async fn create_intent(&self, amount_minor_units: i64) -> Result<String, AppError> {
        if amount_minor_units <= 0 {
            return Err(AppError::InvalidInput("amount must be positive".into()));
        }

        let secret = self
            .gateway
            .create_payment_intent(amount_minor_units, DEFAULT_CURRENCY)
            .await
            .map_err(|err| {
                warn!(error = %err, amount = amount_minor_units, "payment intent failed");
                AppError::Gateway(err)
            })?;
        info!(amount = amount_minor_units, "payment intent created");
        Ok(secret)
    }

    /// Flips the parcel from unpaid to paid, then stores the payment. The
    /// conditional flip is the guard against recording a parcel twice.
    pub async fn record_payment(&self, payer_email: &str, details: PaymentDetails) -> Result<Payment, AppError> {
        if payer_email.trim().is_empty() {
            return Err(AppError::InvalidInput("payer email is required".into()));
        }
        if details.amount <= 0 {
            return Err(AppError::InvalidInput("amount must be positive".into()));
        }
        if details.transaction_id.trim().is_empty() {
            return Err(AppError::InvalidInput("transaction id is required".into()));
        }

        let flipped = self
            .store
            .update_one(
                Collection::Parcels,
                &Filter::by_id(details.parcel_id)
                    .eq("payment_status", PaymentStatus::Unpaid.as_str()),
                &Patch::new().set("payment_status", PaymentStatus::Paid.as_str()),
            )
            .await?;

        let parcel: Option<Parcel> = self
            .store
            .find_one(Collection::Parcels, &Filter::by_id(details.parcel_id))
            .await?
            .map(decode::<Parcel>)
            .transpose()?;

        let Some(parcel) = parcel else {
            self.metrics.payments_total.with_label_values(&["not_found"]).inc();
            return Err(AppError::NotFound(format!("parcel {} not found", details.parcel_id)));
        };
        if flipped == 0 {
            self.metrics.payments_total.with_label_values(&["conflict"]).inc();
            warn!(parcel_id = %details.parcel_id, "parcel already paid");
            return Err(AppError::Conflict(format!(
                "parcel {} already paid",
                details.parcel_id
            )));
        }

        let payment = Payment {
            id: Uuid::new_v4(),
            parcel_id: details.parcel_id,
            email: payer_email.to_string(),
            amount: details.amount,
            payment_method: details.payment_method,
            transaction_id: details.transaction_id,
            paid_at: Utc::now(),
        };
        self.store
            .insert_one(Collection::Payments, encode(&payment)?)
            .await?;
        self.metrics.payments_total.with_label_values(&["recorded"]).inc();

        self.tracking
            .append(&parcel.tracking_id, PaymentStatus::Paid.as_str(), None)
            .await?;

        info!(
            payment_id = %payment.id,
            parcel_id = %payment.parcel_id,
            amount = payment.amount,
            "payment recorded"
        );
        Ok(payment)
    }

    /// Payments newest first, limited to one payer when given.
    pub async fn list_payments(&self, payer_email: Option<&str>) -> Result<Vec<Payment>, AppError> {
        let docs = self
            .store
            .find(
                Collection::Payments,
                &Filter::new().eq_opt("email", payer_email),
                Some(&Sort::desc("paid_at")),
            )
            .await?;
        Ok(decode_all(docs)?)
    }

    pub async fn payments_for_parcel(&self, parcel_id: Uuid) -> Result<Vec<Payment>, AppError> {
        let docs = self
            .store
            .find(
                Collection::Payments,
                &Filter::new().eq("parcel_id", parcel_id.to_string()),
                Some(&Sort::desc("paid_at")),
            )
            .await?;
        Ok(decode_all(docs)?)
    }

    /// Removes the payment record only; the parcel keeps its paid status.
    pub async fn delete_payment(&self, payment_id: Uuid) -> Result<(), AppError> {
        let deleted = self
            .store
            .delete_one(Collection::Payments, &Filter::by_id(payment_id))
            .await?;
        if deleted == 0 {
            return Err(AppError::NotFound(format!("payment {payment_id} not found")));
        }
        info!(payment_id = %payment_id, "payment deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::engine::lifecycle::ParcelLifecycle;
    use crate::engine::test_support::details;
    use crate::gateway::{GatewayError, LocalChargeGateway};
    use crate::store::InMemoryStore;

    struct DownGateway;

    #[async_trait]
    impl ChargeGateway for DownGateway {
        async fn create_payment_intent(&self, _: i64, _: &str) -> Result<String, GatewayError> {
            Err(GatewayError::Unavailable("connection refused".into()))
        }
    }

    fn ledger_with(gateway: Arc<dyn ChargeGateway>) -> (PaymentLedger, ParcelLifecycle) {
        let store: Arc<dyn DocumentStore> = Arc::new(InMemoryStore::new());
        let metrics = Metrics::new();
        let tracking = TrackingLedger::new(store.clone(), 16, metrics.clone());
        (
            PaymentLedger::new(store.clone(), gateway, tracking.clone(), metrics.clone()),
            ParcelLifecycle::new(store, tracking, metrics, false),
        )
    }

    fn ledger() -> (PaymentLedger, ParcelLifecycle) {
        ledger_with(Arc::new(LocalChargeGateway))
    }

    fn payment_for(parcel_id: Uuid, transaction_id: &str) -> PaymentDetails {
        PaymentDetails {
            parcel_id,
            amount: 500,
            payment_method: "card".into(),
            transaction_id: transaction_id.into(),
        }
    }

    #[tokio::test]
    async fn second_payment_for_parcel_conflicts() {
        let (payments, parcels) = ledger();
        let parcel = parcels.create(details("Box"), "a@x.com").await.unwrap();

        payments
            .record_payment("a@x.com", payment_for(parcel.id, "txn_1"))
            .await
            .unwrap();
        assert_eq!(
            parcels.get(parcel.id).await.unwrap().payment_status,
            PaymentStatus::Paid
        );

        let err = payments
            .record_payment("a@x.com", payment_for(parcel.id, "txn_2"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(payments.payments_for_parcel(parcel.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn payment_for_missing_parcel_is_not_found() {
        let (payments, _) = ledger();
        let err = payments
            .record_payment("a@x.com", payment_for(Uuid::new_v4(), "txn_1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(payments.list_payments(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn listing_scopes_to_payer_newest_first() {
        let (payments, parcels) = ledger();
        let first = parcels.create(details("One"), "a@x.com").await.unwrap();
        let second = parcels.create(details("Two"), "a@x.com").await.unwrap();
        let other = parcels.create(details("Three"), "b@x.com").await.unwrap();

        payments.record_payment("a@x.com", payment_for(first.id, "t1")).await.unwrap();
        payments.record_payment("a@x.com", payment_for(second.id, "t2")).await.unwrap();
        payments.record_payment("b@x.com", payment_for(other.id, "t3")).await.unwrap();

        let mine = payments.list_payments(Some("a@x.com")).await.unwrap();
        let parcel_ids: Vec<Uuid> = mine.iter().map(|p| p.parcel_id).collect();
        assert_eq!(parcel_ids, vec![second.id, first.id]);
        assert_eq!(payments.list_payments(None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn deleting_payment_keeps_parcel_paid() {
        let (payments, parcels) = ledger();
        let parcel = parcels.create(details("Box"), "a@x.com").await.unwrap();
        let payment = payments
            .record_payment("a@x.com", payment_for(parcel.id, "t1"))
            .await
            .unwrap();

        payments.delete_payment(payment.id).await.unwrap();
        assert!(payments.list_payments(None).await.unwrap().is_empty());
        assert_eq!(
            parcels.get(parcel.id).await.unwrap().payment_status,
            PaymentStatus::Paid
        );

        let err = payments.delete_payment(payment.id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn gateway_failure_surfaces_as_gateway_error() {
        let (payments, _) = ledger_with(Arc::new(DownGateway));
        let err = payments.create_intent(500).await.unwrap_err();
        assert!(matches!(err, AppError::Gateway(_)));
    }

    #[tokio::test]
    async fn intent_returns_client_secret() {
        let (payments, _) = ledger();
        let secret = payments.create_intent(1250).await.unwrap();
        assert!(secret.starts_with("pi_"));
        assert!(secret.contains("_secret_"));
    }
}
