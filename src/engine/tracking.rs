use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::error::AppError;
use crate::models::tracking::TrackingEvent;
use crate::observability::metrics::Metrics;
use crate::store::{decode_all, encode, Collection, DocumentStore, Filter, Sort};

/// Append-only per-parcel event log, keyed by the public tracking id.
#[derive(Clone)]
pub struct TrackingLedger {
    store: Arc<dyn DocumentStore>,
    events_tx: broadcast::Sender<TrackingEvent>,
    metrics: Metrics,
}

impl TrackingLedger {
    pub fn new(store: Arc<dyn DocumentStore>, event_buffer_size: usize, metrics: Metrics) -> Self {
        let (events_tx, _unused_rx) = broadcast::channel(event_buffer_size.max(1));
        Self {
            store,
            events_tx,
            metrics,
        }
    }

    pub async fn append(
        &self,
        tracking_id: &str,
        status: &str,
        note: Option<String>,
    ) -> Result<TrackingEvent, AppError> {
        self.record(TrackingEvent::new(
            tracking_id.to_string(),
            status.to_string(),
            note,
            Utc::now(),
        ))
        .await
    }

    /// Inserts a fully formed event, keeping its timestamp.
    pub async fn record(&self, event: TrackingEvent) -> Result<TrackingEvent, AppError> {
        if event.tracking_id.trim().is_empty() {
            return Err(AppError::InvalidInput("tracking_id is required".into()));
        }
        if event.status.trim().is_empty() {
            return Err(AppError::InvalidInput("status is required".into()));
        }

        self.store
            .insert_one(Collection::TrackingEvents, encode(&event)?)
            .await?;
        self.metrics.tracking_events_total.inc();

        // No subscribers is the common case.
        if self.events_tx.send(event.clone()).is_err() {
            debug!(tracking_id = %event.tracking_id, "no live tracking subscribers");
        }

        info!(
            tracking_id = %event.tracking_id,
            status = %event.status,
            "tracking event appended"
        );
        Ok(event)
    }

    pub async fn history(&self, tracking_id: &str) -> Result<Vec<TrackingEvent>, AppError> {
        let docs = self
            .store
            .find(
                Collection::TrackingEvents,
                &Filter::new().eq("tracking_id", tracking_id),
                Some(&Sort::asc("timestamp")),
            )
            .await?;
        Ok(decode_all(docs)?)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TrackingEvent> {
        self.events_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::store::InMemoryStore;

    fn ledger() -> TrackingLedger {
        TrackingLedger::new(Arc::new(InMemoryStore::new()), 16, Metrics::new())
    }

    #[tokio::test]
    async fn history_is_chronological_regardless_of_insert_order() {
        let ledger = ledger();
        let t1 = Utc::now();
        let t2 = t1 + Duration::seconds(10);
        let t3 = t2 + Duration::seconds(10);

        for (at, status) in [(t2, "second"), (t1, "first"), (t3, "third")] {
            ledger
                .record(TrackingEvent::new("TRK-1".into(), status.into(), None, at))
                .await
                .unwrap();
        }

        let history = ledger.history("TRK-1").await.unwrap();
        let statuses: Vec<&str> = history.iter().map(|e| e.status.as_str()).collect();
        assert_eq!(statuses, vec!["first", "second", "third"]);
        assert!(history.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[tokio::test]
    async fn unknown_tracking_id_has_empty_history() {
        let history = ledger().history("TRK-none").await.unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn append_requires_tracking_id_and_status() {
        let ledger = ledger();

        let err = ledger.append("", "picked_up", None).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));

        let err = ledger.append("TRK-1", " ", None).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));

        assert!(ledger.history("TRK-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn subscribers_see_appended_events() {
        let ledger = ledger();
        let mut rx = ledger.subscribe();

        ledger
            .append("TRK-9", "in_transit", Some("left hub".into()))
            .await
            .unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.tracking_id, "TRK-9");
        assert_eq!(event.note.as_deref(), Some("left hub"));
    }
}
