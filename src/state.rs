use std::sync::Arc;

use crate::auth::{AuthGate, IdentityVerifier};
use crate::engine::assignment::RiderCoordinator;
use crate::engine::lifecycle::ParcelLifecycle;
use crate::engine::payments::PaymentLedger;
use crate::engine::tracking::TrackingLedger;
use crate::engine::users::UserDirectory;
use crate::gateway::ChargeGateway;
use crate::observability::metrics::Metrics;
use crate::store::DocumentStore;

#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    pub event_buffer_size: usize,
    pub enforce_transitions: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            event_buffer_size: 1024,
            enforce_transitions: false,
        }
    }
}

/// Every component shares the one store handle injected here.
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub auth: AuthGate,
    pub parcels: ParcelLifecycle,
    pub riders: RiderCoordinator,
    pub payments: PaymentLedger,
    pub tracking: TrackingLedger,
    pub users: UserDirectory,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        verifier: Arc<dyn IdentityVerifier>,
        gateway: Arc<dyn ChargeGateway>,
        options: EngineOptions,
    ) -> Self {
        let metrics = Metrics::new();
        let tracking = TrackingLedger::new(store.clone(), options.event_buffer_size, metrics.clone());

        Self {
            auth: AuthGate::new(verifier, store.clone()),
            parcels: ParcelLifecycle::new(
                store.clone(),
                tracking.clone(),
                metrics.clone(),
                options.enforce_transitions,
            ),
            riders: RiderCoordinator::new(
                store.clone(),
                tracking.clone(),
                metrics.clone(),
                options.enforce_transitions,
            ),
            payments: PaymentLedger::new(store.clone(), gateway, tracking.clone(), metrics.clone()),
            users: UserDirectory::new(store.clone()),
            tracking,
            metrics,
            store,
        }
    }
}
