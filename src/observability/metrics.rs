use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub parcels_created_total: IntCounter,
    pub status_transitions_total: IntCounterVec,
    pub assignments_total: IntCounterVec,
    pub payments_total: IntCounterVec,
    pub tracking_events_total: IntCounter,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let parcels_created_total =
            IntCounter::new("parcels_created_total", "Total parcels created")
                .expect("valid parcels_created_total metric");

        let status_transitions_total = IntCounterVec::new(
            Opts::new(
                "status_transitions_total",
                "Delivery status writes by target status",
            ),
            &["status"],
        )
        .expect("valid status_transitions_total metric");

        let assignments_total = IntCounterVec::new(
            Opts::new("assignments_total", "Rider assignments by outcome"),
            &["outcome"],
        )
        .expect("valid assignments_total metric");

        let payments_total = IntCounterVec::new(
            Opts::new("payments_total", "Payment recording attempts by outcome"),
            &["outcome"],
        )
        .expect("valid payments_total metric");

        let tracking_events_total =
            IntCounter::new("tracking_events_total", "Tracking events appended")
                .expect("valid tracking_events_total metric");

        registry
            .register(Box::new(parcels_created_total.clone()))
            .expect("register parcels_created_total");
        registry
            .register(Box::new(status_transitions_total.clone()))
            .expect("register status_transitions_total");
        registry
            .register(Box::new(assignments_total.clone()))
            .expect("register assignments_total");
        registry
            .register(Box::new(payments_total.clone()))
            .expect("register payments_total");
        registry
            .register(Box::new(tracking_events_total.clone()))
            .expect("register tracking_events_total");

        Self {
            registry,
            parcels_created_total,
            status_transitions_total,
            assignments_total,
            payments_total,
            tracking_events_total,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}
