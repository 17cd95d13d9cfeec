use std::sync::Arc;

use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

// ---------------------------------------------------------------------------
// Label types
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct DeliveryLabels {
    pub outcome: Outcome,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum Outcome {
    Success,
    ParseRejected,
    FetchFailed,
    TransferFailed,
}

// ---------------------------------------------------------------------------
// Metrics struct
// ---------------------------------------------------------------------------

/// Container for every Prometheus metric exposed by the service.
pub struct Metrics {
    pub deliveries_total: Family<DeliveryLabels, Counter>,
    pub delivery_duration_seconds: Histogram,
}

impl Metrics {
    /// Create a new [`Metrics`] instance and register every metric with the
    /// supplied `registry`.
    pub fn new(registry: &mut Registry) -> Self {
        let deliveries_total = Family::<DeliveryLabels, Counter>::default();
        registry.register(
            "ghcourier_deliveries_total",
            "Delivery requests by outcome",
            deliveries_total.clone(),
        );

        let delivery_duration_seconds = Histogram::new(exponential_buckets(0.05, 2.0, 12));
        registry.register(
            "ghcourier_delivery_duration_seconds",
            "End-to-end delivery latency in seconds",
            delivery_duration_seconds.clone(),
        );

        Self {
            deliveries_total,
            delivery_duration_seconds,
        }
    }

    /// Count one attempted delivery and record its latency.
    pub fn observe_delivery(&self, outcome: Outcome, seconds: f64) {
        self.deliveries_total
            .get_or_create(&DeliveryLabels { outcome })
            .inc();
        self.delivery_duration_seconds.observe(seconds);
    }

    /// Count a request rejected before any fetch or transfer happened.
    /// No latency sample: the histogram tracks attempted deliveries only.
    pub fn observe_rejection(&self, outcome: Outcome) {
        self.deliveries_total
            .get_or_create(&DeliveryLabels { outcome })
            .inc();
    }
}

// ---------------------------------------------------------------------------
// Shared handle
// ---------------------------------------------------------------------------

/// Thread-safe wrapper for the metrics registry, used in `AppState`.
#[derive(Clone)]
pub struct MetricsRegistry {
    pub registry: Arc<Registry>,
    pub metrics: Arc<Metrics>,
}

impl MetricsRegistry {
    /// Build a fresh registry and pre-register all service metrics.
    pub fn new() -> Self {
        let mut registry = Registry::default();
        let metrics = Metrics::new(&mut registry);
        Self {
            registry: Arc::new(registry),
            metrics: Arc::new(metrics),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
