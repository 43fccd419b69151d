// Private module declaration
mod server;

use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry};

use crate::utils::CircuitState;

// Re-export for public API
pub use server::start_metrics_server;

// ============================================================================
// Metrics Module - Prometheus metrics for the command/event pipeline
// ============================================================================
//
// Covers both sides of the queue:
// - command dispatch outcomes
// - local notification fan-out and subscriber failures
// - broker publishes, transport failures, circuit breaker state
// - consumer outcomes (persisted / malformed / requeued) and latency
//
// Each Metrics value owns its registry, so tests can build as many as they
// like without clashing on the global default registry.
// ============================================================================

pub struct Metrics {
    registry: Registry,

    pub requests_dispatched: IntCounterVec,
    pub notifications_published: IntCounterVec,
    pub subscriber_failures: IntCounterVec,

    pub broker_publishes: IntCounterVec,
    pub circuit_breaker_state: IntGauge,

    pub consumer_messages: IntCounterVec,
    pub consumer_processing_duration: HistogramVec,
    pub consumer_persist_retries: IntCounterVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let requests_dispatched = IntCounterVec::new(
            Opts::new("pipeline_requests_dispatched_total", "Commands and queries dispatched"),
            &["request", "outcome"],
        )?;
        registry.register(Box::new(requests_dispatched.clone()))?;

        let notifications_published = IntCounterVec::new(
            Opts::new("pipeline_notifications_published_total", "Events fanned out to local subscribers"),
            &["event_type"],
        )?;
        registry.register(Box::new(notifications_published.clone()))?;

        let subscriber_failures = IntCounterVec::new(
            Opts::new("pipeline_subscriber_failures_total", "Local subscriber invocations that failed"),
            &["event_type"],
        )?;
        registry.register(Box::new(subscriber_failures.clone()))?;

        let broker_publishes = IntCounterVec::new(
            Opts::new("pipeline_broker_publishes_total", "Events handed to the broker"),
            &["event_type", "outcome"],
        )?;
        registry.register(Box::new(broker_publishes.clone()))?;

        let circuit_breaker_state = IntGauge::new(
            "pipeline_broker_circuit_state",
            "Broker circuit breaker state (0=Closed, 1=Open, 2=HalfOpen)",
        )?;
        registry.register(Box::new(circuit_breaker_state.clone()))?;

        let consumer_messages = IntCounterVec::new(
            Opts::new("pipeline_consumer_messages_total", "Messages handled by the broker consumer"),
            &["event_type", "outcome"],
        )?;
        registry.register(Box::new(consumer_messages.clone()))?;

        let consumer_processing_duration = HistogramVec::new(
            HistogramOpts::new(
                "pipeline_consumer_processing_seconds",
                "Time from delivery to acknowledgment decision",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["event_type"],
        )?;
        registry.register(Box::new(consumer_processing_duration.clone()))?;

        let consumer_persist_retries = IntCounterVec::new(
            Opts::new("pipeline_consumer_persist_retries_total", "Persistence attempts beyond the first"),
            &["event_type"],
        )?;
        registry.register(Box::new(consumer_persist_retries.clone()))?;

        Ok(Self {
            registry,
            requests_dispatched,
            notifications_published,
            subscriber_failures,
            broker_publishes,
            circuit_breaker_state,
            consumer_messages,
            consumer_processing_duration,
            consumer_persist_retries,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_request(&self, request: &str, success: bool) {
        let outcome = if success { "ok" } else { "error" };
        self.requests_dispatched.with_label_values(&[request, outcome]).inc();
    }

    pub fn record_notification(&self, event_type: &str, failed_subscribers: usize) {
        self.notifications_published.with_label_values(&[event_type]).inc();
        if failed_subscribers > 0 {
            self.subscriber_failures
                .with_label_values(&[event_type])
                .inc_by(failed_subscribers as u64);
        }
    }

    pub fn record_broker_publish(&self, event_type: &str, success: bool, circuit: CircuitState) {
        let outcome = if success { "queued" } else { "transport_error" };
        self.broker_publishes.with_label_values(&[event_type, outcome]).inc();
        self.circuit_breaker_state.set(circuit.as_gauge());
    }

    pub fn record_consumed(&self, event_type: &str, outcome: &str, duration_secs: f64) {
        self.consumer_messages.with_label_values(&[event_type, outcome]).inc();
        self.consumer_processing_duration
            .with_label_values(&[event_type])
            .observe(duration_secs);
    }

    pub fn record_persist_retry(&self, event_type: &str) {
        self.consumer_persist_retries.with_label_values(&[event_type]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_independent_registries() {
        let first = Metrics::new().unwrap();
        let second = Metrics::new().unwrap();

        first.record_request("PlaceOrder", true);

        assert_eq!(
            first.requests_dispatched.with_label_values(&["PlaceOrder", "ok"]).get(),
            1
        );
        assert_eq!(
            second.requests_dispatched.with_label_values(&["PlaceOrder", "ok"]).get(),
            0
        );
    }

    #[test]
    fn test_broker_publish_updates_circuit_gauge() {
        let metrics = Metrics::new().unwrap();

        metrics.record_broker_publish("OrderPlaced", false, CircuitState::Open);

        assert_eq!(metrics.circuit_breaker_state.get(), 1);
        assert_eq!(
            metrics
                .broker_publishes
                .with_label_values(&["OrderPlaced", "transport_error"])
                .get(),
            1
        );
    }

    #[test]
    fn test_subscriber_failures_only_counted_when_present() {
        let metrics = Metrics::new().unwrap();

        metrics.record_notification("OrderPlaced", 0);
        metrics.record_notification("OrderPlaced", 2);

        assert_eq!(
            metrics.notifications_published.with_label_values(&["OrderPlaced"]).get(),
            2
        );
        assert_eq!(
            metrics.subscriber_failures.with_label_values(&["OrderPlaced"]).get(),
            2
        );
    }

    #[test]
    fn test_registry_gathers_recorded_families() {
        let metrics = Metrics::new().unwrap();
        metrics.record_consumed("OrderPlaced", "persisted", 0.002);

        // consumer counter + histogram, plus the gauge which is always present
        assert!(metrics.registry().gather().len() >= 3);
    }
}
