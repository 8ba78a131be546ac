// Private module declaration
mod server;

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry};

use crate::utils::{CircuitState, TransitionHook};

// Re-export for public API
pub use server::start_metrics_server;

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Provides metrics for:
// - Order placement and status transitions
// - Rejected order operations by error class
// - Chef assignment outcomes per strategy
// - Ready-time estimates
// - Circuit breaker state transitions
//
// All metrics are registered with Prometheus and can be scraped via /metrics
// ============================================================================

/// Chef assignment outcome label values.
pub mod assignment_outcome {
    pub const ASSIGNED: &str = "assigned";
    pub const NONE: &str = "none";
    pub const DEGRADED: &str = "degraded";
    pub const FAILED: &str = "failed";
}

/// Central metrics registry for the entire application
pub struct Metrics {
    registry: Registry,

    // Order Lifecycle Metrics
    pub orders_created: IntCounter,
    pub order_status_transitions: IntCounterVec,
    pub order_rejections: IntCounterVec,

    // Assignment Metrics
    pub chef_assignments: IntCounterVec,
    pub estimated_ready_minutes: Histogram,

    // Circuit Breaker Metrics
    pub circuit_breaker_state: IntGauge,
    pub circuit_breaker_transitions: IntCounterVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        // Order Lifecycle Metrics
        let orders_created = IntCounter::new("orders_created_total", "Total orders placed")?;
        registry.register(Box::new(orders_created.clone()))?;

        let order_status_transitions = IntCounterVec::new(
            Opts::new("order_status_transitions_total", "Applied order status transitions"),
            &["from", "to"],
        )?;
        registry.register(Box::new(order_status_transitions.clone()))?;

        let order_rejections = IntCounterVec::new(
            Opts::new("order_rejections_total", "Rejected order operations"),
            &["reason"],
        )?;
        registry.register(Box::new(order_rejections.clone()))?;

        // Assignment Metrics
        let chef_assignments = IntCounterVec::new(
            Opts::new("chef_assignments_total", "Chef assignment attempts at order placement"),
            &["strategy", "outcome"],
        )?;
        registry.register(Box::new(chef_assignments.clone()))?;

        let estimated_ready_minutes = Histogram::with_opts(
            HistogramOpts::new("estimated_ready_minutes", "Estimated minutes until an order is ready")
                .buckets(vec![5.0, 10.0, 15.0, 20.0, 30.0, 45.0, 60.0, 90.0, 120.0]),
        )?;
        registry.register(Box::new(estimated_ready_minutes.clone()))?;

        // Circuit Breaker Metrics
        let circuit_breaker_state = IntGauge::new(
            "circuit_breaker_state",
            "Circuit breaker state (0=Closed, 1=Open, 2=HalfOpen)",
        )?;
        registry.register(Box::new(circuit_breaker_state.clone()))?;

        let circuit_breaker_transitions = IntCounterVec::new(
            Opts::new("circuit_breaker_transitions_total", "Circuit breaker state transitions"),
            &["from_state", "to_state"],
        )?;
        registry.register(Box::new(circuit_breaker_transitions.clone()))?;

        Ok(Self {
            registry,
            orders_created,
            order_status_transitions,
            order_rejections,
            chef_assignments,
            estimated_ready_minutes,
            circuit_breaker_state,
            circuit_breaker_transitions,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_order_created(&self) {
        self.orders_created.inc();
    }

    pub fn record_status_transition(&self, from: &str, to: &str) {
        self.order_status_transitions.with_label_values(&[from, to]).inc();
    }

    pub fn record_rejection(&self, reason: &str) {
        self.order_rejections.with_label_values(&[reason]).inc();
    }

    pub fn record_assignment(&self, strategy: &str, outcome: &str) {
        self.chef_assignments.with_label_values(&[strategy, outcome]).inc();
    }

    pub fn observe_estimate(&self, minutes: i64) {
        self.estimated_ready_minutes.observe(minutes as f64);
    }

    /// Helper to update circuit breaker state
    pub fn update_circuit_breaker_state(&self, state: CircuitState) {
        self.circuit_breaker_state.set(state.as_gauge());
    }

    /// Helper to record circuit breaker transition
    pub fn record_circuit_breaker_transition(&self, from_state: &str, to_state: &str) {
        self.circuit_breaker_transitions.with_label_values(&[from_state, to_state]).inc();
    }

    /// Hook for [`crate::utils::CircuitBreaker::with_transition_hook`] that
    /// mirrors every transition into the breaker metrics.
    pub fn circuit_breaker_hook(self: &std::sync::Arc<Self>) -> TransitionHook {
        let metrics = self.clone();
        std::sync::Arc::new(move |_name: &str, from: CircuitState, to: CircuitState| {
            metrics.record_circuit_breaker_transition(from.as_str(), to.as_str());
            metrics.update_circuit_breaker_state(to);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn counter_value(metrics: &Metrics, name: &str) -> Vec<f64> {
        metrics
            .registry
            .gather()
            .iter()
            .find(|m| m.name() == name)
            .map(|family| family.metric.iter().filter_map(|m| m.counter.value).collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        metrics.record_order_created();
        assert!(!metrics.registry.gather().is_empty());
        assert_eq!(counter_value(&metrics, "orders_created_total"), vec![1.0]);
    }

    #[test]
    fn test_assignment_outcomes_are_labelled() {
        let metrics = Metrics::new().unwrap();
        metrics.record_assignment("round_robin", assignment_outcome::ASSIGNED);
        metrics.record_assignment("round_robin", assignment_outcome::DEGRADED);
        metrics.record_assignment("round_robin", assignment_outcome::ASSIGNED);

        let mut values = counter_value(&metrics, "chef_assignments_total");
        values.sort_by(|a, b| a.total_cmp(b));
        assert_eq!(values, vec![1.0, 2.0]);
    }

    #[test]
    fn test_circuit_breaker_hook_updates_gauge() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let hook = metrics.circuit_breaker_hook();
        hook("redis_counter", CircuitState::Closed, CircuitState::Open);

        let gathered = metrics.registry.gather();
        let state = gathered.iter().find(|m| m.name() == "circuit_breaker_state").unwrap();
        assert_eq!(state.metric[0].gauge.value, Some(1.0));
        assert_eq!(counter_value(&metrics, "circuit_breaker_transitions_total"), vec![1.0]);
    }
}
