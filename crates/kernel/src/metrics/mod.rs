//! Prometheus metrics collection.

use prometheus_client::encoding::{EncodeLabelSet, text::encode};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;

/// Labels for rejection counters.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct PolicyLabels {
    /// Algorithm of the policy that rejected the request.
    pub algorithm: String,
}

/// Application metrics.
pub struct Metrics {
    registry: Registry,

    /// Requests admitted through admission control.
    pub admission_admitted: Counter,

    /// Requests that bypassed admission control (skip list, anonymous,
    /// or the subsystem disabled).
    pub admission_bypassed: Counter,

    /// Rate limit rejections by algorithm.
    pub admission_rejections: Family<PolicyLabels, Counter>,
}

impl Metrics {
    /// Create a new metrics registry.
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let admission_admitted = Counter::default();
        registry.register(
            "admission_admitted",
            "Requests admitted through admission control",
            admission_admitted.clone(),
        );

        let admission_bypassed = Counter::default();
        registry.register(
            "admission_bypassed",
            "Requests that bypassed admission control",
            admission_bypassed.clone(),
        );

        let admission_rejections = Family::<PolicyLabels, Counter>::default();
        registry.register(
            "admission_rejections",
            "Rate limit rejections",
            admission_rejections.clone(),
        );

        Self {
            registry,
            admission_admitted,
            admission_bypassed,
            admission_rejections,
        }
    }

    /// Encode all metrics in the Prometheus text exposition format.
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        if let Err(error) = encode(&mut buffer, &self.registry) {
            tracing::error!(error = %error, "failed to encode metrics");
        }
        buffer
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn counters_show_up_in_the_exposition() {
        let metrics = Metrics::new();
        metrics.admission_admitted.inc();
        metrics
            .admission_rejections
            .get_or_create(&PolicyLabels {
                algorithm: "fixed_window".to_string(),
            })
            .inc();

        let output = metrics.encode();
        assert!(output.contains("admission_admitted_total 1"));
        assert!(output.contains("admission_rejections_total"));
        assert!(output.contains("fixed_window"));
    }
}
