//! Application state shared across all handlers.

use std::sync::Arc;

use crate::clock::Clock;
use crate::config::Config;
use crate::metrics::Metrics;
use crate::middleware::AdmissionController;
use crate::tenant::tier::TenantSubscriptionLookup;

/// Shared application state.
///
/// Wrapped in Arc internally so Clone is cheap.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Loaded configuration.
    config: Config,

    /// Admission controller.
    admission: Arc<AdmissionController>,

    /// Prometheus metrics.
    metrics: Arc<Metrics>,
}

impl AppState {
    /// Create new application state.
    ///
    /// The subscription lookup and clock are injected rather than
    /// constructed here so tests and embedders can supply their own;
    /// the binary passes the static lookup and the system clock.
    pub fn new(
        config: Config,
        lookup: Arc<dyn TenantSubscriptionLookup>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let metrics = Arc::new(Metrics::new());

        // The environment escape hatch folds into the effective switch:
        // test/CI processes run with admission control bypassed entirely.
        let enabled = config.admission.enabled && !config.is_test_environment();

        let admission = Arc::new(AdmissionController::new(
            &config.admission,
            enabled,
            lookup,
            clock,
            metrics.clone(),
        ));

        Self {
            inner: Arc::new(AppStateInner {
                config,
                admission,
                metrics,
            }),
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the admission controller.
    pub fn admission(&self) -> &Arc<AdmissionController> {
        &self.inner.admission
    }

    /// Get the metrics registry.
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.inner.metrics
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("admission", &self.inner.admission)
            .finish()
    }
}
