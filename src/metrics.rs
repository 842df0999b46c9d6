use std::sync::Arc;

use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;

// ---------------------------------------------------------------------------
// Label types
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct LoginLabels {
    pub outcome: LoginOutcome,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum LoginOutcome {
    Success,
    Failure,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct DenialLabels {
    pub reason: DenialReason,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum DenialReason {
    Unauthorized,
    Forbidden,
}

// ---------------------------------------------------------------------------
// Metrics struct
// ---------------------------------------------------------------------------

/// Central container for every Prometheus metric exposed by the service.
pub struct Metrics {
    pub login_attempts: Family<LoginLabels, Counter>,
    pub registrations: Counter,
    pub authz_denials: Family<DenialLabels, Counter>,
    pub store_errors: Counter,
}

impl Metrics {
    /// Create a new [`Metrics`] instance and register every metric with the
    /// supplied `registry`.
    pub fn new(registry: &mut Registry) -> Self {
        let login_attempts = Family::<LoginLabels, Counter>::default();
        registry.register(
            "storefront_login_attempts",
            "Login attempts by outcome",
            login_attempts.clone(),
        );

        let registrations = Counter::default();
        registry.register(
            "storefront_registrations",
            "Accounts successfully registered",
            registrations.clone(),
        );

        let authz_denials = Family::<DenialLabels, Counter>::default();
        registry.register(
            "storefront_authz_denials",
            "Requests denied by the access guard, by reason",
            authz_denials.clone(),
        );

        let store_errors = Counter::default();
        registry.register(
            "storefront_store_errors",
            "Credential store infrastructure failures",
            store_errors.clone(),
        );

        Self {
            login_attempts,
            registrations,
            authz_denials,
            store_errors,
        }
    }
}

impl Metrics {
    pub fn record_login(&self, outcome: LoginOutcome) {
        self.login_attempts.get_or_create(&LoginLabels { outcome }).inc();
    }

    pub fn record_denial(&self, reason: DenialReason) {
        self.authz_denials.get_or_create(&DenialLabels { reason }).inc();
    }
}

// ---------------------------------------------------------------------------
// Shared handle
// ---------------------------------------------------------------------------

/// Thread-safe wrapper for the metrics registry, used in [`crate::AppState`].
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

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
