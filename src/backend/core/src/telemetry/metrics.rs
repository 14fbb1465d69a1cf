//! Prometheus metrics for access resolution and tenant isolation.
//!
//! ```rust,no_run
//! use callmonitor_core::telemetry::metrics::AccessMetrics;
//! use std::time::Duration;
//!
//! AccessMetrics::record_resolution("granted", Duration::from_millis(3));
//! ```

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;

/// Global metrics registry.
static METRICS_REGISTRY: OnceLock<MetricsRegistry> = OnceLock::new();

/// Metrics configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Whether metrics collection is enabled
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,

    /// Histogram buckets (in seconds)
    #[serde(default = "default_duration_buckets")]
    pub duration_buckets: Vec<f64>,

    /// Global labels to add to all metrics
    #[serde(default)]
    pub global_labels: HashMap<String, String>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            duration_buckets: default_duration_buckets(),
            global_labels: HashMap::new(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_duration_buckets() -> Vec<f64> {
    vec![0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
}

/// Holds the Prometheus handle used to render `/metrics`.
#[derive(Clone, Default)]
pub struct MetricsRegistry {
    prometheus_handle: Option<PrometheusHandle>,
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRegistry")
            .field("prometheus_handle", &self.prometheus_handle.is_some())
            .finish()
    }
}

impl MetricsRegistry {
    /// Get the global metrics registry. Empty until [`init_metrics`] runs.
    pub fn global() -> &'static MetricsRegistry {
        METRICS_REGISTRY.get_or_init(MetricsRegistry::default)
    }

    /// Render all metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.prometheus_handle
            .as_ref()
            .map(|h| h.render())
            .unwrap_or_default()
    }
}

/// Install the Prometheus recorder.
///
/// # Errors
///
/// Returns an error if the buckets are invalid or a recorder is already installed.
pub fn init_metrics(config: &MetricsConfig, service_name: &str) -> anyhow::Result<MetricsRegistry> {
    if !config.enabled {
        return Ok(MetricsRegistry::default());
    }

    let mut builder = PrometheusBuilder::new();
    for (key, value) in &config.global_labels {
        builder = builder.add_global_label(key, value);
    }
    builder = builder.set_buckets(&config.duration_buckets)?;

    let handle = builder.install_recorder()?;
    register_metric_descriptions();

    let registry = MetricsRegistry {
        prometheus_handle: Some(handle),
    };
    let _ = METRICS_REGISTRY.set(registry.clone());

    tracing::info!(service_name = %service_name, "Metrics initialized");

    Ok(registry)
}

fn register_metric_descriptions() {
    describe_counter!(
        "callmonitor_rbac_resolutions_total",
        "Access context resolutions by outcome"
    );
    describe_histogram!(
        "callmonitor_rbac_resolve_seconds",
        "Time spent resolving an access context"
    );
    describe_counter!(
        "callmonitor_policy_decisions_total",
        "Capability checks by capability and decision"
    );
    describe_counter!(
        "callmonitor_security_events_total",
        "Security events by kind"
    );
    describe_counter!(
        "callmonitor_data_scopes_total",
        "Data-access scopes opened by kind"
    );
    describe_counter!("callmonitor_errors_total", "Errors by code");
}

/// Resolver and policy metrics.
pub struct AccessMetrics;

impl AccessMetrics {
    /// Count one resolution and record how long it took.
    pub fn record_resolution(outcome: &'static str, elapsed: Duration) {
        counter!("callmonitor_rbac_resolutions_total", "outcome" => outcome).increment(1);
        histogram!("callmonitor_rbac_resolve_seconds", "outcome" => outcome)
            .record(elapsed.as_secs_f64());
    }

    /// Count one capability check.
    pub fn record_policy_decision(capability: &'static str, allowed: bool) {
        counter!(
            "callmonitor_policy_decisions_total",
            "capability" => capability,
            "decision" => if allowed { "allow" } else { "deny" },
        )
        .increment(1);
    }
}

/// Tenant isolation metrics.
pub struct SecurityMetrics;

impl SecurityMetrics {
    pub fn record_event(kind: &'static str) {
        counter!("callmonitor_security_events_total", "kind" => kind).increment(1);
    }

    pub fn record_scope_opened(kind: &'static str) {
        counter!("callmonitor_data_scopes_total", "kind" => kind).increment(1);
    }
}
