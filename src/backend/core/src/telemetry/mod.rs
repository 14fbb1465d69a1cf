//! Telemetry: logging, metrics and optional OpenTelemetry trace export.
//!
//! ```rust,no_run
//! use callmonitor_core::telemetry::{TelemetryConfig, init_telemetry};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let handle = init_telemetry(&TelemetryConfig::default())?;
//! handle.shutdown();
//! # Ok(())
//! # }
//! ```

pub mod logging;
pub mod metrics;

pub use logging::{
    init_logging, LogFormat, LoggingConfig, RedactionConfig, RedactionPattern,
    SensitiveFieldRedactor,
};
pub use metrics::{init_metrics, AccessMetrics, MetricsConfig, MetricsRegistry, SecurityMetrics};

use opentelemetry_otlp::WithExportConfig;
use serde::Deserialize;

/// Unified telemetry configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    /// Service name for identification in traces and metrics
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Environment (development, staging, production)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// OTLP gRPC endpoint; trace export is off when unset
    #[serde(default)]
    pub otlp_endpoint: Option<String>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            environment: default_environment(),
            otlp_endpoint: None,
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

fn default_service_name() -> String {
    "callmonitor-core".to_string()
}

fn default_environment() -> String {
    std::env::var("CALLMONITOR_ENVIRONMENT").unwrap_or_else(|_| "development".to_string())
}

/// Initialize metrics, trace export and logging, in that order.
///
/// Must run inside a Tokio runtime when `otlp_endpoint` is set.
pub fn init_telemetry(config: &TelemetryConfig) -> anyhow::Result<TelemetryHandle> {
    let metrics = init_metrics(&config.metrics, &config.service_name)?;

    let tracer = match config.otlp_endpoint.as_deref() {
        Some(endpoint) => Some(
            opentelemetry_otlp::new_pipeline()
                .tracing()
                .with_exporter(
                    opentelemetry_otlp::new_exporter()
                        .tonic()
                        .with_endpoint(endpoint),
                )
                .with_trace_config(opentelemetry_sdk::trace::config().with_resource(
                    opentelemetry_sdk::Resource::new(vec![opentelemetry::KeyValue::new(
                        "service.name",
                        config.service_name.clone(),
                    )]),
                ))
                .install_batch(opentelemetry_sdk::runtime::Tokio)?,
        ),
        None => None,
    };
    let exporting = tracer.is_some();

    init_logging(&config.logging, &config.environment, tracer)?;

    ::tracing::info!(
        service_name = %config.service_name,
        environment = %config.environment,
        otlp = exporting,
        "Telemetry initialized"
    );

    Ok(TelemetryHandle { metrics, exporting })
}

/// Handle for managing telemetry lifecycle.
pub struct TelemetryHandle {
    /// Registry backing the `/metrics` endpoint
    pub metrics: MetricsRegistry,
    exporting: bool,
}

impl TelemetryHandle {
    /// Flush pending spans.
    pub fn shutdown(self) {
        if self.exporting {
            opentelemetry::global::shutdown_tracer_provider();
        }
        ::tracing::info!("Telemetry shutdown complete");
    }
}
