//! Logging and OpenTelemetry setup
//!
//! A resolver emits `tracing` spans and events; this module installs the
//! subscriber that turns them into output:
//!
//! - an `EnvFilter` built from `RUST_LOG` or the configured level
//! - a fmt layer, JSON (default) or human readable
//! - optionally an OTLP trace pipeline and an OTLP meter provider, so
//!   `ResolverMetrics` and resolver spans reach a collector
//!
//! # Usage
//!
//! ```rust,no_run
//! use prow_core::ObservabilityConfig;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ObservabilityConfig::new("issue-tracker")
//!         .with_endpoint("http://localhost:4317")
//!         .with_log_level("prow_server=debug,info");
//!
//!     prow_core::init_observability(config).expect("observability");
//!
//!     // ... serve calls ...
//!
//!     prow_core::shutdown_observability();
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: default collector endpoint
//! - `RUST_LOG`: default filter, and it wins over `log_level` when set

use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::Resource;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

type SetupResult<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

const METRICS_EXPORT_INTERVAL: Duration = Duration::from_secs(30);

/// What to export and where
///
/// # Defaults
///
/// - service name `"prow"`, version of this crate
/// - endpoint `$OTEL_EXPORTER_OTLP_ENDPOINT` or `http://localhost:4317`
/// - traces and metrics off, so plain logging needs no collector
/// - JSON logs at `$RUST_LOG` or `"info"`
///
/// ```rust
/// use prow_core::ObservabilityConfig;
///
/// let config = ObservabilityConfig::new("issue-tracker")
///     .with_traces(true)
///     .with_json_logs(false);
/// assert!(config.enable_traces);
/// assert!(!config.enable_metrics);
/// ```
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub service_name: String,
    pub service_version: String,
    /// OTLP/gRPC collector address
    pub otlp_endpoint: String,
    /// Export spans over OTLP
    pub enable_traces: bool,
    /// Install an OTLP meter provider
    pub enable_metrics: bool,
    /// JSON lines instead of the human readable format
    pub json_logs: bool,
    /// Filter directive, e.g. `"info"` or `"prow_server=debug,info"`
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: "prow".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            otlp_endpoint: std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
                .unwrap_or_else(|_| "http://localhost:4317".to_string()),
            enable_traces: false,
            enable_metrics: false,
            json_logs: true,
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        }
    }
}

impl ObservabilityConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.otlp_endpoint = endpoint.into();
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.service_version = version.into();
        self
    }

    pub fn with_traces(mut self, enable: bool) -> Self {
        self.enable_traces = enable;
        self
    }

    pub fn with_metrics(mut self, enable: bool) -> Self {
        self.enable_metrics = enable;
        self
    }

    pub fn with_json_logs(mut self, enable: bool) -> Self {
        self.json_logs = enable;
        self
    }

    fn resource(&self) -> Resource {
        Resource::builder_empty()
            .with_attributes(vec![
                KeyValue::new(
                    opentelemetry_semantic_conventions::resource::SERVICE_NAME,
                    self.service_name.clone(),
                ),
                KeyValue::new(
                    opentelemetry_semantic_conventions::resource::SERVICE_VERSION,
                    self.service_version.clone(),
                ),
            ])
            .build()
    }
}

/// Install the global subscriber and, if enabled, the OTLP providers
///
/// A second call keeps the subscriber installed by the first one and returns
/// `Ok(())`, so tests may call this freely.
///
/// # Errors
///
/// Fails when the filter directive is invalid or an OTLP exporter cannot be
/// built.
pub fn init_observability(config: ObservabilityConfig) -> SetupResult<()> {
    let tracer = if config.enable_traces {
        Some(init_tracer(&config)?)
    } else {
        None
    };

    if config.enable_metrics {
        init_metrics(&config)?;
    }

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))?;

    let telemetry_layer = tracer.map(|tracer| tracing_opentelemetry::layer().with_tracer(tracer));
    let (json_layer, text_layer) = if config.json_logs {
        let layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_line_number(true)
            .json();
        (Some(layer), None)
    } else {
        let layer = tracing_subscriber::fmt::layer().with_target(true);
        (None, Some(layer))
    };

    let installed = tracing_subscriber::registry()
        .with(telemetry_layer)
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()
        .is_ok();

    tracing::info!(
        service_name = %config.service_name,
        otlp_endpoint = %config.otlp_endpoint,
        traces = config.enable_traces,
        metrics = config.enable_metrics,
        installed,
        "observability initialized"
    );

    Ok(())
}

fn init_tracer(config: &ObservabilityConfig) -> SetupResult<opentelemetry_sdk::trace::Tracer> {
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry_sdk::trace::{RandomIdGenerator, Sampler};

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(config.otlp_endpoint.clone())
        .build()?;

    let provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(config.resource())
        .with_sampler(Sampler::AlwaysOn)
        .with_id_generator(RandomIdGenerator::default())
        .build();

    let tracer = provider.tracer(config.service_name.clone());
    global::set_tracer_provider(provider);
    Ok(tracer)
}

fn init_metrics(config: &ObservabilityConfig) -> SetupResult<()> {
    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(config.otlp_endpoint.clone())
        .build()?;

    let reader = opentelemetry_sdk::metrics::PeriodicReader::builder(exporter)
        .with_interval(METRICS_EXPORT_INTERVAL)
        .build();

    let provider = opentelemetry_sdk::metrics::SdkMeterProvider::builder()
        .with_reader(reader)
        .with_resource(config.resource())
        .build();

    global::set_meter_provider(provider);
    Ok(())
}

/// Flush point for graceful shutdown
///
/// SDK providers flush when the last handle drops; this only marks the end of
/// the process in the logs.
pub fn shutdown_observability() {
    tracing::info!("observability shut down");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ObservabilityConfig::default();
        assert_eq!(config.service_name, "prow");
        assert_eq!(config.service_version, env!("CARGO_PKG_VERSION"));
        assert!(!config.enable_traces);
        assert!(!config.enable_metrics);
        assert!(config.json_logs);
    }

    #[test]
    fn test_builder_chaining() {
        let config = ObservabilityConfig::new("issues")
            .with_endpoint("http://collector:4317")
            .with_log_level("debug")
            .with_version("2.1.0")
            .with_traces(true)
            .with_metrics(true)
            .with_json_logs(false);

        assert_eq!(config.service_name, "issues");
        assert_eq!(config.otlp_endpoint, "http://collector:4317");
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.service_version, "2.1.0");
        assert!(config.enable_traces);
        assert!(config.enable_metrics);
        assert!(!config.json_logs);
    }

    #[test]
    fn test_init_logging_only_can_repeat() {
        let config = ObservabilityConfig::new("prow-test").with_log_level("warn");
        assert!(init_observability(config.clone()).is_ok());
        assert!(init_observability(config).is_ok());
        shutdown_observability();
    }
}
