//! Resolver metrics
//!
//! OpenTelemetry instruments recorded by the resolver when metrics are turned
//! on in [`crate::ResolverBuilder`]:
//!
//! - **resolutions_total**: envelopes resolved, by outcome (`ok` / `rejected`)
//! - **resolution_duration**: end-to-end resolution latency in seconds
//! - **calls_total**: procedure calls, by path and status; calls to unknown
//!   paths share the path `<unknown>`
//! - **call_duration**: procedure latency in seconds, by path and status
//! - **batch_size**: number of calls per batch envelope
//! - **errors_total**: normalized errors, by code and stage
//!
//! Export happens through whatever meter provider is installed globally, see
//! `prow_core::init_observability`.
//!
//! ```rust
//! use prow_server::ResolverMetrics;
//!
//! let metrics = ResolverMetrics::new("issue-tracker");
//! metrics.record_call("issue.get", "success", 0.004);
//! ```

use opentelemetry::{
    global,
    metrics::{Counter, Histogram, Meter},
    InstrumentationScope, KeyValue,
};
use prow_core::ErrorCode;

/// Where a failure was raised
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorStage {
    /// Decoding, validation, input resolution or context creation
    Pipeline,
    /// Inside one procedure call
    Procedure,
    /// Result data the output transformer rejected
    Output,
}

impl ErrorStage {
    fn as_str(self) -> &'static str {
        match self {
            ErrorStage::Pipeline => "pipeline",
            ErrorStage::Procedure => "procedure",
            ErrorStage::Output => "output",
        }
    }
}

pub struct ResolverMetrics {
    pub resolutions_total: Counter<u64>,
    pub resolution_duration: Histogram<f64>,
    pub calls_total: Counter<u64>,
    pub call_duration: Histogram<f64>,
    pub batch_size: Histogram<u64>,
    pub errors_total: Counter<u64>,
}

impl ResolverMetrics {
    /// Instruments on the global meter provider, scoped to `service_name`
    pub fn new(service_name: impl Into<String>) -> Self {
        let scope = InstrumentationScope::builder(service_name.into())
            .with_version(env!("CARGO_PKG_VERSION"))
            .build();
        let meter = global::meter_with_scope(scope);
        Self::new_with_meter(&meter)
    }

    pub fn new_with_meter(meter: &Meter) -> Self {
        Self {
            resolutions_total: meter
                .u64_counter("prow.resolver.resolutions.total")
                .with_description("Call envelopes resolved")
                .build(),
            resolution_duration: meter
                .f64_histogram("prow.resolver.resolution.duration")
                .with_description("Envelope resolution duration in seconds")
                .with_unit("s")
                .build(),
            calls_total: meter
                .u64_counter("prow.resolver.calls.total")
                .with_description("Procedure calls dispatched")
                .build(),
            call_duration: meter
                .f64_histogram("prow.resolver.call.duration")
                .with_description("Procedure call duration in seconds")
                .with_unit("s")
                .build(),
            batch_size: meter
                .u64_histogram("prow.resolver.batch.size")
                .with_description("Calls per batch envelope")
                .build(),
            errors_total: meter
                .u64_counter("prow.resolver.errors.total")
                .with_description("Normalized errors by code")
                .build(),
        }
    }

    /// `outcome` is `"ok"` when dispatch ran, `"rejected"` on a pipeline failure
    pub fn record_resolution(&self, outcome: &str, duration_secs: f64) {
        let attributes = &[KeyValue::new("outcome", outcome.to_string())];
        self.resolutions_total.add(1, attributes);
        self.resolution_duration.record(duration_secs, attributes);
    }

    pub fn record_call(&self, path: &str, status: &str, duration_secs: f64) {
        let attributes = &[
            KeyValue::new("path", path.to_string()),
            KeyValue::new("status", status.to_string()),
        ];
        self.calls_total.add(1, attributes);
        self.call_duration.record(duration_secs, attributes);
    }

    pub fn record_batch(&self, size: u64) {
        self.batch_size.record(size, &[]);
    }

    pub fn record_error(&self, code: ErrorCode, stage: ErrorStage) {
        let attributes = &[
            KeyValue::new("code", code.as_str()),
            KeyValue::new("stage", stage.as_str()),
        ];
        self.errors_total.add(1, attributes);
    }
}
