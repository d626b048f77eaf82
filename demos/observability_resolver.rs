//! Observability example
//!
//! Structured JSON logs, spans for every resolution and dispatch, and
//! OpenTelemetry metrics exported over OTLP.
//!
//! Run with: cargo run --example observability_resolver
//!
//! Set OTEL_EXPORTER_OTLP_ENDPOINT to point at a collector.

use prow_core::ObservabilityConfig;
use prow_server::{from_typed_fn, Resolver, Router, TracingMiddleware};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

#[derive(Deserialize)]
struct MultiplyParams {
    a: i32,
    b: i32,
}

#[derive(Serialize)]
struct MultiplyResult {
    product: i32,
}

async fn multiply(params: MultiplyParams, _ctx: Arc<()>) -> prow_core::Result<MultiplyResult> {
    tracing::info!(a = params.a, b = params.b, "Multiplying numbers");
    tokio::time::sleep(std::time::Duration::from_millis(15)).await;
    Ok(MultiplyResult {
        product: params.a * params.b,
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let otel_config = ObservabilityConfig::new("prow-observability-demo")
        .with_traces(true)
        .with_metrics(true)
        .with_log_level("debug");

    let resolver = Resolver::builder()
        .router(Router::new().query("multiply", from_typed_fn(multiply)))
        .context(())
        .use_middleware(Arc::new(TracingMiddleware::new()))
        .with_observability(otel_config)
        .build()?;

    for round in 0..5 {
        let response = resolver
            .resolve(json!({
                "type": "query",
                "path": "multiply,multiply,missing",
                "input": {"0": {"a": round, "b": 3}, "1": {"a": round, "b": 4}},
                "isBatchCall": true
            }))
            .await;
        let text = serde_json::to_string(&response)?;
        tracing::info!(round, response = %text, "resolved");
    }

    prow_core::shutdown_observability();
    Ok(())
}
