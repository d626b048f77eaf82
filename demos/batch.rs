//! Batch resolution example
//!
//! One envelope carrying several calls: inputs are keyed by call index, all
//! calls run concurrently and each one succeeds or fails on its own.
//!
//! Run with: cargo run --example batch

use prow_core::{Error, ErrorCode, RpcError};
use prow_server::{from_typed_fn, ErrorEvent, Resolver, Router};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_target(false).init();

    let router = Router::new()
        .query(
            "issue.get",
            from_typed_fn(|id: u32, _ctx: Arc<()>| async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                if id == 0 {
                    return Err(Error::from(RpcError::new(
                        ErrorCode::NotFound,
                        "issue 0 does not exist",
                    )));
                }
                Ok(json!({"id": id, "title": format!("Issue #{}", id)}))
            }),
        )
        .query(
            "issue.count",
            from_typed_fn(|_input: (), _ctx: Arc<()>| async move { Ok(42) }),
        );

    let resolver = Resolver::builder()
        .router(router)
        .context(())
        .on_error(|event: &ErrorEvent<()>| {
            tracing::warn!(
                procedure_type = event.type_name(),
                path = ?event.path,
                code = %event.error.code,
                "{}",
                event.error
            );
        })
        .build()?;

    let started = std::time::Instant::now();
    let response = resolver
        .resolve(json!({
            "type": "query",
            "path": "issue.get,issue.get,issue.count,issue.get",
            "input": {"0": 7, "1": 0, "3": 12},
            "isBatchCall": true
        }))
        .await;

    println!("{}", serde_json::to_string_pretty(&response)?);
    println!("resolved 4 calls in {:?}", started.elapsed());

    let rejected = resolver
        .resolve(json!({
            "type": "query",
            "path": "issue.get,issue.get",
            "input": {"0": 1, "first": 2},
            "isBatchCall": true
        }))
        .await;
    println!("{}", serde_json::to_string_pretty(&rejected)?);

    Ok(())
}
