//! Simple resolver example
//!
//! Resolves a few single-call envelopes the way a host bridge would deliver
//! them and prints the JSON responses.
//!
//! Run with: cargo run --example simple_resolver

use prow_core::Result;
use prow_server::{from_fn, from_typed_fn, InvocationRequest, RequestHandler, Resolver, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Deserialize)]
struct AddParams {
    a: i32,
    b: i32,
}

#[derive(Serialize)]
struct AddResult {
    sum: i32,
}

#[derive(Deserialize)]
struct GreetParams {
    name: String,
}

struct Site {
    account_id: Option<String>,
}

async fn add(params: AddParams, _site: Arc<Site>) -> Result<AddResult> {
    Ok(AddResult {
        sum: params.a + params.b,
    })
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = Router::new()
        .query("add", from_typed_fn(add))
        .query(
            "greet",
            from_typed_fn(|params: GreetParams, _site: Arc<Site>| async move {
                Ok(format!("Hello, {}!", params.name))
            }),
        )
        .query(
            "whoami",
            from_fn(|_input, site: Arc<Site>| async move { Ok(serde_json::json!(site.account_id)) }),
        );

    let resolver = Resolver::builder()
        .router(router)
        .context_factory(|request: &InvocationRequest| {
            let account_id = request.context["accountId"].as_str().map(str::to_string);
            async move { Ok::<_, prow_core::Error>(Site { account_id }) }
        })
        .build()?;
    let handler = RequestHandler::new(resolver);

    let calls = [
        r#"{"type":"query","path":"add","input":{"a":5,"b":3},"isBatchCall":false}"#,
        r#"{"type":"query","path":"greet","input":{"name":"Ada"},"isBatchCall":false}"#,
        r#"{"type":"query","path":"whoami","isBatchCall":false}"#,
        r#"{"type":"mutation","path":"add","isBatchCall":false}"#,
        r#"{"type":"subscription","path":"add","isBatchCall":false}"#,
        r#"{"type":"query","path":"add""#,
    ];

    for call in calls {
        let response = handler
            .handle_text(call, serde_json::json!({"accountId": "557058:demo"}))
            .await;
        println!("{}\n  -> {}", call, response);
    }

    Ok(())
}
