//! End-to-end resolution tests

use prow_core::{Error, ErrorCode, RpcError};
use prow_server::{
    from_fn, from_fns, from_typed_fn, ErrorEvent, IdentityTransformer, InvocationRequest, Resolver,
    Router, Transformer,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Deserialize)]
struct Greeting {
    name: String,
}

type Events = Arc<Mutex<Vec<(String, Option<String>, String, bool)>>>;

fn router() -> Router<()> {
    Router::new()
        .query(
            "hello",
            from_fn(|input, _ctx: Arc<()>| async move {
                Ok(json!(format!("hello {}", input.unwrap_or(Value::Null))))
            }),
        )
        .query(
            "greet",
            from_typed_fn(|greeting: Greeting, _ctx: Arc<()>| async move {
                Ok(format!("hi {}", greeting.name))
            }),
        )
        .query(
            "picky",
            from_fn(|input, _ctx: Arc<()>| async move {
                match input {
                    Some(Value::Number(n)) if n.as_i64() == Some(1) => {
                        Err(RpcError::new(ErrorCode::Conflict, "one is taken").into())
                    }
                    other => Ok(other.unwrap_or(Value::Null)),
                }
            }),
        )
        .query(
            "explode",
            from_fn(|_input, _ctx: Arc<()>| async move {
                if true {
                    panic!("kaboom");
                }
                Ok(Value::Null)
            }),
        )
        .mutation("save", from_fn(|input, _ctx: Arc<()>| async move { Ok(json!({ "saved": input })) }))
}

fn resolver_with(router: Router<()>, batching: bool) -> (Resolver<()>, Events) {
    let events: Events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let resolver = Resolver::builder()
        .router(router)
        .context(())
        .batching(batching)
        .on_error(move |event: &ErrorEvent<()>| {
            sink.lock().unwrap().push((
                event.type_name().to_string(),
                event.path.clone(),
                event.error.message.clone(),
                event.ctx.is_some(),
            ));
        })
        .build()
        .unwrap();
    (resolver, events)
}

fn resolver() -> (Resolver<()>, Events) {
    resolver_with(router(), true)
}

fn to_json<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap()
}

#[tokio::test]
async fn test_single_query() {
    let (resolver, events) = resolver();

    let response = resolver
        .resolve(json!({"type": "query", "path": "hello", "input": "ada", "isBatchCall": false}))
        .await;

    assert_eq!(to_json(&response), json!({"result": {"data": "hello \"ada\""}}));
    assert!(events.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_single_query_without_input() {
    let (resolver, _) = resolver();

    let response = resolver
        .resolve(json!({"type": "query", "path": "hello", "isBatchCall": false}))
        .await;

    assert_eq!(to_json(&response), json!({"result": {"data": "hello null"}}));
}

#[tokio::test]
async fn test_batch_returns_envelopes_in_order() {
    let (resolver, _) = resolver();

    let response = resolver
        .resolve(json!({
            "type": "query",
            "path": "hello,hello,hello",
            "input": {"0": 0, "1": 1, "2": 2},
            "isBatchCall": true
        }))
        .await;

    assert_eq!(
        to_json(&response),
        json!([
            {"result": {"data": "hello 0"}},
            {"result": {"data": "hello 1"}},
            {"result": {"data": "hello 2"}}
        ])
    );
}

#[tokio::test]
async fn test_batch_with_decimal_keys() {
    let (resolver, _) = resolver();

    let response = resolver
        .resolve(json!({
            "type": "query",
            "path": "hello,hello",
            "input": {"0.0": "a", "1.0": "b"},
            "isBatchCall": true
        }))
        .await;

    assert_eq!(
        to_json(&response),
        json!([{"result": {"data": "hello \"a\""}}, {"result": {"data": "hello \"b\""}}])
    );
}

#[tokio::test]
async fn test_batch_with_non_numeric_keys() {
    let (resolver, events) = resolver();

    let response = resolver
        .resolve(json!({
            "type": "query",
            "path": "hello,hello",
            "input": {"0": 1, "one": 2},
            "isBatchCall": true
        }))
        .await;

    let body = to_json(&response);
    assert!(body.is_object());
    assert_eq!(body["error"]["data"]["code"], "BAD_REQUEST");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("keys need to be numbers"));
    assert_eq!(events.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_batch_with_null_or_array_input() {
    for input in [Value::Null, json!([1, 2])] {
        let (resolver, _) = resolver();

        let response = resolver
            .resolve(json!({
                "type": "query",
                "path": "hello,hello",
                "input": input,
                "isBatchCall": true
            }))
            .await;

        let body = to_json(&response);
        assert!(body.is_object());
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("needs to be an object"));
    }
}

#[tokio::test]
async fn test_transformer_failure_aborts_whole_batch() {
    let reject_two = Transformer::new(
        from_fns(Ok, |value: Value| {
            if value == json!(2) {
                Err(Error::Serialization("cannot read 2".into()))
            } else {
                Ok(value)
            }
        }),
        IdentityTransformer,
    );
    let (resolver, events) = resolver_with(router().with_transformer(reject_two), true);

    let response = resolver
        .resolve(json!({
            "type": "query",
            "path": "hello,hello,hello",
            "input": {"0": 0, "1": 1, "2": 2},
            "isBatchCall": true
        }))
        .await;

    let body = to_json(&response);
    assert!(body.is_object());
    assert_eq!(body["error"]["data"]["code"], "INTERNAL_SERVER_ERROR");
    let message = body["error"]["message"].as_str().unwrap();
    assert!(message.contains("[2]"));
    assert!(!message.contains("[0]"));
    assert_eq!(events.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_procedure_failure_is_per_call() {
    let (resolver, events) = resolver();

    let response = resolver
        .resolve(json!({
            "type": "query",
            "path": "picky,picky,picky",
            "input": {"0": 0, "1": 1, "2": 2},
            "isBatchCall": true
        }))
        .await;

    let body = to_json(&response);
    let envelopes = body.as_array().unwrap();
    assert_eq!(envelopes.len(), 3);
    assert_eq!(envelopes[0], json!({"result": {"data": 0}}));
    assert_eq!(envelopes[1]["error"]["data"]["code"], "CONFLICT");
    assert_eq!(envelopes[1]["error"]["data"]["path"], "picky");
    assert_eq!(envelopes[1]["error"]["code"], -32009);
    assert_eq!(envelopes[2], json!({"result": {"data": 2}}));

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(
        events[0],
        ("query".to_string(), Some("picky".to_string()), "one is taken".to_string(), true)
    );
}

#[tokio::test]
async fn test_typed_input_validation_is_per_call() {
    let (resolver, _) = resolver();

    let response = resolver
        .resolve(json!({
            "type": "query",
            "path": "greet,greet",
            "input": {"0": {"name": "ada"}, "1": {"nom": "bob"}},
            "isBatchCall": true
        }))
        .await;

    let body = to_json(&response);
    assert_eq!(body[0], json!({"result": {"data": "hi ada"}}));
    assert_eq!(body[1]["error"]["data"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_batching_disabled() {
    let (resolver, events) = resolver_with(router(), false);

    let response = resolver
        .resolve(json!({
            "type": "query",
            "path": "hello,hello",
            "input": {"0": 1, "1": 2},
            "isBatchCall": true
        }))
        .await;

    let body = to_json(&response);
    assert_eq!(body["error"]["data"]["code"], "INTERNAL_SERVER_ERROR");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("Batching is not enabled"));
    assert_eq!(events.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_single_call_allowed_when_batching_disabled() {
    let (resolver, _) = resolver_with(router(), false);

    let response = resolver
        .resolve(json!({"type": "mutation", "path": "save", "input": 5, "isBatchCall": false}))
        .await;

    assert_eq!(to_json(&response), json!({"result": {"data": {"saved": 5}}}));
}

#[tokio::test]
async fn test_subscription_not_supported() {
    for (path, batch, input) in [("hello", false, json!(null)), ("hello,hello", true, json!({"0": 1}))] {
        let (resolver, _) = resolver();

        let response = resolver
            .resolve(json!({
                "type": "subscription",
                "path": path,
                "input": input,
                "isBatchCall": batch
            }))
            .await;

        let body = to_json(&response);
        assert!(body.is_object());
        assert_eq!(body["error"]["data"]["code"], "METHOD_NOT_SUPPORTED");
        assert_eq!(body["error"]["data"]["httpStatus"], 405);
    }
}

#[tokio::test]
async fn test_context_factory_failure() {
    let events = Arc::new(Mutex::new(0));
    let sink = Arc::clone(&events);
    let resolver = Resolver::builder()
        .router(router())
        .context_factory(|_request: &InvocationRequest| async {
            Err::<(), _>(Error::Internal("session store unavailable".into()))
        })
        .on_error(move |event: &ErrorEvent<()>| {
            assert!(event.ctx.is_none());
            *sink.lock().unwrap() += 1;
        })
        .build()
        .unwrap();

    let response = resolver
        .resolve(json!({
            "type": "query",
            "path": "hello,hello",
            "input": {"0": 1, "1": 2},
            "isBatchCall": true
        }))
        .await;

    let body = to_json(&response);
    assert!(body.is_object());
    assert_eq!(body["error"]["data"]["code"], "INTERNAL_SERVER_ERROR");
    assert_eq!(body["error"]["message"], "session store unavailable");
    assert_eq!(*events.lock().unwrap(), 1);
}

#[tokio::test]
async fn test_context_factory_keeps_structured_code() {
    let resolver = Resolver::builder()
        .router(router())
        .context_factory(|request: &InvocationRequest| {
            let signed_in = request.context["accountId"].is_string();
            async move {
                if signed_in {
                    Ok(())
                } else {
                    Err(Error::from(RpcError::unauthorized("sign in first")))
                }
            }
        })
        .build()
        .unwrap();

    let response = resolver
        .resolve(json!({"type": "query", "path": "hello", "isBatchCall": false}))
        .await;
    let body = to_json(&response);
    assert_eq!(body["error"]["data"]["code"], "UNAUTHORIZED");
    assert_eq!(body["error"]["message"], "sign in first");

    let request = InvocationRequest::new(json!({"type": "query", "path": "hello", "isBatchCall": false}))
        .with_context(json!({"accountId": "a-1"}));
    let body = to_json(&resolver.handle(&request).await);
    assert_eq!(body, json!({"result": {"data": "hello null"}}));
}

#[tokio::test]
async fn test_invalid_type() {
    let (resolver, events) = resolver();

    let response = resolver
        .resolve(json!({"type": "fake-type", "path": "hello", "isBatchCall": false}))
        .await;

    let body = to_json(&response);
    assert_eq!(body["error"]["data"]["code"], "BAD_REQUEST");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("Invalid value \"fake-type\""));

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].0, "unknown");
    assert_eq!(events[0].1, None);
}

#[tokio::test]
async fn test_unknown_path_and_wrong_type() {
    let (resolver, _) = resolver();

    let response = resolver
        .resolve(json!({"type": "query", "path": "save", "isBatchCall": false}))
        .await;

    let body = to_json(&response);
    assert_eq!(body["error"]["data"]["code"], "NOT_FOUND");
    assert_eq!(body["error"]["message"], "No \"query\"-procedure on path \"save\"");
}

#[tokio::test]
async fn test_resolution_is_idempotent() {
    let (resolver, _) = resolver();
    let payload = json!({
        "type": "query",
        "path": "hello,picky",
        "input": {"0": "x", "1": 1},
        "isBatchCall": true
    });

    let first = resolver.resolve(payload.clone()).await;
    let second = resolver.resolve(payload).await;

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_panicking_procedure_is_isolated() {
    let (resolver, events) = resolver();

    let response = resolver
        .resolve(json!({
            "type": "query",
            "path": "hello,explode,hello",
            "input": {"0": 0, "2": 2},
            "isBatchCall": true
        }))
        .await;

    let body = to_json(&response);
    assert_eq!(body[0], json!({"result": {"data": "hello 0"}}));
    assert_eq!(body[1]["error"]["message"], "kaboom");
    assert_eq!(body[1]["error"]["data"]["code"], "INTERNAL_SERVER_ERROR");
    assert_eq!(body[2], json!({"result": {"data": "hello 2"}}));
    assert_eq!(events.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_output_transformer_wraps_data_and_errors() {
    let wrap = Transformer::new(
        IdentityTransformer,
        from_fns(|value| Ok(json!({ "json": value })), Ok),
    );
    let (resolver, _) = resolver_with(router().with_transformer(wrap), true);

    let response = resolver
        .resolve(json!({
            "type": "query",
            "path": "picky,picky",
            "input": {"0": 0, "1": 1},
            "isBatchCall": true
        }))
        .await;

    let body = to_json(&response);
    assert_eq!(body[0], json!({"result": {"data": {"json": 0}}}));
    assert_eq!(body[1]["error"]["json"]["data"]["code"], "CONFLICT");
}

#[tokio::test]
async fn test_error_formatter_applies_to_pipeline_and_calls() {
    let router = router().error_formatter(|mut shape, info| {
        shape.message = format!("[{}] {}", info.path.unwrap_or("?"), shape.message);
        shape
    });
    let (resolver, _) = resolver_with(router, true);

    let body = to_json(
        &resolver
            .resolve(json!({"type": "query", "path": "picky", "input": 1, "isBatchCall": false}))
            .await,
    );
    assert_eq!(body["error"]["message"], "[picky] one is taken");

    let body = to_json(&resolver.resolve(json!({"type": "query"})).await);
    assert!(body["error"]["message"].as_str().unwrap().starts_with("[?] "));
}

#[tokio::test]
async fn test_context_is_created_once_per_resolution() {
    let created = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&created);
    let resolver = Resolver::builder()
        .router(router())
        .context_factory(move |_request: &InvocationRequest| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, Error>(()) }
        })
        .build()
        .unwrap();

    resolver
        .resolve(json!({
            "type": "query",
            "path": "hello,picky,hello",
            "input": {"0": 0, "1": 1, "2": 2},
            "isBatchCall": true
        }))
        .await;
    assert_eq!(created.load(Ordering::SeqCst), 1);

    // Failures before step 4 never reach the factory.
    resolver
        .resolve(json!({
            "type": "query",
            "path": "hello,hello",
            "input": {"0": 0, "x": 1},
            "isBatchCall": true
        }))
        .await;
    resolver.resolve(json!({"type": "query"})).await;
    resolver
        .resolve(json!({"type": "subscription", "path": "hello", "isBatchCall": false}))
        .await;
    assert_eq!(created.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_panicking_context_factory_is_rejected() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let resolver = Resolver::builder()
        .router(router())
        .context_factory(|_request: &InvocationRequest| async {
            if true {
                panic!("auth svc down");
            }
            Ok::<_, Error>(())
        })
        .on_error(move |event: &ErrorEvent<()>| {
            sink.lock()
                .unwrap()
                .push((event.error.message.clone(), event.ctx.is_some()));
        })
        .build()
        .unwrap();

    let response = resolver
        .resolve(json!({
            "type": "query",
            "path": "hello,hello",
            "input": {"0": 1, "1": 2},
            "isBatchCall": true
        }))
        .await;

    let body = to_json(&response);
    assert!(body.is_object());
    assert_eq!(body["error"]["data"]["code"], "INTERNAL_SERVER_ERROR");
    assert_eq!(body["error"]["message"], "auth svc down");
    assert_eq!(
        *events.lock().unwrap(),
        vec![("auth svc down".to_string(), false)]
    );
}

#[tokio::test]
async fn test_panicking_input_transformer_is_rejected() {
    let panicking = Transformer::new(
        from_fns(Ok, |value: Value| {
            if value == json!("boom") {
                panic!("decoder blew up");
            }
            Ok(value)
        }),
        IdentityTransformer,
    );
    let (resolver, events) = resolver_with(router().with_transformer(panicking), true);

    let response = resolver
        .resolve(json!({"type": "query", "path": "hello", "input": "boom", "isBatchCall": false}))
        .await;

    let body = to_json(&response);
    assert_eq!(body["error"]["data"]["code"], "INTERNAL_SERVER_ERROR");
    assert_eq!(body["error"]["message"], "decoder blew up");
    assert_eq!(events.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_rejected_output_data_is_observed() {
    let reject_strings = Transformer::new(
        IdentityTransformer,
        from_fns(
            |value: Value| {
                if value.is_string() {
                    Err(Error::Serialization("cannot encode strings".into()))
                } else {
                    Ok(value)
                }
            },
            Ok,
        ),
    );
    let (resolver, events) = resolver_with(router().with_transformer(reject_strings), true);

    let response = resolver
        .resolve(json!({
            "type": "query",
            "path": "picky,hello",
            "input": {"0": 5, "1": 1},
            "isBatchCall": true
        }))
        .await;

    let body = to_json(&response);
    assert_eq!(body[0], json!({"result": {"data": 5}}));
    assert_eq!(body[1]["error"]["data"]["code"], "INTERNAL_SERVER_ERROR");
    assert_eq!(
        *events.lock().unwrap(),
        vec![(
            "query".to_string(),
            Some("hello".to_string()),
            "Serialization error: cannot encode strings".to_string(),
            true
        )]
    );
}

#[tokio::test]
async fn test_panicking_observer_does_not_break_resolution() {
    let resolver = Resolver::builder()
        .router(router())
        .context(())
        .on_error(|_event: &ErrorEvent<()>| panic!("observer blew up"))
        .build()
        .unwrap();

    let response = resolver
        .resolve(json!({
            "type": "query",
            "path": "picky,hello",
            "input": {"0": 1, "1": 2},
            "isBatchCall": true
        }))
        .await;

    let body = to_json(&response);
    assert_eq!(body[0]["error"]["data"]["code"], "CONFLICT");
    assert_eq!(body[1], json!({"result": {"data": "hello 2"}}));
}
