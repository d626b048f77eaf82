//! Host platform bridge
//!
//! The host delivers each invocation as a payload plus an opaque context
//! object (account, installation, license...). [`RequestHandler`] adapts a
//! [`Resolver`] to that shape, optionally reporting failures together with
//! the request that caused them.
//!
//! # Examples
//!
//! ```rust
//! use prow_server::{from_fn, InvocationRequest, RequestHandler, Resolver, Router};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let resolver = Resolver::builder()
//!     .router(Router::new().query(
//!         "ping",
//!         from_fn(|_input, _ctx: Arc<()>| async move { Ok(json!("pong")) }),
//!     ))
//!     .context(())
//!     .build()
//!     .unwrap();
//!
//! let handler = RequestHandler::new(resolver).on_error(|event, request| {
//!     eprintln!("{} failed for {}", event.type_name(), request.context);
//! });
//!
//! let text = handler
//!     .handle_text(r#"{"type":"query","path":"ping","isBatchCall":false}"#, json!({}))
//!     .await;
//! assert_eq!(text, r#"{"result":{"data":"pong"}}"#);
//! # }
//! ```

use crate::resolver::{notify, ErrorEvent, ErrorObserver, Resolver};
use crate::response::{pipeline_error, transform_response};
use prow_core::codec::{decode_payload, encode_response};
use prow_core::{Error, Response, RpcError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Sent when a response cannot be encoded at all
const ENCODE_FAILURE: &str = r#"{"error":{"code":-32603,"message":"Failed to encode response","data":{"code":"INTERNAL_SERVER_ERROR","httpStatus":500}}}"#;

/// One invocation as delivered by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationRequest {
    /// The raw call envelope
    pub payload: Value,
    /// Host-supplied invocation context, `null` when absent
    #[serde(default)]
    pub context: Value,
}

impl InvocationRequest {
    pub fn new(payload: Value) -> Self {
        Self {
            payload,
            context: Value::Null,
        }
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }
}

type RequestObserver<C> = Arc<dyn Fn(&ErrorEvent<C>, &InvocationRequest) + Send + Sync>;

/// Entry point registered with the host
pub struct RequestHandler<C> {
    resolver: Resolver<C>,
    on_error: Option<RequestObserver<C>>,
}

impl<C> Clone for RequestHandler<C> {
    fn clone(&self) -> Self {
        Self {
            resolver: self.resolver.clone(),
            on_error: self.on_error.clone(),
        }
    }
}

impl<C: Send + Sync + 'static> RequestHandler<C> {
    pub fn new(resolver: Resolver<C>) -> Self {
        Self {
            resolver,
            on_error: None,
        }
    }

    /// Observe failures together with the request they belong to
    ///
    /// Runs after the resolver's own observer, if any.
    pub fn on_error<F>(mut self, observer: F) -> Self
    where
        F: Fn(&ErrorEvent<C>, &InvocationRequest) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(observer));
        self
    }

    pub fn resolver(&self) -> &Resolver<C> {
        &self.resolver
    }

    pub async fn handle(&self, request: InvocationRequest) -> Response<Value> {
        match &self.on_error {
            Some(on_error) => {
                let observer: &ErrorObserver<'_, C> = &|event: &ErrorEvent<C>| on_error(event, &request);
                self.resolver.handle_observed(&request, Some(observer)).await
            }
            None => self.resolver.handle(&request).await,
        }
    }

    /// Resolve a JSON text payload into JSON response text
    ///
    /// Text that is not JSON gets a PARSE_ERROR envelope.
    pub async fn handle_text(&self, text: &str, context: Value) -> String {
        let response = match decode_payload(text) {
            Ok(payload) => {
                self.handle(InvocationRequest::new(payload).with_context(context))
                    .await
            }
            Err(error) => self.reject_unparsed(error, context),
        };

        encode_response(&response).unwrap_or_else(|error| {
            tracing::error!(error = %error, "failed to encode response");
            ENCODE_FAILURE.to_string()
        })
    }

    fn reject_unparsed(&self, error: Error, context: Value) -> Response<Value> {
        let error = RpcError::from(error);
        tracing::warn!(code = %error.code, error = %error, "payload is not valid JSON");

        let event = ErrorEvent {
            error: error.clone(),
            procedure_type: None,
            path: None,
            input: None,
            ctx: None,
        };
        let request = InvocationRequest::new(Value::Null).with_context(context);
        notify(self.resolver.on_error.as_deref(), &event);
        if let Some(on_error) = &self.on_error {
            let observer: &ErrorObserver<'_, C> = &|event: &ErrorEvent<C>| on_error(event, &request);
            notify(Some(observer), &event);
        }

        let registry = self.resolver.registry();
        let (response, _) = transform_response(pipeline_error(&error, None, registry), registry.transformer());
        response
    }
}
