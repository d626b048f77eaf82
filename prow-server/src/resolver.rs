//! The resolution pipeline
//!
//! [`resolve_procedure_call`] takes one raw payload to a finished response:
//!
//! 1. decode the envelope
//! 2. validate it (batching flag, call type)
//! 3. resolve inputs per call index
//! 4. create the context
//! 5. dispatch every call concurrently
//! 6. assemble envelopes, shaping errors through the registry
//! 7. run payloads through the output transformer
//!
//! Steps 1-4 are fail-fast: the first failure becomes one scalar error
//! envelope, even for a batch. Step 5 cannot abort the resolution; each call
//! fails on its own. The pipeline never returns an error. Panics in the
//! context factory, transformers, error formatter or observers are caught
//! and handled like the error they stand in for.
//!
//! # Error Observer
//!
//! Every failure, pipeline or procedure, is reported once to the optional
//! observer as an [`ErrorEvent`] before it is shaped. Pipeline failures carry
//! no context; failures before decoding also carry no type, path or input.
//! Result data the output transformer rejects is reported after the call
//! settled, with the call's context.
//!
//! # Examples
//!
//! ```rust
//! use prow_server::{from_fn, InvocationRequest, Resolver, Router};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let router = Router::new()
//!     .query("hello", from_fn(|_input, _ctx: Arc<()>| async move { Ok(json!("world")) }));
//!
//! let resolver = Resolver::builder()
//!     .router(router)
//!     .context_factory(|_request: &InvocationRequest| async { Ok::<_, prow_core::Error>(()) })
//!     .build()
//!     .unwrap();
//!
//! let response = resolver
//!     .resolve(json!({"type": "query", "path": "hello", "isBatchCall": false}))
//!     .await;
//!
//! assert_eq!(serde_json::to_value(&response).unwrap(), json!({"result": {"data": "world"}}));
//! # }
//! ```

use crate::bridge::InvocationRequest;
use crate::builder::ResolverBuilder;
use crate::config::ResolverConfig;
use crate::context::ContextFactory;
use crate::dispatch::Dispatcher;
use crate::input::{resolve_inputs, ResolvedInputs};
use crate::metrics::{ErrorStage, ResolverMetrics};
use crate::registry::Registry;
use crate::response::{assemble, pipeline_error, transform_response, OutputFailures};
use crate::validate::validate_envelope;
use prow_core::codec::decode_envelope;
use futures::FutureExt;
use prow_core::{CallEnvelope, Error, ProcedureType, Response, RpcError};
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

/// Failure report handed to the error observer
pub struct ErrorEvent<C> {
    pub error: RpcError,
    /// `None` when the envelope could not be decoded
    pub procedure_type: Option<ProcedureType>,
    pub path: Option<String>,
    pub input: Option<Value>,
    /// `None` for failures before the context existed
    pub ctx: Option<Arc<C>>,
}

impl<C> ErrorEvent<C> {
    /// Call type as text, `"unknown"` when it was never decoded
    pub fn type_name(&self) -> &'static str {
        self.procedure_type
            .map(ProcedureType::as_str)
            .unwrap_or("unknown")
    }
}

/// Error observer callback, possibly borrowing from a scope `'o`
pub type ErrorObserver<'o, C> = dyn Fn(&ErrorEvent<C>) + Send + Sync + 'o;

/// Shared error observer, as stored by the builder
pub type OnError<C> = Arc<ErrorObserver<'static, C>>;

/// Hand `event` to `observer`; a panicking observer is logged and ignored
pub(crate) fn notify<C>(observer: Option<&ErrorObserver<'_, C>>, event: &ErrorEvent<C>) {
    let Some(observer) = observer else {
        return;
    };
    if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(|| observer(event))) {
        tracing::warn!(error = %Error::from_panic(panic), "error observer panicked");
    }
}

/// A failure that stopped the resolution before dispatch
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct CallError {
    pub error: Error,
    /// The decoded envelope, if decoding got that far
    pub envelope: Option<CallEnvelope>,
}

impl CallError {
    fn undecoded(error: Error) -> Self {
        Self {
            error,
            envelope: None,
        }
    }

    fn with_envelope(error: Error, envelope: &CallEnvelope) -> Self {
        Self {
            error,
            envelope: Some(envelope.clone()),
        }
    }
}

/// Collaborators and settings for one resolution
pub struct ResolveOptions<'a, C> {
    pub request: &'a InvocationRequest,
    pub registry: &'a dyn Registry<C>,
    pub context_factory: &'a dyn ContextFactory<C>,
    pub batching_enabled: bool,
    pub on_error: Option<&'a ErrorObserver<'a, C>>,
    pub metrics: Option<&'a ResolverMetrics>,
}

struct Prepared<C> {
    envelope: CallEnvelope,
    inputs: ResolvedInputs,
    ctx: Arc<C>,
}

/// Resolve one call envelope into its response
#[tracing::instrument(
    name = "resolve_procedure_call",
    skip_all,
    fields(path = tracing::field::Empty, procedure_type = tracing::field::Empty, batch = tracing::field::Empty)
)]
pub async fn resolve_procedure_call<C: Send + Sync + 'static>(
    options: ResolveOptions<'_, C>,
) -> Response<Value> {
    let started = Instant::now();

    let (response, outcome) = match prepare(&options).await {
        Ok(prepared) => (settle(&options, prepared).await, "ok"),
        Err(failure) => (reject(&options, failure), "rejected"),
    };

    if let Some(metrics) = options.metrics {
        metrics.record_resolution(outcome, started.elapsed().as_secs_f64());
    }

    response
}

async fn prepare<C>(options: &ResolveOptions<'_, C>) -> Result<Prepared<C>, CallError> {
    let envelope = decode_envelope(&options.request.payload).map_err(CallError::undecoded)?;

    validate_envelope(&envelope, options.batching_enabled)
        .map_err(|error| CallError::with_envelope(error, &envelope))?;

    let inputs = resolve_inputs(&envelope, options.registry.transformer())
        .map_err(|error| CallError::with_envelope(error, &envelope))?;

    let ctx = AssertUnwindSafe(options.context_factory.create_context(options.request))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(Error::from_panic(panic)))
        .map_err(|cause| CallError::with_envelope(Error::ContextCreation(Box::new(cause)), &envelope))?;

    Ok(Prepared {
        envelope,
        inputs,
        ctx: Arc::new(ctx),
    })
}

/// Dispatch, assemble and transform a prepared envelope
async fn settle<C: Send + Sync + 'static>(
    options: &ResolveOptions<'_, C>,
    prepared: Prepared<C>,
) -> Response<Value> {
    let span = tracing::Span::current();
    span.record("path", prepared.envelope.path.as_str());
    span.record("procedure_type", prepared.envelope.procedure_type.as_str());
    span.record("batch", prepared.envelope.is_batch_call);

    let calls = prepared.envelope.paths().len() as u64;
    if prepared.envelope.is_batch_call {
        if let Some(metrics) = options.metrics {
            metrics.record_batch(calls);
        }
    }

    let dispatcher = Dispatcher {
        registry: options.registry,
        on_error: options.on_error,
        metrics: options.metrics,
    };
    let outcomes = dispatcher
        .dispatch(&prepared.envelope, &prepared.inputs, &prepared.ctx)
        .await;

    tracing::debug!(
        calls,
        failed = outcomes.iter().filter(|outcome| outcome.is_error()).count() as u64,
        "procedure calls settled"
    );
    let response = assemble(&prepared.envelope, outcomes, options.registry, prepared.ctx.as_ref());

    let (response, failures) = transform_response(response, options.registry.transformer());
    report_output_failures(options, &prepared, failures);
    response
}

/// Count and observe result data the output transformer rejected
fn report_output_failures<C>(
    options: &ResolveOptions<'_, C>,
    prepared: &Prepared<C>,
    failures: OutputFailures,
) {
    if failures.is_empty() {
        return;
    }
    let paths = prepared.envelope.paths();
    for (index, error) in failures {
        if let Some(metrics) = options.metrics {
            metrics.record_error(error.code, ErrorStage::Output);
        }
        notify(
            options.on_error,
            &ErrorEvent {
                error,
                procedure_type: Some(prepared.envelope.procedure_type),
                path: paths.get(index).map(|path| path.to_string()),
                input: prepared.inputs.get(&index).cloned().flatten(),
                ctx: Some(Arc::clone(&prepared.ctx)),
            },
        );
    }
}

fn reject<C>(options: &ResolveOptions<'_, C>, failure: CallError) -> Response<Value> {
    let envelope = failure.envelope;
    let error = RpcError::from(failure.error);

    tracing::warn!(
        path = envelope.as_ref().map(|envelope| envelope.path.as_str()),
        procedure_type = envelope
            .as_ref()
            .map(|envelope| envelope.procedure_type.as_str())
            .unwrap_or("unknown"),
        code = %error.code,
        error = %error,
        "call envelope rejected"
    );

    if let Some(metrics) = options.metrics {
        metrics.record_error(error.code, ErrorStage::Pipeline);
    }

    notify(
        options.on_error,
        &ErrorEvent {
            error: error.clone(),
            procedure_type: envelope.as_ref().map(|envelope| envelope.procedure_type),
            path: envelope.as_ref().map(|envelope| envelope.path.clone()),
            input: envelope.as_ref().and_then(|envelope| envelope.input.clone()),
            ctx: None,
        },
    );

    // A pipeline error carries no result data, so nothing can fail here.
    let (response, _) = transform_response(
        pipeline_error(&error, envelope.as_ref(), options.registry),
        options.registry.transformer(),
    );
    response
}

/// A configured resolution pipeline
///
/// Cheap to clone; clones share the registry, context factory, observer and
/// metrics.
pub struct Resolver<C> {
    pub(crate) registry: Arc<dyn Registry<C>>,
    pub(crate) context_factory: Arc<dyn ContextFactory<C>>,
    pub(crate) config: ResolverConfig,
    pub(crate) on_error: Option<OnError<C>>,
    pub(crate) metrics: Option<Arc<ResolverMetrics>>,
}

impl<C> Clone for Resolver<C> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            context_factory: Arc::clone(&self.context_factory),
            config: self.config.clone(),
            on_error: self.on_error.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

impl<C: Send + Sync + 'static> Resolver<C> {
    pub fn builder() -> ResolverBuilder<C> {
        ResolverBuilder::new()
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn registry(&self) -> &dyn Registry<C> {
        self.registry.as_ref()
    }

    /// Resolve a raw payload with no transport context
    pub async fn resolve(&self, payload: Value) -> Response<Value> {
        self.handle(&InvocationRequest::new(payload)).await
    }

    /// Resolve a transport request
    pub async fn handle(&self, request: &InvocationRequest) -> Response<Value> {
        self.handle_observed(request, None).await
    }

    /// Resolve, reporting failures to `extra` as well as the configured observer
    pub(crate) async fn handle_observed(
        &self,
        request: &InvocationRequest,
        extra: Option<&ErrorObserver<'_, C>>,
    ) -> Response<Value> {
        let observer: &ErrorObserver<'_, C> = &|event: &ErrorEvent<C>| {
            notify(self.on_error.as_deref(), event);
            notify(extra, event);
        };
        let observed = self.on_error.is_some() || extra.is_some();

        resolve_procedure_call(ResolveOptions {
            request,
            registry: self.registry.as_ref(),
            context_factory: self.context_factory.as_ref(),
            batching_enabled: self.config.batching.enabled,
            on_error: observed.then_some(observer),
            metrics: self.metrics.as_deref(),
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::procedure::from_fn;
    use crate::router::Router;
    use prow_core::ErrorCode;
    use serde_json::json;
    use std::sync::Mutex;

    fn resolver() -> Resolver<()> {
        Resolver::builder()
            .router(Router::new().query(
                "hello",
                from_fn(|_input, _ctx: Arc<()>| async move { Ok(json!("world")) }),
            ))
            .context_factory(|_request: &InvocationRequest| async { Ok::<_, Error>(()) })
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_single_query() {
        let response = resolver()
            .resolve(json!({"type": "query", "path": "hello", "isBatchCall": false}))
            .await;
        assert_eq!(response.as_single().and_then(|e| e.result_data()), Some(&json!("world")));
    }

    #[tokio::test]
    async fn test_undecodable_payload_reports_unknown_type() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let resolver = Resolver::builder()
            .router(Router::<()>::new())
            .context_factory(|_request: &InvocationRequest| async { Ok::<_, Error>(()) })
            .on_error(move |event: &ErrorEvent<()>| {
                sink.lock()
                    .unwrap()
                    .push((event.type_name(), event.path.clone(), event.ctx.is_some()));
            })
            .build()
            .unwrap();

        let response = resolver.resolve(json!("not an envelope")).await;

        let error = response.as_single().and_then(|e| e.error_payload()).unwrap();
        assert_eq!(error["code"], ErrorCode::BadRequest.json_rpc_code());
        assert_eq!(*events.lock().unwrap(), vec![("unknown", None, false)]);
    }

    #[tokio::test]
    async fn test_extra_observer_sees_failures() {
        let resolver = resolver();
        let seen = Mutex::new(0);
        let extra = |_event: &ErrorEvent<()>| *seen.lock().unwrap() += 1;

        let request = InvocationRequest::new(json!({
            "type": "query", "path": "missing", "isBatchCall": false
        }));
        let response = resolver.handle_observed(&request, Some(&extra)).await;

        assert!(response.as_single().map(|e| e.is_error()).unwrap_or(false));
        assert_eq!(*seen.lock().unwrap(), 1);
    }

    #[test]
    fn test_call_error_displays_cause() {
        let failure = CallError::undecoded(Error::BatchKey);
        assert_eq!(
            failure.to_string(),
            "\"input\" object keys need to be numbers when doing a batch call"
        );
        assert!(failure.envelope.is_none());
    }
}
