//! Procedure-call resolution for prow
//!
//! This crate takes one inbound call envelope (a single procedure call or a
//! batch of them) from a host platform, runs the matching procedures and
//! produces the response the caller expects.
//!
//! # Core Features
//!
//! - **Resolution pipeline**: decode, validate, resolve inputs, create
//!   context, dispatch, assemble, transform
//! - **Batching**: comma-joined paths with positional inputs, dispatched
//!   concurrently with per-call failure isolation
//! - **Router**: query/mutation registry with nesting and error formatting
//! - **Middleware**: pre/post hooks around every procedure call
//! - **Transformers**: pluggable input/output data transformation
//! - **Observability**: `tracing` spans and OpenTelemetry metrics
//!
//! # Quick Start
//!
//! ```rust
//! use prow_server::{from_typed_fn, InvocationRequest, RequestHandler, Resolver, Router};
//! use serde::Deserialize;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[derive(Deserialize)]
//! struct AddParams {
//!     a: i32,
//!     b: i32,
//! }
//!
//! struct Ctx;
//!
//! # #[tokio::main]
//! # async fn main() -> prow_core::Result<()> {
//! let router = Router::new().query(
//!     "add",
//!     from_typed_fn(|p: AddParams, _ctx: Arc<Ctx>| async move { Ok(p.a + p.b) }),
//! );
//!
//! let resolver = Resolver::builder()
//!     .router(router)
//!     .context_factory(|_request: &InvocationRequest| async { Ok::<_, prow_core::Error>(Ctx) })
//!     .build()?;
//!
//! let handler = RequestHandler::new(resolver);
//! let response = handler
//!     .handle(InvocationRequest::new(json!({
//!         "type": "query",
//!         "path": "add,add",
//!         "input": {"0": {"a": 1, "b": 2}, "1": {"a": 3, "b": 4}},
//!         "isBatchCall": true
//!     })))
//!     .await;
//!
//! assert_eq!(
//!     serde_json::to_value(&response).unwrap(),
//!     json!([{"result": {"data": 3}}, {"result": {"data": 7}}])
//! );
//! # Ok(())
//! # }
//! ```
//!
//! # Failure Granularity
//!
//! A malformed envelope, a disabled batch, a bad batch input or a failed
//! context creation rejects the whole call with one error envelope. A
//! procedure that fails (or panics) only fails its own slot of a batch.

pub mod bridge;
pub mod builder;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod input;
pub mod metrics;
pub mod middleware;
pub mod procedure;
pub mod registry;
pub mod resolver;
pub mod response;
pub mod router;
pub mod transformer;
pub mod validate;

pub use bridge::{InvocationRequest, RequestHandler};
pub use builder::ResolverBuilder;
pub use config::{BatchingConfig, ResolverConfig};
pub use context::ContextFactory;
pub use dispatch::{CallOutcome, Dispatcher};
pub use input::{resolve_inputs, ResolvedInputs};
pub use metrics::{ErrorStage, ResolverMetrics};
pub use middleware::{
    Middleware, MiddlewareAction, MiddlewareChain, MiddlewareContext, SyncMiddleware,
    TracingMiddleware,
};
pub use procedure::{from_fn, from_typed_fn, Procedure, ProcedureResult};
pub use registry::Registry;
pub use resolver::{
    resolve_procedure_call, CallError, ErrorEvent, ErrorObserver, OnError, ResolveOptions,
    Resolver,
};
pub use response::{assemble, pipeline_error, transform_response, OutputFailures};
pub use router::{ErrorContext, ErrorFormatter, Router};
pub use transformer::{from_fns, DataTransformer, FnTransformer, IdentityTransformer, Transformer};
pub use validate::validate_envelope;
