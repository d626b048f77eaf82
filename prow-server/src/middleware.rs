//! Middleware around procedure invocation
//!
//! A router runs its middleware chain around every procedure it invokes.
//! Typical uses are authorization checks against the context, input
//! rewriting and per-procedure tracing.
//!
//! # Middleware Chain
//!
//! Middleware executes in registration order. Each one can:
//! - inspect the call (path, type, input, context) and rewrite its input
//! - stop the call with an error (e.g. `RpcError::unauthorized`)
//! - short-circuit with a value, skipping the procedure
//! - observe the result after the procedure ran (reverse order)
//! - leave metadata for the middleware after it
//!
//! # Examples
//!
//! ```rust
//! use prow_core::{Result, RpcError};
//! use prow_server::{MiddlewareAction, MiddlewareContext, Router, SyncMiddleware};
//! use serde_json::Value;
//!
//! struct Session {
//!     user: Option<String>,
//! }
//!
//! struct RequireUser;
//!
//! impl SyncMiddleware<Session> for RequireUser {
//!     fn pre_handle(&self, call: &mut MiddlewareContext<Session>) -> Result<MiddlewareAction> {
//!         match call.ctx.user {
//!             Some(_) => Ok(MiddlewareAction::Continue),
//!             None => Err(RpcError::unauthorized("sign in first").into()),
//!         }
//!     }
//!
//!     fn post_handle(&self, _call: &mut MiddlewareContext<Session>, _result: &Result<Value>) -> Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! let router = Router::<Session>::new().use_sync_middleware(RequireUser);
//! ```

use async_trait::async_trait;
use prow_core::{ProcedureType, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// What to do after a middleware's `pre_handle`
#[derive(Debug, Clone)]
pub enum MiddlewareAction {
    /// Go on to the next middleware or the procedure
    Continue,
    /// Skip the procedure and answer with this value
    ShortCircuit(Value),
}

/// One procedure call as seen by middleware
pub struct MiddlewareContext<C> {
    pub path: String,
    pub procedure_type: ProcedureType,
    /// Input handed to the procedure; middleware may replace it
    pub input: Option<Value>,
    pub ctx: Arc<C>,
    /// Scratch space shared along the chain
    pub metadata: HashMap<String, Value>,
}

impl<C> MiddlewareContext<C> {
    pub fn new(
        path: impl Into<String>,
        procedure_type: ProcedureType,
        input: Option<Value>,
        ctx: Arc<C>,
    ) -> Self {
        Self {
            path: path.into(),
            procedure_type,
            input,
            ctx,
            metadata: HashMap::new(),
        }
    }

    pub fn insert_metadata(&mut self, key: impl Into<String>, value: Value) {
        self.metadata.insert(key.into(), value);
    }

    pub fn get_metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }
}

impl<C> Clone for MiddlewareContext<C> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            procedure_type: self.procedure_type,
            input: self.input.clone(),
            ctx: Arc::clone(&self.ctx),
            metadata: self.metadata.clone(),
        }
    }
}

/// Async middleware
#[async_trait]
pub trait Middleware<C>: Send + Sync {
    async fn pre_handle(&self, call: &mut MiddlewareContext<C>) -> Result<MiddlewareAction>;

    async fn post_handle(&self, call: &mut MiddlewareContext<C>, result: &Result<Value>)
        -> Result<()>;
}

/// Middleware without async work
pub trait SyncMiddleware<C>: Send + Sync {
    fn pre_handle(&self, call: &mut MiddlewareContext<C>) -> Result<MiddlewareAction>;

    fn post_handle(&self, call: &mut MiddlewareContext<C>, result: &Result<Value>) -> Result<()>;
}

struct SyncMiddlewareAdapter<T> {
    inner: T,
}

#[async_trait]
impl<C, T> Middleware<C> for SyncMiddlewareAdapter<T>
where
    C: Send + Sync + 'static,
    T: SyncMiddleware<C> + 'static,
{
    async fn pre_handle(&self, call: &mut MiddlewareContext<C>) -> Result<MiddlewareAction> {
        self.inner.pre_handle(call)
    }

    async fn post_handle(
        &self,
        call: &mut MiddlewareContext<C>,
        result: &Result<Value>,
    ) -> Result<()> {
        self.inner.post_handle(call, result)
    }
}

/// Ordered list of middleware
pub struct MiddlewareChain<C> {
    middlewares: Vec<Arc<dyn Middleware<C>>>,
}

impl<C: Send + Sync + 'static> MiddlewareChain<C> {
    pub fn new() -> Self {
        Self {
            middlewares: Vec::new(),
        }
    }

    pub fn add(&mut self, middleware: Arc<dyn Middleware<C>>) {
        self.middlewares.push(middleware);
    }

    pub fn add_sync<T: SyncMiddleware<C> + 'static>(&mut self, middleware: T) {
        self.middlewares
            .push(Arc::new(SyncMiddlewareAdapter { inner: middleware }));
    }

    /// Append every middleware of `other`, keeping its order
    pub fn extend(&mut self, other: &MiddlewareChain<C>) {
        self.middlewares.extend(other.middlewares.iter().cloned());
    }

    /// Run the chain around `procedure`
    ///
    /// An error from any `pre_handle` stops the call with that error. Errors
    /// from `post_handle` are ignored so every middleware sees the result.
    pub async fn execute<F, Fut>(&self, mut call: MiddlewareContext<C>, procedure: F) -> Result<Value>
    where
        F: FnOnce(MiddlewareContext<C>) -> Fut + Send,
        Fut: Future<Output = Result<Value>> + Send,
    {
        for middleware in &self.middlewares {
            match middleware.pre_handle(&mut call).await? {
                MiddlewareAction::Continue => continue,
                MiddlewareAction::ShortCircuit(value) => return Ok(value),
            }
        }

        let result = procedure(call.clone()).await;

        for middleware in self.middlewares.iter().rev() {
            let _ = middleware.post_handle(&mut call, &result).await;
        }

        result
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }
}

impl<C: Send + Sync + 'static> Default for MiddlewareChain<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Clone for MiddlewareChain<C> {
    fn clone(&self) -> Self {
        Self {
            middlewares: self.middlewares.clone(),
        }
    }
}

/// Logs start and outcome of every procedure call
///
/// Records the start time in `metadata["started_at_us"]` and logs the elapsed
/// time with the outcome.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMiddleware;

impl TracingMiddleware {
    pub fn new() -> Self {
        Self
    }
}

const STARTED_AT: &str = "started_at_us";

fn now_micros() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_micros() as u64)
        .unwrap_or_default()
}

#[async_trait]
impl<C: Send + Sync + 'static> Middleware<C> for TracingMiddleware {
    async fn pre_handle(&self, call: &mut MiddlewareContext<C>) -> Result<MiddlewareAction> {
        tracing::debug!(
            path = %call.path,
            procedure_type = %call.procedure_type,
            has_input = call.input.is_some(),
            "procedure started"
        );
        call.insert_metadata(STARTED_AT, Value::from(now_micros()));
        Ok(MiddlewareAction::Continue)
    }

    async fn post_handle(
        &self,
        call: &mut MiddlewareContext<C>,
        result: &Result<Value>,
    ) -> Result<()> {
        let elapsed_us = call
            .get_metadata(STARTED_AT)
            .and_then(Value::as_u64)
            .map(|started| now_micros().saturating_sub(started));

        match result {
            Ok(_) => tracing::debug!(
                path = %call.path,
                procedure_type = %call.procedure_type,
                elapsed_us,
                "procedure completed"
            ),
            Err(e) => tracing::debug!(
                path = %call.path,
                procedure_type = %call.procedure_type,
                code = %e.code(),
                elapsed_us,
                error = %e,
                "procedure failed"
            ),
        }
        Ok(())
    }
}
