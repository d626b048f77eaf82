//! In-process procedure registry
//!
//! The router maps procedure paths to procedures and implements
//! [`Registry`], so it can be handed straight to a resolver.
//!
//! # Procedure Types
//!
//! Every path is registered as either a query or a mutation. A call only
//! reaches a procedure when its type matches; `query` on a mutation path
//! fails with NOT_FOUND exactly like an unknown path.
//!
//! # Nesting
//!
//! [`Router::merge`] mounts another router under a prefix, joining paths with
//! a dot (`"issue"` + `"get"` -> `"issue.get"`).
//!
//! # Examples
//!
//! ```rust
//! use prow_server::{from_fn, from_typed_fn, Router};
//! use std::sync::Arc;
//!
//! struct Ctx;
//!
//! let issues = Router::<Ctx>::new()
//!     .query("get", from_typed_fn(|id: u32, _ctx: Arc<Ctx>| async move { Ok(id) }))
//!     .mutation("close", from_fn(|_input, _ctx| async move { Ok(serde_json::json!(true)) }));
//!
//! let router = Router::new()
//!     .query("health", from_fn(|_input, _ctx: Arc<Ctx>| async move { Ok(serde_json::json!("ok")) }))
//!     .merge("issue", issues);
//!
//! assert!(router.has_procedure("issue.get"));
//! assert_eq!(router.paths(), vec!["health", "issue.close", "issue.get"]);
//! ```

use crate::middleware::{Middleware, MiddlewareChain, MiddlewareContext, SyncMiddleware};
use crate::procedure::Procedure;
use crate::registry::Registry;
use crate::transformer::Transformer;
use async_trait::async_trait;
use prow_core::{Error, ErrorShape, ProcedureType, Result, RpcError};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Everything known about a failure when its shape is formatted
pub struct ErrorContext<'a, C> {
    pub error: &'a RpcError,
    pub procedure_type: Option<ProcedureType>,
    pub path: Option<&'a str>,
    pub input: Option<&'a Value>,
    pub ctx: Option<&'a C>,
}

/// Rewrites the default error shape before it is sent
pub type ErrorFormatter<C> = Arc<dyn Fn(ErrorShape, &ErrorContext<'_, C>) -> ErrorShape + Send + Sync>;

struct RegisteredProcedure<C> {
    procedure_type: ProcedureType,
    procedure: Arc<dyn Procedure<C>>,
}

impl<C> Clone for RegisteredProcedure<C> {
    fn clone(&self) -> Self {
        Self {
            procedure_type: self.procedure_type,
            procedure: Arc::clone(&self.procedure),
        }
    }
}

/// Path -> procedure registry with middleware and error formatting
pub struct Router<C> {
    procedures: Arc<HashMap<String, RegisteredProcedure<C>>>,
    middleware_chain: MiddlewareChain<C>,
    error_formatter: Option<ErrorFormatter<C>>,
    transformer: Transformer,
}

impl<C: Send + Sync + 'static> Router<C> {
    pub fn new() -> Self {
        Self {
            procedures: Arc::new(HashMap::new()),
            middleware_chain: MiddlewareChain::new(),
            error_formatter: None,
            transformer: Transformer::identity(),
        }
    }

    /// Register a procedure, replacing any previous one at `path`
    pub fn register(
        &mut self,
        procedure_type: ProcedureType,
        path: impl Into<String>,
        procedure: Box<dyn Procedure<C>>,
    ) {
        let procedures = Arc::make_mut(&mut self.procedures);
        procedures.insert(
            path.into(),
            RegisteredProcedure {
                procedure_type,
                procedure: Arc::from(procedure),
            },
        );
    }

    pub fn query(mut self, path: impl Into<String>, procedure: Box<dyn Procedure<C>>) -> Self {
        self.register(ProcedureType::Query, path, procedure);
        self
    }

    pub fn mutation(mut self, path: impl Into<String>, procedure: Box<dyn Procedure<C>>) -> Self {
        self.register(ProcedureType::Mutation, path, procedure);
        self
    }

    /// Mount every procedure of `other` under `prefix.`
    ///
    /// Only the procedures move over; middleware, formatter and transformer of
    /// `other` are dropped in favor of this router's.
    pub fn merge(mut self, prefix: &str, other: Router<C>) -> Self {
        let procedures = Arc::make_mut(&mut self.procedures);
        for (path, registered) in other.procedures.iter() {
            let full_path = if prefix.is_empty() {
                path.clone()
            } else {
                format!("{}.{}", prefix, path)
            };
            procedures.insert(full_path, registered.clone());
        }
        self
    }

    pub fn use_middleware(mut self, middleware: Arc<dyn Middleware<C>>) -> Self {
        self.middleware_chain.add(middleware);
        self
    }

    pub fn use_sync_middleware<T: SyncMiddleware<C> + 'static>(mut self, middleware: T) -> Self {
        self.middleware_chain.add_sync(middleware);
        self
    }

    pub(crate) fn append_middleware(&mut self, chain: &MiddlewareChain<C>) {
        self.middleware_chain.extend(chain);
    }

    /// Customize the error shape of every failed call
    ///
    /// ```rust
    /// use prow_server::Router;
    ///
    /// let router = Router::<()>::new().error_formatter(|mut shape, info| {
    ///     if info.path.is_none() {
    ///         shape.message = format!("request rejected: {}", shape.message);
    ///     }
    ///     shape
    /// });
    /// ```
    pub fn error_formatter<F>(mut self, formatter: F) -> Self
    where
        F: Fn(ErrorShape, &ErrorContext<'_, C>) -> ErrorShape + Send + Sync + 'static,
    {
        self.error_formatter = Some(Arc::new(formatter));
        self
    }

    pub fn with_transformer(mut self, transformer: Transformer) -> Self {
        self.transformer = transformer;
        self
    }

    /// Procedure at `path` with its type
    pub fn get(&self, path: &str) -> Option<(ProcedureType, Arc<dyn Procedure<C>>)> {
        self.procedures
            .get(path)
            .map(|registered| (registered.procedure_type, Arc::clone(&registered.procedure)))
    }

    pub fn has_procedure(&self, path: &str) -> bool {
        self.procedures.contains_key(path)
    }

    /// Registered paths, sorted
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.procedures.keys().cloned().collect();
        paths.sort();
        paths
    }
}

impl<C: Send + Sync + 'static> Default for Router<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Clone for Router<C> {
    fn clone(&self) -> Self {
        Self {
            procedures: Arc::clone(&self.procedures),
            middleware_chain: self.middleware_chain.clone(),
            error_formatter: self.error_formatter.clone(),
            transformer: self.transformer.clone(),
        }
    }
}

#[async_trait]
impl<C: Send + Sync + 'static> Registry<C> for Router<C> {
    async fn call_procedure(
        &self,
        path: &str,
        input: Option<Value>,
        ctx: Arc<C>,
        procedure_type: ProcedureType,
    ) -> Result<Value> {
        let procedure = match self.get(path) {
            Some((registered_type, procedure)) if registered_type == procedure_type => procedure,
            _ => {
                return Err(Error::ProcedureNotFound {
                    procedure_type,
                    path: path.to_string(),
                })
            }
        };

        if self.middleware_chain.is_empty() {
            return procedure.call(input, ctx).await;
        }

        let call = MiddlewareContext::new(path, procedure_type, input, ctx);
        self.middleware_chain
            .execute(call, |call| async move { procedure.call(call.input, call.ctx).await })
            .await
    }

    fn shape_error(
        &self,
        error: &RpcError,
        procedure_type: Option<ProcedureType>,
        path: Option<&str>,
        input: Option<&Value>,
        ctx: Option<&C>,
    ) -> ErrorShape {
        let shape = ErrorShape::from_error(error, path);
        match &self.error_formatter {
            Some(formatter) => formatter(
                shape,
                &ErrorContext {
                    error,
                    procedure_type,
                    path,
                    input,
                    ctx,
                },
            ),
            None => shape,
        }
    }

    fn transformer(&self) -> &Transformer {
        &self.transformer
    }
}
