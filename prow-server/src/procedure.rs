//! Procedure trait and adapters
//!
//! A procedure is the unit of business logic the resolver dispatches to. It
//! takes the (already deserialized) call input and the shared per-resolution
//! context, and yields a JSON value.
//!
//! # Creating Procedures
//!
//! 1. **from_fn**: async closure over raw `Option<Value>` input
//! 2. **from_typed_fn**: async closure over a `Deserialize` input and a
//!    `Serialize` output
//! 3. **#[procedure]**: attribute macro from `prow-macros`
//!
//! # Input Validation
//!
//! `from_typed_fn` rejects input that does not fit its type with
//! `Error::InvalidInput` (BAD_REQUEST). That failure belongs to the one call
//! it happened in; sibling calls of a batch are unaffected.
//!
//! # Examples
//!
//! ```rust
//! use prow_server::{from_fn, from_typed_fn, Procedure};
//! use serde::Deserialize;
//! use std::sync::Arc;
//!
//! struct Ctx {
//!     user: String,
//! }
//!
//! let whoami = from_fn(|_input, ctx: Arc<Ctx>| async move {
//!     Ok(serde_json::json!(ctx.user))
//! });
//!
//! #[derive(Deserialize)]
//! struct Greet {
//!     name: String,
//! }
//!
//! let greet = from_typed_fn(|input: Greet, _ctx: Arc<Ctx>| async move {
//!     Ok(format!("hello {}", input.name))
//! });
//! ```

use prow_core::{Error, Result};
use serde_json::Value;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed future returned by every procedure
pub type ProcedureResult = Pin<Box<dyn Future<Output = Result<Value>> + Send>>;

/// A callable procedure over context type `C`
///
/// Usually built with [`from_fn`] or [`from_typed_fn`] rather than
/// implemented by hand.
pub trait Procedure<C>: Send + Sync {
    /// Invoke the procedure
    ///
    /// `input` is `None` when the call carried no input at all.
    fn call(&self, input: Option<Value>, ctx: Arc<C>) -> ProcedureResult;
}

/// Procedure backed by an async function
pub struct AsyncProcedure<F, C> {
    func: F,
    _context: PhantomData<fn() -> C>,
}

impl<F, C> AsyncProcedure<F, C> {
    pub fn new(func: F) -> Self {
        Self {
            func,
            _context: PhantomData,
        }
    }
}

impl<F, Fut, C> Procedure<C> for AsyncProcedure<F, C>
where
    F: Fn(Option<Value>, Arc<C>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
    C: Send + Sync + 'static,
{
    fn call(&self, input: Option<Value>, ctx: Arc<C>) -> ProcedureResult {
        Box::pin((self.func)(input, ctx))
    }
}

/// Create a procedure over raw JSON input
///
/// ```rust
/// use prow_server::from_fn;
/// use std::sync::Arc;
///
/// let echo = from_fn(|input, _ctx: Arc<()>| async move {
///     Ok(input.unwrap_or(serde_json::Value::Null))
/// });
/// ```
pub fn from_fn<C, F, Fut>(func: F) -> Box<dyn Procedure<C>>
where
    F: Fn(Option<Value>, Arc<C>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
    C: Send + Sync + 'static,
{
    Box::new(AsyncProcedure::new(func))
}

/// Create a procedure with typed input and output
///
/// # Errors
///
/// - input that does not deserialize into `I`: `Error::InvalidInput`
/// - output that does not serialize: `Error::Serialization`
/// - errors of `func` pass through unchanged
///
/// Missing input is deserialized from `null`, so `()` and `Option<T>` inputs
/// accept calls without input.
pub fn from_typed_fn<C, I, O, F, Fut>(func: F) -> Box<dyn Procedure<C>>
where
    I: serde::de::DeserializeOwned + Send + 'static,
    O: serde::Serialize + Send + 'static,
    F: Fn(I, Arc<C>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O>> + Send + 'static,
    C: Send + Sync + 'static,
{
    let func = Arc::new(func);

    from_fn(move |input: Option<Value>, ctx: Arc<C>| {
        let func = Arc::clone(&func);
        async move {
            let input: I = serde_json::from_value(input.unwrap_or(Value::Null))
                .map_err(|e| Error::InvalidInput(e.to_string()))?;

            let output = func(input, ctx).await?;

            serde_json::to_value(output).map_err(|e| Error::Serialization(e.to_string()))
        }
    })
}
