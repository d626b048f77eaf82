//! Per-resolution context creation

use crate::bridge::InvocationRequest;
use async_trait::async_trait;
use prow_core::Result;
use std::future::Future;

/// Builds the context shared by every call of one resolution
///
/// Invoked once per envelope, after decoding, validation and input resolution
/// succeeded. A failure rejects the whole envelope; returning an
/// `Error::Rpc` keeps its code (e.g. UNAUTHORIZED), anything else is reported
/// as INTERNAL_SERVER_ERROR.
///
/// Async closures taking `&InvocationRequest` implement this trait:
///
/// ```rust
/// use prow_server::{ContextFactory, InvocationRequest};
///
/// struct Session {
///     user: Option<String>,
/// }
///
/// let factory = |request: &InvocationRequest| {
///     let user = request.context["accountId"].as_str().map(str::to_string);
///     async move { Ok::<_, prow_core::Error>(Session { user }) }
/// };
///
/// fn assert_factory<F: ContextFactory<Session>>(_: &F) {}
/// assert_factory(&factory);
/// ```
#[async_trait]
pub trait ContextFactory<C>: Send + Sync {
    async fn create_context(&self, request: &InvocationRequest) -> Result<C>;
}

#[async_trait]
impl<C, F, Fut> ContextFactory<C> for F
where
    F: Fn(&InvocationRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Result<C>> + Send,
    C: Send + 'static,
{
    async fn create_context(&self, request: &InvocationRequest) -> Result<C> {
        self(request).await
    }
}
