//! The procedure registry contract
//!
//! The resolver never looks inside a router. Everything it needs from the
//! application side goes through [`Registry`]: invoking a procedure by path,
//! shaping a normalized error for the wire, and the transformer to apply.
//! [`crate::Router`] is the in-process implementation.

use crate::transformer::Transformer;
use async_trait::async_trait;
use prow_core::{ErrorShape, ProcedureType, Result, RpcError};
use serde_json::Value;
use std::sync::Arc;

/// Procedure lookup, invocation and error shaping
#[async_trait]
pub trait Registry<C>: Send + Sync {
    /// Invoke the procedure registered under `path` for `procedure_type`
    ///
    /// # Errors
    ///
    /// `Error::ProcedureNotFound` when nothing of that type lives at `path`,
    /// otherwise whatever the procedure returns.
    async fn call_procedure(
        &self,
        path: &str,
        input: Option<Value>,
        ctx: Arc<C>,
        procedure_type: ProcedureType,
    ) -> Result<Value>;

    /// Turn a normalized error into its wire shape
    ///
    /// `procedure_type`, `input` and `ctx` are `None` when the failure happened
    /// before they were known.
    fn shape_error(
        &self,
        error: &RpcError,
        procedure_type: Option<ProcedureType>,
        path: Option<&str>,
        input: Option<&Value>,
        ctx: Option<&C>,
    ) -> ErrorShape {
        let _ = (procedure_type, input, ctx);
        ErrorShape::from_error(error, path)
    }

    /// Transformer applied to inputs and outgoing payloads
    fn transformer(&self) -> &Transformer;
}
