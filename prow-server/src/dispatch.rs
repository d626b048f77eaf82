//! Concurrent procedure dispatch
//!
//! Every path of an envelope is paired with the input at the same index and
//! invoked through the registry. All calls run concurrently on the current
//! task and are joined; none can cancel or fail another. A call that returns
//! an error or panics becomes an error outcome for its own index only.

use crate::input::ResolvedInputs;
use crate::metrics::{ErrorStage, ResolverMetrics};
use crate::registry::Registry;
use crate::resolver::{notify, ErrorEvent, ErrorObserver};
use futures::future::join_all;
use futures::FutureExt;
use prow_core::{CallEnvelope, Error, ProcedureType, RpcError};
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

/// Result of one dispatched call
#[derive(Debug, Clone)]
pub enum CallOutcome {
    Data {
        path: String,
        input: Option<Value>,
        data: Value,
    },
    Error {
        path: String,
        input: Option<Value>,
        error: RpcError,
    },
}

impl CallOutcome {
    pub fn path(&self) -> &str {
        match self {
            CallOutcome::Data { path, .. } | CallOutcome::Error { path, .. } => path,
        }
    }

    pub fn input(&self) -> Option<&Value> {
        match self {
            CallOutcome::Data { input, .. } | CallOutcome::Error { input, .. } => input.as_ref(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, CallOutcome::Error { .. })
    }
}

/// Metric label shared by every call to an unregistered path
const UNKNOWN_PATH: &str = "<unknown>";

/// Path label for call metrics
///
/// Unknown paths come from callers, so they are folded into one label to keep
/// the label set bounded.
fn metric_path<'p>(error: Option<&Error>, path: &'p str) -> &'p str {
    match error {
        Some(Error::ProcedureNotFound { .. }) => UNKNOWN_PATH,
        _ => path,
    }
}

/// Collaborators of one dispatch
pub struct Dispatcher<'a, C> {
    pub registry: &'a dyn Registry<C>,
    pub on_error: Option<&'a ErrorObserver<'a, C>>,
    pub metrics: Option<&'a ResolverMetrics>,
}

impl<'a, C: Send + Sync + 'static> Dispatcher<'a, C> {
    /// Invoke every call of `envelope`, returning outcomes in index order
    #[tracing::instrument(
        name = "dispatch",
        skip_all,
        fields(procedure_type = %envelope.procedure_type, calls = tracing::field::Empty)
    )]
    pub async fn dispatch(
        &self,
        envelope: &CallEnvelope,
        inputs: &ResolvedInputs,
        ctx: &Arc<C>,
    ) -> Vec<CallOutcome> {
        let paths = envelope.paths();
        tracing::Span::current().record("calls", paths.len() as u64);

        let calls = paths.into_iter().enumerate().map(|(index, path)| {
            let input = inputs.get(&index).cloned().flatten();
            self.invoke(envelope.procedure_type, path, input, Arc::clone(ctx))
        });

        join_all(calls).await
    }

    async fn invoke(
        &self,
        procedure_type: ProcedureType,
        path: &str,
        input: Option<Value>,
        ctx: Arc<C>,
    ) -> CallOutcome {
        let started = Instant::now();
        let call = self
            .registry
            .call_procedure(path, input.clone(), Arc::clone(&ctx), procedure_type);

        let result = match AssertUnwindSafe(call).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(Error::from_panic(panic)),
        };

        let elapsed = started.elapsed().as_secs_f64();
        match result {
            Ok(data) => {
                if let Some(metrics) = self.metrics {
                    metrics.record_call(path, "success", elapsed);
                }
                CallOutcome::Data {
                    path: path.to_string(),
                    input,
                    data,
                }
            }
            Err(error) => {
                let label = metric_path(Some(&error), path);
                let error = RpcError::from(error);
                tracing::debug!(
                    path,
                    procedure_type = %procedure_type,
                    code = %error.code,
                    error = %error,
                    "procedure call failed"
                );
                if let Some(metrics) = self.metrics {
                    metrics.record_call(label, "error", elapsed);
                    metrics.record_error(error.code, ErrorStage::Procedure);
                }
                notify(
                    self.on_error,
                    &ErrorEvent {
                        error: error.clone(),
                        procedure_type: Some(procedure_type),
                        path: Some(path.to_string()),
                        input: input.clone(),
                        ctx: Some(ctx),
                    },
                );
                CallOutcome::Error {
                    path: path.to_string(),
                    input,
                    error,
                }
            }
        }
    }
}
