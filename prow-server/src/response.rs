//! Response assembly and output transformation
//!
//! Outcomes become envelopes first (`{result:{data}}` or `{error:<shape>}`),
//! then every payload goes through the output transformer. Single calls give
//! a single envelope, batch calls an array in path order.
//!
//! A panicking error formatter or transformer is treated like a failing one.

use crate::dispatch::CallOutcome;
use crate::registry::Registry;
use crate::transformer::Transformer;
use prow_core::{
    CallEnvelope, Error, ErrorShape, ProcedureType, Response, ResponseEnvelope, RpcError,
};
use serde_json::Value;

/// Result data the output transformer rejected, by call index
pub type OutputFailures = Vec<(usize, RpcError)>;

/// Build the response for dispatched outcomes
///
/// Error outcomes are shaped by the registry with the call's type, path,
/// input and context.
pub fn assemble<C>(
    envelope: &CallEnvelope,
    outcomes: Vec<CallOutcome>,
    registry: &dyn Registry<C>,
    ctx: &C,
) -> Response {
    let procedure_type = envelope.procedure_type;
    let mut envelopes: Vec<ResponseEnvelope> = outcomes
        .into_iter()
        .map(|outcome| outcome_envelope(outcome, procedure_type, registry, ctx))
        .collect();

    if !envelope.is_batch_call && envelopes.len() == 1 {
        if let Some(single) = envelopes.pop() {
            return Response::Single(single);
        }
    }
    Response::Batch(envelopes)
}

fn outcome_envelope<C>(
    outcome: CallOutcome,
    procedure_type: ProcedureType,
    registry: &dyn Registry<C>,
    ctx: &C,
) -> ResponseEnvelope {
    match outcome {
        CallOutcome::Data { data, .. } => ResponseEnvelope::data(data),
        CallOutcome::Error { path, input, error } => ResponseEnvelope::error(shape_error(
            registry,
            &error,
            Some(procedure_type),
            Some(&path),
            input.as_ref(),
            Some(ctx),
        )),
    }
}

/// `registry.shape_error`, falling back to the default shape on panic
fn shape_error<C>(
    registry: &dyn Registry<C>,
    error: &RpcError,
    procedure_type: Option<ProcedureType>,
    path: Option<&str>,
    input: Option<&Value>,
    ctx: Option<&C>,
) -> ErrorShape {
    Error::catch_panic(|| Ok(registry.shape_error(error, procedure_type, path, input, ctx)))
        .unwrap_or_else(|panic| {
            tracing::warn!(path, error = %panic, "error formatter panicked, sending default shape");
            ErrorShape::from_error(error, path)
        })
}

/// The single envelope for a failure that stopped the whole resolution
///
/// Never an array, even for batch envelopes. Shaped without context.
pub fn pipeline_error<C>(
    error: &RpcError,
    envelope: Option<&CallEnvelope>,
    registry: &dyn Registry<C>,
) -> Response {
    let shape = shape_error(
        registry,
        error,
        envelope.map(|envelope| envelope.procedure_type),
        envelope.map(|envelope| envelope.path.as_str()),
        envelope.and_then(|envelope| envelope.input.as_ref()),
        None,
    );
    Response::Single(ResponseEnvelope::error(shape))
}

/// Run every `data` and `error` payload through the output transformer
///
/// A `data` payload that fails becomes an INTERNAL_SERVER_ERROR envelope
/// with the default, untransformed shape, and is listed in the returned
/// failures under its envelope index. An `error` payload that fails is sent
/// untransformed and only logged.
pub fn transform_response(
    response: Response,
    transformer: &Transformer,
) -> (Response<Value>, OutputFailures) {
    let mut failures = OutputFailures::new();
    let mut index = 0;

    let response = response.map(|envelope| {
        let current = index;
        index += 1;
        match envelope {
            ResponseEnvelope::Result { result } => {
                match Error::catch_panic(|| transformer.serialize_output(result.data)) {
                    Ok(data) => ResponseEnvelope::data(data),
                    Err(cause) => {
                        tracing::warn!(index = current, error = %cause, "output transformer rejected result data");
                        let error = RpcError::from(cause);
                        let shape = ErrorShape::from_error(&error, None).to_value();
                        failures.push((current, error));
                        ResponseEnvelope::error(shape)
                    }
                }
            }
            ResponseEnvelope::Error { error } => {
                let raw = error.to_value();
                match Error::catch_panic(|| transformer.serialize_output(raw.clone())) {
                    Ok(transformed) => ResponseEnvelope::error(transformed),
                    Err(cause) => {
                        tracing::warn!(index = current, error = %cause, "output transformer rejected error shape");
                        ResponseEnvelope::error(raw)
                    }
                }
            }
        }
    });

    (response, failures)
}
