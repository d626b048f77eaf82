//! Input resolution
//!
//! Turns the envelope's `input` into one input per call index:
//!
//! - single call: the (transformed) input under index 0, or no input
//! - batch call: an object keyed by index; every key must be a non-negative
//!   integer and every value is transformed on its own
//!
//! A value that fails transformation aborts the whole batch, listing every
//! failing key. Per-procedure input validation happens later, inside each
//! call, and only fails that call.

use crate::transformer::Transformer;
use prow_core::codec::parse_batch_index;
use prow_core::{CallEnvelope, Error, Result};
use serde_json::Value;
use std::collections::BTreeMap;

/// Call index -> input; a missing index means the call has no input
pub type ResolvedInputs = BTreeMap<usize, Option<Value>>;

/// Split and deserialize the envelope's input
///
/// # Errors
///
/// - `Error::BatchInputShape`: batch input absent, null, array or scalar
/// - `Error::BatchKey`: a batch key is not a non-negative integer
/// - `Error::BatchDeserialization`: one or more batch values failed the
///   transformer
/// - single calls: the transformer's error, unchanged
///
/// A panicking transformer counts as a failed value (`Error::Panic`).
pub fn resolve_inputs(envelope: &CallEnvelope, transformer: &Transformer) -> Result<ResolvedInputs> {
    if !envelope.is_batch_call {
        let input = envelope
            .input
            .clone()
            .map(|input| Error::catch_panic(|| transformer.deserialize_input(input)))
            .transpose()?;
        return Ok(BTreeMap::from([(0, input)]));
    }

    let entries = match &envelope.input {
        Some(Value::Object(entries)) => entries,
        _ => return Err(Error::BatchInputShape),
    };

    let mut keyed = Vec::with_capacity(entries.len());
    for (key, value) in entries {
        let index = parse_batch_index(key).ok_or(Error::BatchKey)?;
        keyed.push((key, index, value));
    }

    let mut inputs = ResolvedInputs::new();
    let mut failures = Vec::new();
    for (key, index, value) in keyed {
        match Error::catch_panic(|| transformer.deserialize_input(value.clone())) {
            Ok(input) => {
                inputs.insert(index, Some(input));
            }
            Err(cause) => failures.push((key.clone(), cause)),
        }
    }

    if !failures.is_empty() {
        return Err(Error::BatchDeserialization { failures });
    }
    Ok(inputs)
}
