//! Cross-field checks on a decoded envelope

use prow_core::{CallEnvelope, Error, ProcedureType, Result};

/// Reject envelopes this server will not serve
///
/// Checked in order: a batch call while batching is off
/// (`Error::BatchingDisabled`), then a subscription call
/// (`Error::UnsupportedOperation`).
pub fn validate_envelope(envelope: &CallEnvelope, batching_enabled: bool) -> Result<()> {
    if envelope.is_batch_call && !batching_enabled {
        return Err(Error::BatchingDisabled);
    }
    if envelope.procedure_type == ProcedureType::Subscription {
        return Err(Error::UnsupportedOperation(envelope.procedure_type));
    }
    Ok(())
}
