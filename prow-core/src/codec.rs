//! Decoding of untrusted call envelopes
//!
//! Everything here is pure validation over `serde_json::Value`:
//!
//! - **decode_envelope**: unknown payload -> [`CallEnvelope`], reporting every
//!   violated field at once
//! - **parse_batch_index**: batch input key -> call index
//! - **decode_payload / encode_response**: text framing for transports that
//!   carry raw JSON
//!
//! # Why not `#[derive(Deserialize)]`?
//!
//! serde stops at the first mismatch. Callers get a message naming every bad
//! field, so the envelope is checked field by field instead.
//!
//! # Examples
//!
//! ```rust
//! use prow_core::codec;
//! use serde_json::json;
//!
//! let envelope = codec::decode_envelope(&json!({
//!     "type": "query",
//!     "path": "hello",
//!     "isBatchCall": false,
//! })).unwrap();
//! assert_eq!(envelope.path, "hello");
//!
//! let error = codec::decode_envelope(&json!({"type": "fake-type", "path": 1})).unwrap_err();
//! assert!(error.to_string().contains("Invalid value \"fake-type\" supplied to type"));
//! ```

use crate::error::{Error, Result};
use crate::types::{CallEnvelope, ProcedureType, Response};
use serde::Serialize;
use serde_json::{Map, Value};

/// Decode an unknown payload into a call envelope
///
/// # Errors
///
/// `Error::EnvelopeDecode` listing every offending field when the payload is
/// not an object, `type` is not one of `query`/`mutation`/`subscription`,
/// `path` is not a string or `isBatchCall` is not a boolean. `input` is not
/// checked here.
pub fn decode_envelope(payload: &Value) -> Result<CallEnvelope> {
    let fields = match payload {
        Value::Object(fields) => fields,
        other => {
            return Err(Error::EnvelopeDecode(invalid_value(Some(other), "envelope")));
        }
    };

    let mut violations = Vec::new();

    let procedure_type = match fields.get("type") {
        Some(Value::String(literal)) => ProcedureType::from_literal(literal),
        _ => None,
    };
    if procedure_type.is_none() {
        violations.push(invalid_value(fields.get("type"), "type"));
    }

    let path = fields.get("path").and_then(Value::as_str);
    if path.is_none() {
        violations.push(invalid_value(fields.get("path"), "path"));
    }

    let is_batch_call = fields.get("isBatchCall").and_then(Value::as_bool);
    if is_batch_call.is_none() {
        violations.push(invalid_value(fields.get("isBatchCall"), "isBatchCall"));
    }

    match (procedure_type, path, is_batch_call) {
        (Some(procedure_type), Some(path), Some(is_batch_call)) if violations.is_empty() => {
            Ok(CallEnvelope {
                procedure_type,
                path: path.to_string(),
                input: input_of(fields),
                is_batch_call,
            })
        }
        _ => Err(Error::EnvelopeDecode(violations.join(", "))),
    }
}

fn input_of(fields: &Map<String, Value>) -> Option<Value> {
    fields.get("input").cloned()
}

fn invalid_value(value: Option<&Value>, field: &str) -> String {
    let rendered = value
        .map(Value::to_string)
        .unwrap_or_else(|| "undefined".to_string());
    format!("Invalid value {} supplied to {}", rendered, field)
}

/// Parse a batch input key into a call index
///
/// Accepts integer literals (`"1"`) and decimal literals whose fractional part
/// is all zeros (`"1.0"`, `"0.0"`, `"1."`). Rejects negatives, non-zero
/// fractions, exponents, whitespace, the empty string and anything else
/// non-numeric (`"NaN"`, `"Infinity"`).
///
/// Integers too large for `usize` are still valid keys and map to
/// `usize::MAX`, an index no call ever has.
///
/// ```rust
/// use prow_core::codec::parse_batch_index;
///
/// assert_eq!(parse_batch_index("1.0"), Some(1));
/// assert_eq!(parse_batch_index("1.1"), None);
/// assert_eq!(parse_batch_index("-1"), None);
/// assert_eq!(parse_batch_index("NaN"), None);
/// ```
pub fn parse_batch_index(key: &str) -> Option<usize> {
    let (whole, fraction) = match key.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (key, ""),
    };

    let digits_only = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    if !digits_only(whole) || !digits_only(fraction) {
        return None;
    }
    if fraction.bytes().any(|b| b != b'0') {
        return None;
    }
    if whole.is_empty() {
        return Some(0);
    }
    // Only overflow can fail here; such an index never matches a path.
    Some(whole.parse::<usize>().unwrap_or(usize::MAX))
}

/// Parse transport text into a raw payload
///
/// # Errors
///
/// `Error::Parse` when the text is not valid JSON.
pub fn decode_payload(text: &str) -> Result<Value> {
    serde_json::from_str(text).map_err(|e| Error::Parse(e.to_string()))
}

/// Encode a response (single object or batch array) to JSON text
pub fn encode_response<E: Serialize>(response: &Response<E>) -> Result<String> {
    serde_json::to_string(response).map_err(|e| Error::Serialization(e.to_string()))
}
