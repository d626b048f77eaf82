//! Call and response envelope types
//!
//! The shapes exchanged between a transport and the resolver:
//!
//! 1. **CallEnvelope**: one decoded client request (a single call or a batch)
//! 2. **ResponseEnvelope**: the answer for one procedure call
//! 3. **Response**: a single envelope, or an array of them for batch calls
//! 4. **ErrorShape**: the wire form of a failed call
//!
//! # Wire Format
//!
//! ```text
//! request:  {"type":"query","path":"a,b","input":{"0":1,"1":2},"isBatchCall":true}
//! success:  {"result":{"data":<value>}}
//! failure:  {"error":{"code":-32600,"message":"...","data":{"code":"BAD_REQUEST","httpStatus":400,"path":"a"}}}
//! ```

use crate::error::{ErrorCode, RpcError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// Kind of procedure call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcedureType {
    Query,
    Mutation,
    /// Decodes, but is always rejected by the resolver
    Subscription,
}

impl ProcedureType {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcedureType::Query => "query",
            ProcedureType::Mutation => "mutation",
            ProcedureType::Subscription => "subscription",
        }
    }

    /// Parse the wire literal; anything but the three literals is `None`
    pub fn from_literal(literal: &str) -> Option<Self> {
        match literal {
            "query" => Some(ProcedureType::Query),
            "mutation" => Some(ProcedureType::Mutation),
            "subscription" => Some(ProcedureType::Subscription),
            _ => None,
        }
    }
}

impl fmt::Display for ProcedureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One decoded client request
///
/// Built by [`crate::codec::decode_envelope`]. For batch calls `path` is a
/// comma-joined list and `input` an object keyed by call index.
///
/// # Examples
///
/// ```rust
/// use prow_core::{CallEnvelope, ProcedureType};
///
/// let single = CallEnvelope::single(ProcedureType::Query, "hello", None);
/// assert_eq!(single.paths(), vec!["hello"]);
///
/// let batch = CallEnvelope::batch(ProcedureType::Query, "a,b", serde_json::json!({"0": 1, "1": 2}));
/// assert_eq!(batch.paths(), vec!["a", "b"]);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallEnvelope {
    #[serde(rename = "type")]
    pub procedure_type: ProcedureType,
    pub path: String,
    /// Absent input is distinct from an explicit `null`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    pub is_batch_call: bool,
}

impl CallEnvelope {
    pub fn single(
        procedure_type: ProcedureType,
        path: impl Into<String>,
        input: Option<Value>,
    ) -> Self {
        Self {
            procedure_type,
            path: path.into(),
            input,
            is_batch_call: false,
        }
    }

    pub fn batch(procedure_type: ProcedureType, path: impl Into<String>, input: Value) -> Self {
        Self {
            procedure_type,
            path: path.into(),
            input: Some(input),
            is_batch_call: true,
        }
    }

    /// Procedure paths in call order
    pub fn paths(&self) -> Vec<&str> {
        if self.is_batch_call {
            self.path.split(',').collect()
        } else {
            vec![self.path.as_str()]
        }
    }
}

/// Payload of a successful call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultData {
    pub data: Value,
}

/// Answer for one procedure call
///
/// Generic over the error payload: the resolver assembles envelopes with an
/// [`ErrorShape`] and the output transformer turns them into plain values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseEnvelope<E = ErrorShape> {
    Result { result: ResultData },
    Error { error: E },
}

impl<E> ResponseEnvelope<E> {
    pub fn data(data: Value) -> Self {
        ResponseEnvelope::Result {
            result: ResultData { data },
        }
    }

    pub fn error(error: E) -> Self {
        ResponseEnvelope::Error { error }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ResponseEnvelope::Error { .. })
    }

    /// The success payload, if any
    pub fn result_data(&self) -> Option<&Value> {
        match self {
            ResponseEnvelope::Result { result } => Some(&result.data),
            ResponseEnvelope::Error { .. } => None,
        }
    }

    /// The error payload, if any
    pub fn error_payload(&self) -> Option<&E> {
        match self {
            ResponseEnvelope::Result { .. } => None,
            ResponseEnvelope::Error { error } => Some(error),
        }
    }
}

/// Whole answer to one call envelope
///
/// Serializes to an object for single calls and to an array for batch calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response<E = ErrorShape> {
    Batch(Vec<ResponseEnvelope<E>>),
    Single(ResponseEnvelope<E>),
}

impl<E> Response<E> {
    pub fn is_batch(&self) -> bool {
        matches!(self, Response::Batch(_))
    }

    /// Borrow the single envelope; `None` for batch responses
    pub fn as_single(&self) -> Option<&ResponseEnvelope<E>> {
        match self {
            Response::Single(envelope) => Some(envelope),
            Response::Batch(_) => None,
        }
    }

    /// Borrow the batch envelopes; `None` for single responses
    pub fn as_batch(&self) -> Option<&[ResponseEnvelope<E>]> {
        match self {
            Response::Batch(envelopes) => Some(envelopes),
            Response::Single(_) => None,
        }
    }

    /// Apply `f` to every envelope, keeping the single/batch form
    pub fn map<F, T>(self, mut f: F) -> Response<T>
    where
        F: FnMut(ResponseEnvelope<E>) -> ResponseEnvelope<T>,
    {
        match self {
            Response::Single(envelope) => Response::Single(f(envelope)),
            Response::Batch(envelopes) => Response::Batch(envelopes.into_iter().map(f).collect()),
        }
    }
}

/// Wire-ready error
///
/// ```rust
/// use prow_core::{ErrorShape, RpcError};
///
/// let shape = ErrorShape::from_error(&RpcError::bad_request("bad input"), Some("echo"));
/// assert_eq!(shape.code, -32600);
/// assert_eq!(shape.data.path.as_deref(), Some("echo"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorShape {
    /// Numeric code, see [`ErrorCode::json_rpc_code`]
    pub code: i32,
    pub message: String,
    pub data: ErrorShapeData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorShapeData {
    pub code: ErrorCode,
    pub http_status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl ErrorShape {
    /// Default shape for a normalized error
    pub fn from_error(error: &RpcError, path: Option<&str>) -> Self {
        Self {
            code: error.code.json_rpc_code(),
            message: error.message.clone(),
            data: ErrorShapeData {
                code: error.code,
                http_status: error.code.http_status(),
                path: path.map(str::to_string),
            },
        }
    }

    /// JSON form of the shape
    pub fn to_value(&self) -> Value {
        let mut data = json!({
            "code": self.data.code.as_str(),
            "httpStatus": self.data.http_status,
        });
        if let Some(path) = &self.data.path {
            data["path"] = Value::String(path.clone());
        }
        json!({
            "code": self.code,
            "message": self.message,
            "data": data,
        })
    }
}
