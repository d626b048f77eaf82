//! Error types for prow
//!
//! Two layers of errors live here:
//!
//! - **Error**: every failure kind the resolution pipeline or a procedure can
//!   produce (uses thiserror)
//! - **RpcError**: the normalized, structured error every `Error` is folded into
//!   before it is shaped for the wire
//!
//! # Error Codes
//!
//! Each normalized error carries a symbolic [`ErrorCode`] which maps to a
//! JSON-RPC style numeric code and an HTTP status:
//!
//! - `PARSE_ERROR`: `-32700`
//! - `BAD_REQUEST`: `-32600`
//! - `INTERNAL_SERVER_ERROR`: `-32603`
//! - `UNAUTHORIZED` .. `CLIENT_CLOSED_REQUEST`: `-32001` to `-32099`
//!
//! # Normalization
//!
//! `RpcError::from(Error)` keeps an `Error::Rpc` untouched and converts every
//! other variant into an `RpcError` with the variant's code, its display string
//! as message and the original error as `cause`.
//!
//! ```rust
//! use prow_core::{Error, ErrorCode, RpcError};
//!
//! let normalized = RpcError::from(Error::BatchKey);
//! assert_eq!(normalized.code, ErrorCode::BadRequest);
//! assert_eq!(normalized.code.json_rpc_code(), -32600);
//!
//! let structured = RpcError::new(ErrorCode::Unauthorized, "missing token");
//! let passed_through = RpcError::from(Error::Rpc(structured));
//! assert_eq!(passed_through.code, ErrorCode::Unauthorized);
//! ```

use crate::types::ProcedureType;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Result type for prow operations
pub type Result<T> = std::result::Result<T, Error>;

/// Symbolic error kind sent in `error.data.code`
///
/// Serialized in SCREAMING_SNAKE_CASE (`"BAD_REQUEST"`, `"NOT_FOUND"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ParseError,
    BadRequest,
    InternalServerError,
    Unauthorized,
    Forbidden,
    NotFound,
    MethodNotSupported,
    Timeout,
    Conflict,
    PreconditionFailed,
    PayloadTooLarge,
    UnprocessableContent,
    TooManyRequests,
    ClientClosedRequest,
}

impl ErrorCode {
    /// Numeric code sent in `error.code`
    pub fn json_rpc_code(self) -> i32 {
        match self {
            ErrorCode::ParseError => -32700,
            ErrorCode::BadRequest => -32600,
            ErrorCode::InternalServerError => -32603,
            ErrorCode::Unauthorized => -32001,
            ErrorCode::Forbidden => -32003,
            ErrorCode::NotFound => -32004,
            ErrorCode::MethodNotSupported => -32005,
            ErrorCode::Timeout => -32008,
            ErrorCode::Conflict => -32009,
            ErrorCode::PreconditionFailed => -32012,
            ErrorCode::PayloadTooLarge => -32013,
            ErrorCode::UnprocessableContent => -32022,
            ErrorCode::TooManyRequests => -32029,
            ErrorCode::ClientClosedRequest => -32099,
        }
    }

    /// HTTP status a transport may use for this kind of failure
    pub fn http_status(self) -> u16 {
        match self {
            ErrorCode::ParseError | ErrorCode::BadRequest => 400,
            ErrorCode::InternalServerError => 500,
            ErrorCode::Unauthorized => 401,
            ErrorCode::Forbidden => 403,
            ErrorCode::NotFound => 404,
            ErrorCode::MethodNotSupported => 405,
            ErrorCode::Timeout => 408,
            ErrorCode::Conflict => 409,
            ErrorCode::PreconditionFailed => 412,
            ErrorCode::PayloadTooLarge => 413,
            ErrorCode::UnprocessableContent => 422,
            ErrorCode::TooManyRequests => 429,
            ErrorCode::ClientClosedRequest => 499,
        }
    }

    /// The symbolic name as it appears on the wire
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::ParseError => "PARSE_ERROR",
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::InternalServerError => "INTERNAL_SERVER_ERROR",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::MethodNotSupported => "METHOD_NOT_SUPPORTED",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::Conflict => "CONFLICT",
            ErrorCode::PreconditionFailed => "PRECONDITION_FAILED",
            ErrorCode::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            ErrorCode::UnprocessableContent => "UNPROCESSABLE_CONTENT",
            ErrorCode::TooManyRequests => "TOO_MANY_REQUESTS",
            ErrorCode::ClientClosedRequest => "CLIENT_CLOSED_REQUEST",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every failure the resolution pipeline or a procedure can produce
///
/// # Error Categories
///
/// - **Pipeline errors** abort a whole resolution: EnvelopeDecode,
///   UnsupportedOperation, BatchingDisabled, ContextCreation, BatchInputShape,
///   BatchKey, BatchDeserialization
/// - **Procedure errors** stay inside one call slot: ProcedureNotFound,
///   InvalidInput, Internal, Serialization, Panic, Other, or a structured Rpc
/// - **Transport errors**: Parse
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// An already structured error, passed through normalization untouched
    #[error("{0}")]
    Rpc(#[from] RpcError),

    /// The raw payload is not a valid call envelope
    ///
    /// Holds every violated field, comma separated.
    #[error("Unexpected RPC payload: {0}")]
    EnvelopeDecode(String),

    /// The call type cannot be served by this engine
    #[error("{0} calls are not supported, subscriptions need a streaming transport")]
    UnsupportedOperation(ProcedureType),

    /// A batch call reached a server with batching switched off
    #[error("Batching is not enabled on the server")]
    BatchingDisabled,

    /// The context factory failed; the cause is kept as is
    #[error("{0}")]
    ContextCreation(Box<Error>),

    /// Batch input is missing, null, an array or a scalar
    #[error("\"input\" needs to be an object when doing a batch call")]
    BatchInputShape,

    /// A batch input key is not a non-negative integer string
    #[error("\"input\" object keys need to be numbers when doing a batch call")]
    BatchKey,

    /// One or more batch values failed input deserialization
    #[error(
        "Batch input deserialization failed on the following inputs: {}",
        describe_failures(.failures)
    )]
    BatchDeserialization {
        /// Failing input keys, as sent, with their causes
        failures: Vec<(String, Error)>,
    },

    /// No procedure of the requested type is registered under the path
    #[error("No \"{procedure_type}\"-procedure on path \"{path}\"")]
    ProcedureNotFound {
        procedure_type: ProcedureType,
        path: String,
    },

    /// A procedure rejected its input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Converting between Rust types and JSON values failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// An unexpected failure with a plain message
    #[error("{0}")]
    Internal(String),

    /// A procedure panicked; holds the panic message
    #[error("{0}")]
    Panic(String),

    /// Any foreign error type raised by procedure code
    #[error("{0}")]
    Other(Arc<dyn std::error::Error + Send + Sync>),

    /// Transport text is not valid JSON
    #[error("Parse error: {0}")]
    Parse(String),
}

impl Error {
    /// Wrap a foreign error
    pub fn other(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Error::Other(Arc::new(error))
    }

    /// Coerce a caught panic payload into an error
    ///
    /// `&str` and `String` payloads become the message; anything else is
    /// reported as "Unknown error".
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = match payload.downcast::<String>() {
            Ok(message) => *message,
            Err(payload) => match payload.downcast::<&'static str>() {
                Ok(message) => (*message).to_string(),
                Err(_) => "Unknown error".to_string(),
            },
        };
        Error::Panic(message)
    }

    /// Run `f`, reporting a panic inside it as `Error::Panic`
    pub fn catch_panic<T>(f: impl FnOnce() -> Result<T>) -> Result<T> {
        std::panic::catch_unwind(std::panic::AssertUnwindSafe(f))
            .unwrap_or_else(|payload| Err(Error::from_panic(payload)))
    }

    /// Symbolic code this error normalizes to
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Rpc(rpc) => rpc.code,
            Error::EnvelopeDecode(_) => ErrorCode::BadRequest,
            Error::UnsupportedOperation(_) => ErrorCode::MethodNotSupported,
            Error::BatchingDisabled => ErrorCode::InternalServerError,
            Error::ContextCreation(cause) => cause.code(),
            Error::BatchInputShape | Error::BatchKey => ErrorCode::BadRequest,
            Error::BatchDeserialization { .. } => ErrorCode::InternalServerError,
            Error::ProcedureNotFound { .. } => ErrorCode::NotFound,
            Error::InvalidInput(_) => ErrorCode::BadRequest,
            Error::Serialization(_)
            | Error::Internal(_)
            | Error::Panic(_)
            | Error::Other(_) => ErrorCode::InternalServerError,
            Error::Parse(_) => ErrorCode::ParseError,
        }
    }
}

fn describe_failures(failures: &[(String, Error)]) -> String {
    failures
        .iter()
        .map(|(key, error)| format!("[{}]: {}", key, error))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Normalized, structured error
///
/// Everything that goes out on the wire as an error envelope passes through
/// this type first. Procedures that want a specific wire code return
/// `Err(RpcError::new(..).into())`.
///
/// # Examples
///
/// ```rust
/// use prow_core::{ErrorCode, RpcError};
///
/// let error = RpcError::new(ErrorCode::Forbidden, "not your issue");
/// assert_eq!(error.to_string(), "not your issue");
/// assert_eq!(error.code.http_status(), 403);
/// ```
#[derive(Debug, Clone)]
pub struct RpcError {
    /// Symbolic kind, decides the numeric wire code
    pub code: ErrorCode,
    /// Human-readable message sent to the caller
    pub message: String,
    /// The error this one was normalized from, if any
    pub cause: Option<Arc<Error>>,
}

impl RpcError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            cause: None,
        }
    }

    /// Attach the underlying cause
    pub fn with_cause(mut self, cause: Error) -> Self {
        self.cause = Some(Arc::new(cause));
        self
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalServerError, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for RpcError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}

impl From<Error> for RpcError {
    fn from(error: Error) -> Self {
        match error {
            Error::Rpc(rpc) => rpc,
            // A factory that already raised a structured error (UNAUTHORIZED etc.)
            // keeps it.
            Error::ContextCreation(cause) if matches!(*cause, Error::Rpc(_)) => {
                RpcError::from(*cause)
            }
            other => RpcError {
                code: other.code(),
                message: other.to_string(),
                cause: Some(Arc::new(other)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_code_wire_values() {
        let codes = vec![
            (ErrorCode::ParseError, -32700, 400),
            (ErrorCode::BadRequest, -32600, 400),
            (ErrorCode::InternalServerError, -32603, 500),
            (ErrorCode::Unauthorized, -32001, 401),
            (ErrorCode::NotFound, -32004, 404),
            (ErrorCode::MethodNotSupported, -32005, 405),
            (ErrorCode::ClientClosedRequest, -32099, 499),
        ];

        for (code, json_rpc, http) in codes {
            assert_eq!(code.json_rpc_code(), json_rpc);
            assert_eq!(code.http_status(), http);
        }
    }

    #[test]
    fn test_error_code_serialization() {
        let serialized = serde_json::to_string(&ErrorCode::MethodNotSupported).unwrap();
        assert_eq!(serialized, "\"METHOD_NOT_SUPPORTED\"");

        let decoded: ErrorCode = serde_json::from_str("\"INTERNAL_SERVER_ERROR\"").unwrap();
        assert_eq!(decoded, ErrorCode::InternalServerError);
        assert_eq!(decoded.to_string(), "INTERNAL_SERVER_ERROR");
    }

    #[test]
    fn test_pipeline_error_codes() {
        assert_eq!(Error::EnvelopeDecode("x".into()).code(), ErrorCode::BadRequest);
        assert_eq!(
            Error::UnsupportedOperation(ProcedureType::Subscription).code(),
            ErrorCode::MethodNotSupported
        );
        assert_eq!(Error::BatchingDisabled.code(), ErrorCode::InternalServerError);
        assert_eq!(Error::BatchInputShape.code(), ErrorCode::BadRequest);
        assert_eq!(Error::BatchKey.code(), ErrorCode::BadRequest);
        assert_eq!(
            Error::BatchDeserialization { failures: vec![] }.code(),
            ErrorCode::InternalServerError
        );
    }

    #[test]
    fn test_normalize_keeps_structured_error() {
        let original = RpcError::unauthorized("no session");
        let normalized = RpcError::from(Error::Rpc(original));

        assert_eq!(normalized.code, ErrorCode::Unauthorized);
        assert_eq!(normalized.message, "no session");
        assert!(normalized.cause.is_none());
    }

    #[test]
    fn test_normalize_plain_error_keeps_cause() {
        let normalized = RpcError::from(Error::Internal("this should be caught".into()));

        assert_eq!(normalized.code, ErrorCode::InternalServerError);
        assert_eq!(normalized.message, "this should be caught");
        assert!(normalized.source().is_some());
    }

    #[test]
    fn test_normalize_context_creation() {
        let plain = RpcError::from(Error::ContextCreation(Box::new(Error::Internal(
            "Failed to create context".into(),
        ))));
        assert_eq!(plain.code, ErrorCode::InternalServerError);
        assert_eq!(plain.message, "Failed to create context");

        let structured = RpcError::from(Error::ContextCreation(Box::new(Error::Rpc(
            RpcError::unauthorized("token expired"),
        ))));
        assert_eq!(structured.code, ErrorCode::Unauthorized);
        assert_eq!(structured.message, "token expired");
    }

    #[test]
    fn test_batch_deserialization_message_lists_every_key() {
        let error = Error::BatchDeserialization {
            failures: vec![
                ("2".to_string(), Error::InvalidInput("bad value".into())),
                ("4".to_string(), Error::Internal("boom".into())),
            ],
        };
        let message = error.to_string();

        assert!(message.starts_with("Batch input deserialization failed"));
        assert!(message.contains("[2]: Invalid input: bad value"));
        assert!(message.contains("[4]: boom"));
    }

    #[test]
    fn test_procedure_not_found_message() {
        let error = Error::ProcedureNotFound {
            procedure_type: ProcedureType::Mutation,
            path: "user.delete".into(),
        };
        assert_eq!(
            error.to_string(),
            "No \"mutation\"-procedure on path \"user.delete\""
        );
        assert_eq!(error.code(), ErrorCode::NotFound);
    }

    #[test]
    fn test_from_panic_payloads() {
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned message"));
        assert_eq!(Error::from_panic(owned).to_string(), "owned message");

        let borrowed: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(Error::from_panic(borrowed).to_string(), "static message");

        let opaque: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(Error::from_panic(opaque).to_string(), "Unknown error");
    }

    #[test]
    fn test_catch_panic() {
        let caught = Error::catch_panic::<()>(|| panic!("transformer blew up")).unwrap_err();
        assert!(matches!(caught, Error::Panic(ref message) if message == "transformer blew up"));

        assert_eq!(Error::catch_panic(|| Ok(3)).unwrap(), 3);
        assert!(matches!(
            Error::catch_panic::<()>(|| Err(Error::BatchKey)),
            Err(Error::BatchKey)
        ));
    }

    #[test]
    fn test_other_wraps_foreign_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error = Error::other(io);

        assert_eq!(error.to_string(), "file not found");
        assert_eq!(error.code(), ErrorCode::InternalServerError);
    }
}
