//! Call envelopes, errors and codec for prow
//!
//! prow resolves remote procedure calls carried in a transport-agnostic JSON
//! envelope. This crate holds the pieces every layer shares:
//!
//! - **Types**: call envelopes, response envelopes and the wire error shape
//! - **Codec**: envelope decoding, batch key parsing, text framing
//! - **Error handling**: the failure taxonomy and its normalized wire form
//! - **Observability**: tracing subscriber and OpenTelemetry setup
//!
//! The resolution pipeline itself lives in `prow-server`.
//!
//! # Example
//!
//! ```rust
//! use prow_core::{codec, ProcedureType};
//!
//! let payload = codec::decode_payload(
//!     r#"{"type":"query","path":"a,b","input":{"0":1,"1":2},"isBatchCall":true}"#,
//! ).unwrap();
//! let envelope = codec::decode_envelope(&payload).unwrap();
//!
//! assert_eq!(envelope.procedure_type, ProcedureType::Query);
//! assert_eq!(envelope.paths(), vec!["a", "b"]);
//! ```

pub mod codec;
pub mod error;
pub mod observability;
pub mod types;

pub use error::{Error, ErrorCode, Result, RpcError};
pub use observability::{init_observability, shutdown_observability, ObservabilityConfig};
pub use types::{
    CallEnvelope, ErrorShape, ErrorShapeData, ProcedureType, Response, ResponseEnvelope,
    ResultData,
};
