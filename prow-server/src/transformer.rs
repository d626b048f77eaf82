//! Data transformers
//!
//! A transformer rewrites values at the edge of the resolver: inputs are
//! passed through the input side's `deserialize` before dispatch, outgoing
//! `data` and `error` payloads through the output side's `serialize`.
//! Both directions are fallible.
//!
//! ```rust
//! use prow_server::{from_fns, Transformer};
//! use serde_json::{json, Value};
//!
//! // Inputs arrive wrapped as {"json": ..}; outputs are wrapped the same way
//! let wrapping = from_fns(
//!     |value| Ok(json!({ "json": value })),
//!     |value: Value| {
//!         value
//!             .get("json")
//!             .cloned()
//!             .ok_or_else(|| prow_core::Error::InvalidInput("missing json key".into()))
//!     },
//! );
//! let transformer = Transformer::uniform(wrapping);
//!
//! assert_eq!(transformer.deserialize_input(json!({"json": 1})).unwrap(), json!(1));
//! assert_eq!(transformer.serialize_output(json!(1)).unwrap(), json!({"json": 1}));
//! ```

use prow_core::Result;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// One direction-agnostic value transformer
pub trait DataTransformer: Send + Sync {
    /// Prepare an outgoing value for the wire
    fn serialize(&self, value: Value) -> Result<Value>;

    /// Restore an incoming value from the wire
    fn deserialize(&self, value: Value) -> Result<Value>;
}

/// Leaves values untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTransformer;

impl DataTransformer for IdentityTransformer {
    fn serialize(&self, value: Value) -> Result<Value> {
        Ok(value)
    }

    fn deserialize(&self, value: Value) -> Result<Value> {
        Ok(value)
    }
}

/// Transformer built from a pair of functions, see [`from_fns`]
pub struct FnTransformer<S, D> {
    serialize: S,
    deserialize: D,
}

impl<S, D> DataTransformer for FnTransformer<S, D>
where
    S: Fn(Value) -> Result<Value> + Send + Sync,
    D: Fn(Value) -> Result<Value> + Send + Sync,
{
    fn serialize(&self, value: Value) -> Result<Value> {
        (self.serialize)(value)
    }

    fn deserialize(&self, value: Value) -> Result<Value> {
        (self.deserialize)(value)
    }
}

pub fn from_fns<S, D>(serialize: S, deserialize: D) -> FnTransformer<S, D>
where
    S: Fn(Value) -> Result<Value> + Send + Sync,
    D: Fn(Value) -> Result<Value> + Send + Sync,
{
    FnTransformer {
        serialize,
        deserialize,
    }
}

/// Input and output transformer pair used by a registry
#[derive(Clone)]
pub struct Transformer {
    input: Arc<dyn DataTransformer>,
    output: Arc<dyn DataTransformer>,
}

impl Transformer {
    /// Separate transformers per direction
    pub fn new(
        input: impl DataTransformer + 'static,
        output: impl DataTransformer + 'static,
    ) -> Self {
        Self {
            input: Arc::new(input),
            output: Arc::new(output),
        }
    }

    /// The same transformer in both directions
    pub fn uniform(transformer: impl DataTransformer + 'static) -> Self {
        let shared: Arc<dyn DataTransformer> = Arc::new(transformer);
        Self {
            input: Arc::clone(&shared),
            output: shared,
        }
    }

    pub fn identity() -> Self {
        Self::uniform(IdentityTransformer)
    }

    pub fn deserialize_input(&self, value: Value) -> Result<Value> {
        self.input.deserialize(value)
    }

    pub fn serialize_output(&self, value: Value) -> Result<Value> {
        self.output.serialize(value)
    }
}

impl Default for Transformer {
    fn default() -> Self {
        Self::identity()
    }
}

impl fmt::Debug for Transformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transformer").finish_non_exhaustive()
    }
}
