//! Procedural macros for prow
//!
//! # `#[procedure]`
//!
//! Turns an async function into a factory returning
//! `Box<dyn prow_server::Procedure<C>>`, ready for `Router::query` or
//! `Router::mutation`. Input deserialization and output serialization go
//! through `prow_server::from_typed_fn`, so a bad input fails that one call
//! with BAD_REQUEST.
//!
//! Accepted signatures:
//!
//! - `async fn name() -> Result<O>`
//! - `async fn name(input: I) -> Result<O>`
//! - `async fn name(input: I, ctx: Arc<C>) -> Result<O>`
//!
//! `I: Deserialize`, `O: Serialize`, and the error converts into
//! `prow_core::Error`. Without a context parameter the factory is generic
//! over the context type.
//!
//! # Examples
//!
//! ```ignore
//! use prow_core::Result;
//! use prow_macros::procedure;
//! use std::sync::Arc;
//!
//! #[derive(serde::Deserialize)]
//! struct AddParams {
//!     a: i32,
//!     b: i32,
//! }
//!
//! #[procedure]
//! async fn add(params: AddParams) -> Result<i32> {
//!     Ok(params.a + params.b)
//! }
//!
//! #[procedure]
//! async fn whoami(_input: (), ctx: Arc<Session>) -> Result<Option<String>> {
//!     Ok(ctx.user.clone())
//! }
//!
//! let router = Router::<Session>::new()
//!     .query("add", add())
//!     .query("whoami", whoami());
//! ```

mod procedure;

use proc_macro::TokenStream;
use syn::{parse_macro_input, ItemFn};

/// Attribute macro for defining procedures
///
/// Keeps the function's visibility and attributes (doc comments, `cfg`).
/// Fails to compile on non-async functions, methods, generic functions and
/// functions with more than two parameters or a context parameter that is
/// not an `Arc`.
#[proc_macro_attribute]
pub fn procedure(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let input_fn = parse_macro_input!(item as ItemFn);
    procedure::expand(input_fn)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}
