//! PROW - procedure-call resolution over a host bridge
//!
//! This is the convenience crate that re-exports all PROW sub-crates.
//!
//! # Architecture
//!
//! PROW is organized into modular crates:
//!
//! - **prow-core**: Envelope and response types, error taxonomy, codec,
//!   observability
//! - **prow-server**: Resolution pipeline, router, middleware, bridge handler
//! - **prow-macros**: The `#[procedure]` attribute macro
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use prow::server::{from_typed_fn, InvocationRequest, RequestHandler};
//! use prow::{Resolver, Router};
//! use serde::Deserialize;
//! use std::sync::Arc;
//!
//! #[derive(Deserialize)]
//! struct AddParams { a: i32, b: i32 }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let router = Router::new()
//!         .query("add", from_typed_fn(|p: AddParams, _ctx: Arc<()>| async move {
//!             Ok(p.a + p.b)
//!         }));
//!
//!     let handler = RequestHandler::new(
//!         Resolver::builder().router(router).context(()).build()?,
//!     );
//!
//!     let text = handler
//!         .handle_text(
//!             r#"{"type":"query","path":"add","input":{"a":5,"b":3},"isBatchCall":false}"#,
//!             serde_json::Value::Null,
//!         )
//!         .await;
//!     println!("{}", text);
//!     Ok(())
//! }
//! ```

// Re-export all public APIs from sub-crates
pub use prow_core as core;
pub use prow_macros as macros;
pub use prow_server as server;

pub use prow_macros::procedure;
pub use prow_server::{RequestHandler, Resolver, Router};
