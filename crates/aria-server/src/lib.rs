//! # aria-server
//!
//! Line-delimited JSON-RPC 2.0 over the process's stdin/stdout:
//!
//! - **Types**: strict JSON-RPC request/response/notification shapes
//!   ([`types`])
//! - **Errors**: reserved protocol codes plus the stable application
//!   taxonomy ([`errors`])
//! - **Registry**: `MethodHandler` trait and name-based dispatch
//!   ([`registry`])
//! - **Handlers**: the daemon's eight methods ([`handlers`])
//! - **Framing**: one reader, one serialized writer, notification pump
//!   ([`stdio`])
//!
//! Stderr carries human-readable logs only; stdout is protocol.
//!
//! ## Crate Position
//!
//! Depends on aria-runtime and the foundation crates. Depended on by the
//! binary.

#![deny(unsafe_code)]

pub mod context;
pub mod errors;
pub mod handlers;
pub mod registry;
pub mod stdio;
pub mod types;

pub use context::RpcContext;
pub use errors::RpcError;
pub use registry::{MethodHandler, MethodRegistry};
pub use stdio::run;
