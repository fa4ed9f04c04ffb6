//! # aria-models
//!
//! Model asset management and ONNX session plumbing:
//!
//! - **Manifests**: the required file set per back-end, with source URLs
//!   and typed on-disk paths ([`manifest`])
//! - **Fetcher**: resumable ranged-GET downloads with throttled progress
//!   ([`fetcher`])
//! - **Sessions**: `ort` session construction with execution-provider and
//!   thread selection ([`session`])
//! - **Tokenizer**: byte-pair tokenizer wrapper producing i64 ids and
//!   attention masks ([`tokenizer`])
//!
//! ## Crate Position
//!
//! Depends on aria-core and aria-settings. Depended on by the engine
//! crates and the runtime.

#![deny(unsafe_code)]

pub mod errors;
pub mod fetcher;
pub mod manifest;
pub mod session;
pub mod tensor;
pub mod tokenizer;

pub use errors::{ModelError, ResultExt};
pub use manifest::{AssetFile, BackendAssets};
pub use session::SessionConfig;
pub use tensor::{NamedInputs, TensorBuf};
pub use tokenizer::{TextEncoding, TextTokenizer};
