//! # aria-runtime
//!
//! Job orchestration for the daemon:
//!
//! - **Queue**: bounded two-class priority FIFO ([`queue::BoundedQueue`])
//! - **Back-ends**: tagged dispatch over the two engines
//!   ([`backends::BackendHandle`], [`backends::BackendSet`])
//! - **Service**: admission, cache probe, cancellation, downloads,
//!   graceful drain ([`service::GenerationService`])
//! - **Worker**: the single task that runs inference, commits artifacts,
//!   and emits exactly one terminal notification per job
//!
//! ## Crate Position
//!
//! Depends on everything below the RPC layer. Depended on by aria-server
//! and the binary.

#![deny(unsafe_code)]

pub mod backends;
pub mod queue;
pub mod service;
mod worker;

pub use backends::{BackendHandle, BackendSet};
pub use queue::BoundedQueue;
pub use service::{
    CancelResult, DownloadStart, GenerationService, SubmitResult, SubmitStatus,
};
