//! # aria-cache
//!
//! Content-addressed track cache: one WAV artifact plus one JSON sidecar
//! per track id, an in-memory index rebuilt by scanning the directory at
//! startup, and LRU eviction against size/count ceilings.
//!
//! Writes are atomic (temp file, fsync, rename) so concurrent daemons can
//! share a directory; readers treat a missing sidecar as a miss.
//!
//! ## Crate Position
//!
//! Depends on aria-core only. Depended on by the runtime and server.

#![deny(unsafe_code)]

pub mod store;

pub use store::{CacheStats, TrackCache};

/// Errors raised by cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Filesystem failure.
    #[error("cache io error: {0}")]
    Io(#[from] std::io::Error),

    /// Sidecar encode/decode failure.
    #[error("sidecar error: {0}")]
    Sidecar(String),

    /// Commit called without a staged artifact.
    #[error("no staged artifact for {0}")]
    NotStaged(String),
}
