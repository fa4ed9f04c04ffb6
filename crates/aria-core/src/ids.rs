//! Branded ID newtypes.
//!
//! A [`TrackId`] is the content address of a generated artifact: the first
//! 16 hex characters of the SHA-256 over the generation tuple. Two requests
//! with the same tuple always map to the same track. A [`JobId`] is a fresh
//! identity per submission; re-generating a cached track gets a new job id
//! but the same track id.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::backend::BackendKind;

/// Content-addressed track identifier (16 lowercase hex chars).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(String);

impl TrackId {
    /// Derive the track id from the generation content tuple.
    ///
    /// Fields are newline-delimited before hashing so that no two distinct
    /// tuples can collide by concatenation (`"ab" + "c"` vs `"a" + "bc"`).
    pub fn derive(
        prompt: &str,
        seed: u64,
        duration_sec: u32,
        model_version: &str,
        backend: BackendKind,
    ) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(prompt.as_bytes());
        hasher.update(b"\n");
        hasher.update(seed.to_string().as_bytes());
        hasher.update(b"\n");
        hasher.update(duration_sec.to_string().as_bytes());
        hasher.update(b"\n");
        hasher.update(model_version.as_bytes());
        hasher.update(b"\n");
        hasher.update(backend.tag().as_bytes());
        let digest = hasher.finalize();
        let mut hex = String::with_capacity(16);
        for byte in &digest[..8] {
            hex.push_str(&format!("{byte:02x}"));
        }
        Self(hex)
    }

    /// Wrap an existing id string (e.g. parsed from a sidecar filename).
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique job identifier (`job_` + UUIDv7, time-ordered).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Mint a fresh job id.
    pub fn new() -> Self {
        Self(format!("job_{}", uuid::Uuid::now_v7()))
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
