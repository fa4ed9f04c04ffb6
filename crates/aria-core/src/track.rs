//! Track metadata — the JSON sidecar record.
//!
//! A [`Track`] is written once on successful completion and never mutated
//! afterwards except for `last_accessed`, which feeds LRU eviction.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backend::BackendKind;
use crate::ids::TrackId;

/// Immutable metadata for a generated audio artifact.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Track {
    /// Content-addressed id (also the file stem).
    pub track_id: TrackId,
    /// Absolute path of the WAV artifact.
    pub path: PathBuf,
    /// Prompt that produced it.
    pub prompt: String,
    /// Actual rendered duration in seconds.
    pub duration_sec: f64,
    /// Sample rate of the artifact in Hz.
    pub sample_rate: u32,
    /// PRNG seed used.
    pub seed: u64,
    /// Producing back-end.
    pub backend: BackendKind,
    /// Model version at generation time.
    pub model_version: String,
    /// Wall-clock generation time in seconds.
    pub generation_time_sec: f64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last read timestamp (LRU key).
    pub last_accessed: DateTime<Utc>,
}

impl Track {
    /// Approximate on-disk size of the artifact in bytes (16-bit PCM mono).
    pub fn estimated_bytes(&self) -> u64 {
        (self.duration_sec * f64::from(self.sample_rate) * 2.0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track() -> Track {
        Track {
            track_id: TrackId::from_raw("aabbccddeeff0011"),
            path: PathBuf::from("/tmp/aria/tracks/aabbccddeeff0011.wav"),
            prompt: "lofi hip hop".into(),
            duration_sec: 10.0,
            sample_rate: 32_000,
            seed: 42,
            backend: BackendKind::MusicGen,
            model_version: "musicgen-small-1.0".into(),
            generation_time_sec: 34.5,
            created_at: Utc::now(),
            last_accessed: Utc::now(),
        }
    }

    #[test]
    fn sidecar_round_trip() {
        let t = track();
        let json = serde_json::to_string_pretty(&t).unwrap();
        let back: Track = serde_json::from_str(&json).unwrap();
        assert_eq!(back.track_id, t.track_id);
        assert_eq!(back.seed, 42);
        assert_eq!(back.backend, BackendKind::MusicGen);
        assert!((back.duration_sec - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn estimated_bytes_for_mono_pcm16() {
        // 10 s at 32 kHz, 2 bytes/sample
        assert_eq!(track().estimated_bytes(), 640_000);
    }
}
