//! Back-end identity and status surface.
//!
//! Two back-ends exist today; dispatch is a plain tagged enum, not a plugin
//! registry.

use serde::{Deserialize, Serialize};

/// Generation back-end selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Autoregressive 4-codebook transformer + neural codec (32 kHz out).
    #[serde(rename = "musicgen")]
    MusicGen,
    /// UMT5 + latent diffusion transformer + vocoder (48 kHz out).
    AceStep,
}

impl BackendKind {
    /// Stable wire/cache tag.
    pub fn tag(self) -> &'static str {
        match self {
            Self::MusicGen => "musicgen",
            Self::AceStep => "ace_step",
        }
    }

    /// Human-readable name.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::MusicGen => "MusicGen (autoregressive)",
            Self::AceStep => "ACE-Step (diffusion)",
        }
    }

    /// Parse a wire tag.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "musicgen" => Some(Self::MusicGen),
            "ace_step" => Some(Self::AceStep),
            _ => None,
        }
    }

    /// Validation limits for this back-end.
    pub fn limits(self) -> BackendLimits {
        match self {
            Self::MusicGen => BackendLimits {
                prompt_max_chars: 1000,
                min_duration_sec: 5,
                max_duration_sec: 120,
            },
            Self::AceStep => BackendLimits {
                prompt_max_chars: 512,
                min_duration_sec: 5,
                max_duration_sec: 240,
            },
        }
    }

    /// Output sample rate of the finished artifact.
    pub fn output_sample_rate(self) -> u32 {
        match self {
            Self::MusicGen => 32_000,
            Self::AceStep => 48_000,
        }
    }
}

/// Per-back-end request validation bounds.
#[derive(Clone, Copy, Debug)]
pub struct BackendLimits {
    /// Maximum prompt length in characters.
    pub prompt_max_chars: usize,
    /// Minimum accepted duration.
    pub min_duration_sec: u32,
    /// Maximum accepted duration.
    pub max_duration_sec: u32,
}

/// Lifecycle status of a back-end's model assets and sessions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendStatus {
    /// Required model files are missing on disk.
    NotInstalled,
    /// An asset download is in flight.
    Downloading,
    /// Sessions are being created.
    Loading,
    /// All files present; sessions load lazily on first use.
    Ready,
    /// Unrecoverable asset or session error.
    Error,
}

/// Snapshot returned by `get_backends`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BackendDescriptor {
    /// Wire tag (`musicgen` / `ace_step`).
    #[serde(rename = "type")]
    pub kind: BackendKind,
    /// Human-readable name.
    pub name: String,
    /// Current lifecycle status.
    pub status: BackendStatus,
    /// Minimum accepted duration.
    pub min_duration_sec: u32,
    /// Maximum accepted duration.
    pub max_duration_sec: u32,
    /// Output sample rate in Hz.
    pub sample_rate: u32,
    /// Model version string (feeds the track-id tuple).
    pub model_version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_round_trip() {
        for kind in [BackendKind::MusicGen, BackendKind::AceStep] {
            assert_eq!(BackendKind::parse(kind.tag()), Some(kind));
        }
        assert_eq!(BackendKind::parse("nope"), None);
    }

    #[test]
    fn serde_uses_wire_tags() {
        assert_eq!(serde_json::to_string(&BackendKind::MusicGen).unwrap(), "\"musicgen\"");
        assert_eq!(serde_json::to_string(&BackendKind::AceStep).unwrap(), "\"ace_step\"");
        let k: BackendKind = serde_json::from_str("\"ace_step\"").unwrap();
        assert_eq!(k, BackendKind::AceStep);
    }

    #[test]
    fn limits_match_contract() {
        let ar = BackendKind::MusicGen.limits();
        assert_eq!((ar.min_duration_sec, ar.max_duration_sec), (5, 120));
        assert_eq!(ar.prompt_max_chars, 1000);

        let diff = BackendKind::AceStep.limits();
        assert_eq!((diff.min_duration_sec, diff.max_duration_sec), (5, 240));
        assert_eq!(diff.prompt_max_chars, 512);
    }

    #[test]
    fn sample_rates() {
        assert_eq!(BackendKind::MusicGen.output_sample_rate(), 32_000);
        assert_eq!(BackendKind::AceStep.output_sample_rate(), 48_000);
    }

    #[test]
    fn descriptor_serializes_kind_as_type() {
        let d = BackendDescriptor {
            kind: BackendKind::MusicGen,
            name: "MusicGen".into(),
            status: BackendStatus::Ready,
            min_duration_sec: 5,
            max_duration_sec: 120,
            sample_rate: 32_000,
            model_version: "v1".into(),
        };
        let v = serde_json::to_value(&d).unwrap();
        assert_eq!(v["type"], "musicgen");
        assert_eq!(v["status"], "ready");
        assert!(v.get("kind").is_none());
    }
}
