//! Server-initiated notifications.
//!
//! The daemon pushes these as JSON-RPC notifications (no `id`) on stdout.
//! For a given track: the `generate` response is written first, progress
//! percent is monotonically non-decreasing, and exactly one of
//! `generation_complete` / `generation_error` / `generation_cancelled`
//! terminates the stream.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::backend::BackendKind;
use crate::errors::ErrorKind;
use crate::ids::TrackId;

/// `generation_progress` payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationProgress {
    /// Track being generated.
    pub track_id: TrackId,
    /// 0–99 until the terminal event.
    pub percent: u8,
    /// Steps done.
    pub current_step: u32,
    /// Total steps.
    pub total_steps: u32,
    /// Rolling estimate of remaining seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_sec: Option<f64>,
}

/// `generation_complete` payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationComplete {
    /// Finished track.
    pub track_id: TrackId,
    /// Absolute artifact path.
    pub path: PathBuf,
    /// Rendered duration in seconds.
    pub duration_sec: f64,
    /// Artifact sample rate.
    pub sample_rate: u32,
    /// Wall-clock generation time.
    pub generation_time_sec: f64,
    /// Producing back-end.
    pub backend: BackendKind,
    /// Model version string.
    pub model_version: String,
}

/// `generation_error` payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationError {
    /// Failed track.
    pub track_id: TrackId,
    /// Stable error kind.
    pub code: ErrorKind,
    /// Human-readable message.
    pub message: String,
}

/// `generation_cancelled` payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationCancelled {
    /// Cancelled track.
    pub track_id: TrackId,
    /// Step at which the engine observed the flag (0 when still queued).
    pub at_step: u32,
    /// Total steps the job would have run.
    pub total_steps: u32,
}

/// `download_progress` payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DownloadProgress {
    /// Back-end whose assets are being fetched.
    pub backend: BackendKind,
    /// Current file name.
    pub component: String,
    /// Percent of the current file.
    pub component_percent: u8,
    /// Percent across all required files.
    pub overall_percent: u8,
    /// Bytes fetched so far (all files).
    pub bytes_downloaded: u64,
    /// Total bytes when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_total: Option<u64>,
}

/// All server-initiated notifications with their wire method names.
#[derive(Clone, Debug, PartialEq)]
pub enum Notification {
    /// Throttled progress tick.
    Progress(GenerationProgress),
    /// Successful terminal event.
    Complete(GenerationComplete),
    /// Failed terminal event.
    Error(GenerationError),
    /// Cancelled terminal event.
    Cancelled(GenerationCancelled),
    /// Asset-fetch progress tick.
    Download(DownloadProgress),
}

impl Notification {
    /// JSON-RPC method name.
    pub fn method(&self) -> &'static str {
        match self {
            Self::Progress(_) => "generation_progress",
            Self::Complete(_) => "generation_complete",
            Self::Error(_) => "generation_error",
            Self::Cancelled(_) => "generation_cancelled",
            Self::Download(_) => "download_progress",
        }
    }

    /// Params object for the wire.
    pub fn params(&self) -> serde_json::Value {
        match self {
            Self::Progress(p) => serde_json::to_value(p),
            Self::Complete(p) => serde_json::to_value(p),
            Self::Error(p) => serde_json::to_value(p),
            Self::Cancelled(p) => serde_json::to_value(p),
            Self::Download(p) => serde_json::to_value(p),
        }
        .unwrap_or(serde_json::Value::Null)
    }

    /// Track id for generation events; `None` for download progress.
    pub fn track_id(&self) -> Option<&TrackId> {
        match self {
            Self::Progress(p) => Some(&p.track_id),
            Self::Complete(p) => Some(&p.track_id),
            Self::Error(p) => Some(&p.track_id),
            Self::Cancelled(p) => Some(&p.track_id),
            Self::Download(_) => None,
        }
    }

    /// Whether this is a terminal generation event.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete(_) | Self::Error(_) | Self::Cancelled(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_names_match_wire_contract() {
        let id = TrackId::from_raw("0011223344556677");
        let n = Notification::Progress(GenerationProgress {
            track_id: id.clone(),
            percent: 10,
            current_step: 50,
            total_steps: 500,
            eta_sec: Some(12.0),
        });
        assert_eq!(n.method(), "generation_progress");
        assert!(!n.is_terminal());

        let n = Notification::Cancelled(GenerationCancelled {
            track_id: id,
            at_step: 12,
            total_steps: 60,
        });
        assert_eq!(n.method(), "generation_cancelled");
        assert!(n.is_terminal());
    }

    #[test]
    fn error_payload_serializes_code_string() {
        let n = Notification::Error(GenerationError {
            track_id: TrackId::from_raw("0011223344556677"),
            code: ErrorKind::ModelInferenceFailed,
            message: "denoiser call failed".into(),
        });
        let v = n.params();
        assert_eq!(v["code"], "MODEL_INFERENCE_FAILED");
        assert_eq!(v["track_id"], "0011223344556677");
    }

    #[test]
    fn progress_omits_absent_eta() {
        let n = Notification::Progress(GenerationProgress {
            track_id: TrackId::from_raw("aa"),
            percent: 0,
            current_step: 0,
            total_steps: 10,
            eta_sec: None,
        });
        assert!(n.params().get("eta_sec").is_none());
    }

    #[test]
    fn download_progress_has_no_track() {
        let n = Notification::Download(DownloadProgress {
            backend: BackendKind::AceStep,
            component: "denoiser.onnx".into(),
            component_percent: 40,
            overall_percent: 12,
            bytes_downloaded: 1024,
            bytes_total: Some(10_240),
        });
        assert!(n.track_id().is_none());
        assert_eq!(n.method(), "download_progress");
    }
}
