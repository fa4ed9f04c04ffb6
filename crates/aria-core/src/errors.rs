//! Error taxonomy with stable codes.
//!
//! Every user-visible failure carries an [`ErrorKind`]: a stable string name
//! (surfaced in terminal notifications and `error.data.code`) and a stable
//! integer (the JSON-RPC `error.code` for application errors). Validation
//! failures are synchronous RPC errors; engine failures arrive later as
//! `generation_error` notifications carrying the same kinds.

use serde::{Deserialize, Serialize};

/// Stable error kinds shared across the RPC surface and notifications.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Prompt empty, too long, or otherwise unusable.
    InvalidPrompt,
    /// Duration outside the active back-end's range.
    InvalidDuration,
    /// Unknown back-end tag.
    InvalidBackend,
    /// Back-end selected but its model files are missing.
    BackendNotInstalled,
    /// Back-end selected while its sessions are still loading.
    BackendLoading,
    /// Diffusion step count outside 1–200.
    InvalidInferenceSteps,
    /// Guidance scale outside 1.0–30.0.
    InvalidGuidanceScale,
    /// Unknown scheduler tag.
    InvalidScheduler,
    /// Admission bound exceeded.
    QueueFull,
    /// Cancel target does not exist.
    TrackNotFound,
    /// Cancel target already reached a terminal state.
    AlreadyComplete,
    /// A download for this back-end is already running.
    DownloadInProgress,
    /// Asset fetch failed.
    ModelDownloadFailed,
    /// Model files missing at session-load time.
    ModelNotFound,
    /// ONNX session creation failed.
    ModelLoadFailed,
    /// Inference call failed mid-generation.
    ModelInferenceFailed,
    /// Terminal state for a cancelled job.
    Cancelled,
}

impl ErrorKind {
    /// Stable string name (notification `code` field).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidPrompt => "INVALID_PROMPT",
            Self::InvalidDuration => "INVALID_DURATION",
            Self::InvalidBackend => "INVALID_BACKEND",
            Self::BackendNotInstalled => "BACKEND_NOT_INSTALLED",
            Self::BackendLoading => "BACKEND_LOADING",
            Self::InvalidInferenceSteps => "INVALID_INFERENCE_STEPS",
            Self::InvalidGuidanceScale => "INVALID_GUIDANCE_SCALE",
            Self::InvalidScheduler => "INVALID_SCHEDULER",
            Self::QueueFull => "QUEUE_FULL",
            Self::TrackNotFound => "TRACK_NOT_FOUND",
            Self::AlreadyComplete => "ALREADY_COMPLETE",
            Self::DownloadInProgress => "DOWNLOAD_IN_PROGRESS",
            Self::ModelDownloadFailed => "MODEL_DOWNLOAD_FAILED",
            Self::ModelNotFound => "MODEL_NOT_FOUND",
            Self::ModelLoadFailed => "MODEL_LOAD_FAILED",
            Self::ModelInferenceFailed => "MODEL_INFERENCE_FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Stable integer (JSON-RPC `error.code` for application errors).
    pub fn code(self) -> i64 {
        match self {
            Self::InvalidPrompt => 1001,
            Self::InvalidDuration => 1002,
            Self::InvalidBackend => 1003,
            Self::BackendNotInstalled => 1004,
            Self::BackendLoading => 1005,
            Self::InvalidInferenceSteps => 1006,
            Self::InvalidGuidanceScale => 1007,
            Self::InvalidScheduler => 1008,
            Self::QueueFull => 1009,
            Self::TrackNotFound => 1010,
            Self::AlreadyComplete => 1011,
            Self::DownloadInProgress => 1012,
            Self::ModelDownloadFailed => 1013,
            Self::ModelNotFound => 1014,
            Self::ModelLoadFailed => 1015,
            Self::ModelInferenceFailed => 1016,
            Self::Cancelled => 1017,
        }
    }

    /// Whether this kind rejects a request before a job exists.
    pub fn is_validation(self) -> bool {
        matches!(
            self,
            Self::InvalidPrompt
                | Self::InvalidDuration
                | Self::InvalidBackend
                | Self::InvalidInferenceSteps
                | Self::InvalidGuidanceScale
                | Self::InvalidScheduler
        )
    }
}

/// A kind paired with its human-readable message.
#[derive(Clone, Debug, thiserror::Error)]
#[error("{message}")]
pub struct CodedError {
    /// Stable machine kind.
    pub kind: ErrorKind,
    /// Short human message.
    pub message: String,
}

impl CodedError {
    /// Build a coded error.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Terminal outcome of an inference run, as seen by the worker.
///
/// Cancellation is not a failure: it carries the step at which the engine
/// observed the flag so the `generation_cancelled` notification can report
/// where it stopped.
#[derive(Clone, Debug, thiserror::Error)]
pub enum EngineError {
    /// The job's cancel flag was observed at a step boundary.
    #[error("cancelled at step {at_step}")]
    Cancelled {
        /// Step index at which the engine stopped.
        at_step: u32,
    },

    /// The engine failed; the kind feeds `generation_error.code`.
    #[error(transparent)]
    Failed(#[from] CodedError),
}

impl EngineError {
    /// Failure with a kind and message.
    pub fn failed(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Failed(CodedError::new(kind, message))
    }

    /// Cancellation observed at `at_step`.
    pub fn cancelled(at_step: u32) -> Self {
        Self::Cancelled { at_step }
    }
}
