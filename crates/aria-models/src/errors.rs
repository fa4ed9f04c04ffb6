//! Model-layer errors.

use aria_core::errors::{CodedError, ErrorKind};

/// Errors raised by asset and session management.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// Required model files are missing on disk.
    #[error("model not found: {0}")]
    NotFound(String),

    /// Asset download failed (network, disk, or verification).
    #[error("download failed: {0}")]
    Download(String),

    /// A download for this back-end is already running.
    #[error("download already in progress for {0}")]
    DownloadInProgress(String),

    /// ONNX session creation failure.
    #[error("session load failed: {0}")]
    Load(String),

    /// Tokenizer load or encode failure.
    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    /// File I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ModelError {
    /// Map to the stable RPC error taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::ModelNotFound,
            Self::Download(_) | Self::Io(_) => ErrorKind::ModelDownloadFailed,
            Self::DownloadInProgress(_) => ErrorKind::DownloadInProgress,
            Self::Load(_) | Self::Tokenizer(_) => ErrorKind::ModelLoadFailed,
        }
    }
}

impl From<ModelError> for CodedError {
    fn from(err: ModelError) -> Self {
        CodedError::new(err.kind(), err.to_string())
    }
}

/// Extension trait to wrap foreign errors with context.
pub trait ResultExt<T> {
    /// Wrap the error as [`ModelError::Load`] with a `context` prefix.
    fn load_ctx(self, context: &str) -> Result<T, ModelError>;
    /// Wrap the error as [`ModelError::Download`] with a `context` prefix.
    fn download_ctx(self, context: &str) -> Result<T, ModelError>;
    /// Wrap the error as [`ModelError::Tokenizer`] with a `context` prefix.
    fn tokenizer_ctx(self, context: &str) -> Result<T, ModelError>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for Result<T, E> {
    fn load_ctx(self, context: &str) -> Result<T, ModelError> {
        self.map_err(|e| ModelError::Load(format!("{context}: {e}")))
    }
    fn download_ctx(self, context: &str) -> Result<T, ModelError> {
        self.map_err(|e| ModelError::Download(format!("{context}: {e}")))
    }
    fn tokenizer_ctx(self, context: &str) -> Result<T, ModelError> {
        self.map_err(|e| ModelError::Tokenizer(format!("{context}: {e}")))
    }
}
