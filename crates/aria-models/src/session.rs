//! ONNX Runtime session construction.
//!
//! One place decides execution provider and threading for every session in
//! the process, from the daemon settings. Sessions are created on blocking
//! threads by the engines; this module only builds them.

use std::path::Path;

use tracing::{debug, info};

use aria_settings::Device;

use crate::errors::{ModelError, ResultExt};

/// Session-level knobs shared by every model in a back-end set.
#[derive(Clone, Copy, Debug, Default)]
pub struct SessionConfig {
    /// Execution-provider selection.
    pub device: Device,
    /// Intra-op thread count (`None` = ONNX Runtime default).
    pub intra_threads: Option<usize>,
}

impl SessionConfig {
    /// Build from the daemon settings.
    pub fn from_settings(settings: &aria_settings::Settings) -> Self {
        Self {
            device: settings.device,
            intra_threads: settings.threads,
        }
    }
}

/// Create a session for the model file at `path`.
pub fn build_session(path: &Path, config: SessionConfig) -> Result<ort::session::Session, ModelError> {
    if !path.exists() {
        return Err(ModelError::NotFound(path.display().to_string()));
    }

    let mut builder = ort::session::Session::builder()
        .load_ctx("session builder")?
        .with_log_level(ort::logging::LogLevel::Warning)
        .load_ctx("log level")?;

    if let Some(threads) = config.intra_threads {
        builder = builder.with_intra_threads(threads).load_ctx("intra threads")?;
    }

    builder = apply_execution_provider(builder, config.device)?;

    let session = builder
        .commit_from_file(path)
        .load_ctx(&path.display().to_string())?;

    info!(model = %path.display(), device = ?config.device, "ONNX session ready");
    Ok(session)
}

/// Register the configured execution provider, falling back to CPU.
///
/// CUDA and CoreML registration are feature-gated; a binary built without
/// the feature treats the matching device request as CPU.
fn apply_execution_provider(
    builder: ort::session::builder::SessionBuilder,
    device: Device,
) -> Result<ort::session::builder::SessionBuilder, ModelError> {
    match device {
        Device::Cpu => {
            debug!("using CPU execution provider");
            Ok(builder)
        }
        #[cfg(feature = "cuda")]
        Device::Cuda | Device::Auto => builder
            .with_execution_providers([
                ort::execution_providers::CUDAExecutionProvider::default().build(),
            ])
            .load_ctx("cuda provider"),
        #[cfg(feature = "coreml")]
        Device::Metal => builder
            .with_execution_providers([
                ort::execution_providers::CoreMLExecutionProvider::default().build(),
            ])
            .load_ctx("coreml provider"),
        #[cfg(not(all(feature = "cuda", feature = "coreml")))]
        other => {
            debug!(device = ?other, "requested provider not compiled in, using CPU");
            Ok(builder)
        }
    }
}
