//! Settings type definitions.
//!
//! Every type implements [`Default`] with production default values and is
//! tolerant of partial JSON: missing fields take their default during
//! deserialization via `#[serde(default)]`.

use std::path::PathBuf;

use aria_core::backend::BackendKind;
use aria_core::request::{DiffusionDefaults, SchedulerKind};
use serde::{Deserialize, Serialize};

/// ONNX execution-provider selection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Device {
    /// Probe CUDA, then CoreML, then CPU.
    #[default]
    Auto,
    /// CPU only.
    Cpu,
    /// CUDA when compiled in.
    Cuda,
    /// CoreML/Metal when compiled in.
    Metal,
}

/// Root settings for the daemon.
///
/// Loaded from `~/.aria/settings.json` with defaults applied for missing
/// fields; `ARIA_*` environment variables override individual values.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct Settings {
    /// Back-end used when a request omits `backend`.
    pub default_backend: BackendKind,
    /// Root for model assets and the track cache.
    pub cache_dir: PathBuf,
    /// Track-cache size ceiling in MB.
    pub cache_max_mb: u64,
    /// Optional track-count ceiling.
    pub cache_max_tracks: Option<usize>,
    /// Queue admission bound.
    pub queue_limit: usize,
    /// Execution-provider selection.
    pub device: Device,
    /// Intra-op thread count (`None` = runtime default).
    pub threads: Option<usize>,
    /// Per-back-end model directory overrides.
    pub model_dirs: ModelDirs,
    /// Diffusion defaults.
    pub ace_step: AceStepSettings,
}

/// Optional per-back-end asset directory overrides.
///
/// When unset, assets live under `<cache_dir>/<backend>/`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct ModelDirs {
    /// MusicGen asset directory.
    pub musicgen: Option<PathBuf>,
    /// ACE-Step asset directory.
    pub ace_step: Option<PathBuf>,
}

/// Diffusion back-end defaults applied when the request omits the knobs.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct AceStepSettings {
    /// Default denoising step count.
    pub default_steps: u32,
    /// Default scheduler tag.
    pub default_scheduler: SchedulerKind,
    /// Default guidance scale.
    pub default_guidance: f32,
}

impl Default for AceStepSettings {
    fn default() -> Self {
        Self {
            default_steps: 60,
            default_scheduler: SchedulerKind::Euler,
            default_guidance: 15.0,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_backend: BackendKind::MusicGen,
            cache_dir: default_cache_dir(),
            cache_max_mb: 2048,
            cache_max_tracks: None,
            queue_limit: 8,
            device: Device::Auto,
            threads: None,
            model_dirs: ModelDirs::default(),
            ace_step: AceStepSettings::default(),
        }
    }
}

impl Settings {
    /// Asset directory for a back-end (override or `<cache_dir>/<tag>`).
    pub fn model_dir(&self, backend: BackendKind) -> PathBuf {
        let explicit = match backend {
            BackendKind::MusicGen => self.model_dirs.musicgen.clone(),
            BackendKind::AceStep => self.model_dirs.ace_step.clone(),
        };
        explicit.unwrap_or_else(|| self.cache_dir.join(backend.tag()))
    }

    /// Track directory (`<cache_dir>/tracks`).
    pub fn tracks_dir(&self) -> PathBuf {
        self.cache_dir.join("tracks")
    }

    /// Diffusion defaults as the validation-layer record.
    pub fn diffusion_defaults(&self) -> DiffusionDefaults {
        DiffusionDefaults {
            steps: self.ace_step.default_steps,
            scheduler: self.ace_step.default_scheduler,
            guidance: self.ace_step.default_guidance,
        }
    }
}

/// `~/.aria` (or `/tmp/.aria` when HOME is unset).
pub fn default_cache_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
    PathBuf::from(home).join(".aria")
}
