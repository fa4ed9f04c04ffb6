//! Tagged dispatch over the two inference back-ends.
//!
//! Two variants exist today; this stays a plain enum rather than a plugin
//! registry until a third back-end forces the question.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use aria_acestep::AceStepEngine;
use aria_core::backend::{BackendDescriptor, BackendKind, BackendStatus};
use aria_core::errors::{EngineError, ErrorKind};
use aria_core::job::CancelFlag;
use aria_core::request::GenerateRequest;
use aria_dsp::RenderedAudio;
use aria_models::session::SessionConfig;
use aria_musicgen::MusicGenEngine;
use aria_settings::Settings;

/// A handle to one engine, cheap to clone into worker tasks.
#[derive(Clone)]
pub enum BackendHandle {
    /// Autoregressive back-end.
    MusicGen(Arc<MusicGenEngine>),
    /// Diffusion back-end.
    AceStep(Arc<AceStepEngine>),
}

impl BackendHandle {
    /// Which back-end this is.
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::MusicGen(_) => BackendKind::MusicGen,
            Self::AceStep(_) => BackendKind::AceStep,
        }
    }

    /// Model version string for the content hash.
    pub fn model_version(&self) -> &'static str {
        match self {
            Self::MusicGen(e) => e.model_version(),
            Self::AceStep(e) => e.model_version(),
        }
    }

    /// Whether every required asset exists on disk.
    pub fn is_installed(&self) -> bool {
        match self {
            Self::MusicGen(e) => e.is_installed(),
            Self::AceStep(e) => e.is_installed(),
        }
    }

    /// Whether sessions are resident.
    pub fn is_loaded(&self) -> bool {
        match self {
            Self::MusicGen(e) => e.is_loaded(),
            Self::AceStep(e) => e.is_loaded(),
        }
    }

    /// Load sessions if needed (serialized inside the engine).
    pub async fn ensure_loaded(&self) -> Result<(), EngineError> {
        match self {
            Self::MusicGen(e) => e.ensure_loaded().await,
            Self::AceStep(e) => e.ensure_loaded().await,
        }
    }

    /// Total progress steps a request will run.
    pub fn total_steps(&self, request: &GenerateRequest) -> u32 {
        match self {
            Self::MusicGen(e) => e.config().frames_for_duration(request.duration_sec),
            Self::AceStep(_) => request
                .diffusion
                .map_or(60, |d| d.inference_steps),
        }
    }

    /// Run inference on the current (blocking) thread.
    pub fn generate_blocking(
        &self,
        request: &GenerateRequest,
        cancel: &CancelFlag,
        progress: &mut dyn FnMut(u32, u32),
    ) -> Result<RenderedAudio, EngineError> {
        match self {
            Self::MusicGen(e) => e.generate_blocking(
                &request.prompt,
                request.duration_sec,
                request.seed,
                cancel,
                progress,
            ),
            Self::AceStep(e) => {
                let params = request.diffusion.ok_or_else(|| {
                    EngineError::failed(
                        ErrorKind::ModelInferenceFailed,
                        "diffusion request missing scheduler parameters",
                    )
                })?;
                e.generate_blocking(
                    &request.prompt,
                    request.duration_sec,
                    request.seed,
                    &params,
                    cancel,
                    progress,
                )
            }
        }
    }
}

/// Both back-ends plus their download/load lifecycle flags.
pub struct BackendSet {
    musicgen: BackendHandle,
    ace_step: BackendHandle,
    downloading: [AtomicBool; 2],
    loading: [AtomicBool; 2],
}

fn flag_index(kind: BackendKind) -> usize {
    match kind {
        BackendKind::MusicGen => 0,
        BackendKind::AceStep => 1,
    }
}

impl BackendSet {
    /// Construct both engines from settings.
    pub fn from_settings(settings: &Settings) -> Self {
        let session_config = SessionConfig::from_settings(settings);
        Self {
            musicgen: BackendHandle::MusicGen(Arc::new(MusicGenEngine::new(
                settings.model_dir(BackendKind::MusicGen),
                session_config,
            ))),
            ace_step: BackendHandle::AceStep(Arc::new(AceStepEngine::new(
                settings.model_dir(BackendKind::AceStep),
                session_config,
            ))),
            downloading: [AtomicBool::new(false), AtomicBool::new(false)],
            loading: [AtomicBool::new(false), AtomicBool::new(false)],
        }
    }

    /// Handle for a back-end.
    pub fn get(&self, kind: BackendKind) -> &BackendHandle {
        match kind {
            BackendKind::MusicGen => &self.musicgen,
            BackendKind::AceStep => &self.ace_step,
        }
    }

    /// Try to claim the download slot; `false` when one is already running.
    pub fn begin_download(&self, kind: BackendKind) -> bool {
        !self.downloading[flag_index(kind)].swap(true, Ordering::SeqCst)
    }

    /// Release the download slot.
    pub fn end_download(&self, kind: BackendKind) {
        self.downloading[flag_index(kind)].store(false, Ordering::SeqCst);
    }

    /// Whether a download is in flight.
    pub fn is_downloading(&self, kind: BackendKind) -> bool {
        self.downloading[flag_index(kind)].load(Ordering::SeqCst)
    }

    /// Mark session loading around `ensure_loaded`.
    pub fn set_loading(&self, kind: BackendKind, loading: bool) {
        self.loading[flag_index(kind)].store(loading, Ordering::SeqCst);
    }

    /// Lifecycle status for `get_backends`.
    pub fn status(&self, kind: BackendKind) -> BackendStatus {
        let handle = self.get(kind);
        if self.is_downloading(kind) {
            BackendStatus::Downloading
        } else if self.loading[flag_index(kind)].load(Ordering::SeqCst) {
            BackendStatus::Loading
        } else if handle.is_installed() {
            // Files present; sessions load lazily on first use.
            BackendStatus::Ready
        } else {
            BackendStatus::NotInstalled
        }
    }

    /// Full descriptor for `get_backends`.
    pub fn descriptor(&self, kind: BackendKind) -> BackendDescriptor {
        let handle = self.get(kind);
        let limits = kind.limits();
        BackendDescriptor {
            kind,
            name: kind.display_name().to_owned(),
            status: self.status(kind),
            min_duration_sec: limits.min_duration_sec,
            max_duration_sec: limits.max_duration_sec,
            sample_rate: kind.output_sample_rate(),
            model_version: handle.model_version().to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_with_dir(dir: &std::path::Path) -> BackendSet {
        let settings = Settings {
            cache_dir: dir.to_path_buf(),
            ..Default::default()
        };
        BackendSet::from_settings(&settings)
    }

    #[test]
    fn status_not_installed_on_empty_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let set = set_with_dir(tmp.path());
        assert_eq!(set.status(BackendKind::MusicGen), BackendStatus::NotInstalled);
        assert_eq!(set.status(BackendKind::AceStep), BackendStatus::NotInstalled);
    }

    #[test]
    fn status_ready_when_files_exist() {
        let tmp = tempfile::tempdir().unwrap();
        let set = set_with_dir(tmp.path());
        let dir = tmp.path().join("musicgen");
        std::fs::create_dir_all(&dir).unwrap();
        for f in aria_models::manifest::MUSICGEN_ASSETS.files {
            std::fs::write(dir.join(f.name), b"").unwrap();
        }
        assert_eq!(set.status(BackendKind::MusicGen), BackendStatus::Ready);
        assert_eq!(set.status(BackendKind::AceStep), BackendStatus::NotInstalled);
    }

    #[test]
    fn download_slot_is_exclusive() {
        let tmp = tempfile::tempdir().unwrap();
        let set = set_with_dir(tmp.path());
        assert!(set.begin_download(BackendKind::AceStep));
        assert!(!set.begin_download(BackendKind::AceStep), "second claim refused");
        assert_eq!(set.status(BackendKind::AceStep), BackendStatus::Downloading);
        // The other back-end's slot is independent.
        assert!(set.begin_download(BackendKind::MusicGen));
        set.end_download(BackendKind::AceStep);
        assert!(set.begin_download(BackendKind::AceStep));
    }

    #[test]
    fn loading_status_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let set = set_with_dir(tmp.path());
        set.set_loading(BackendKind::MusicGen, true);
        assert_eq!(set.status(BackendKind::MusicGen), BackendStatus::Loading);
        set.set_loading(BackendKind::MusicGen, false);
        assert_eq!(set.status(BackendKind::MusicGen), BackendStatus::NotInstalled);
    }

    #[test]
    fn descriptor_carries_limits_and_rates() {
        let tmp = tempfile::tempdir().unwrap();
        let set = set_with_dir(tmp.path());
        let d = set.descriptor(BackendKind::AceStep);
        assert_eq!(d.kind, BackendKind::AceStep);
        assert_eq!(d.min_duration_sec, 5);
        assert_eq!(d.max_duration_sec, 240);
        assert_eq!(d.sample_rate, 48_000);
        assert_eq!(d.model_version, "ace-step-onnx-1.0");
    }

    #[test]
    fn total_steps_per_backend() {
        let tmp = tempfile::tempdir().unwrap();
        let set = set_with_dir(tmp.path());

        let ar = aria_core::request::RawGenerateRequest {
            prompt: "p".into(),
            duration_sec: 10,
            ..Default::default()
        }
        .validate(BackendKind::MusicGen, Default::default(), || 1)
        .unwrap();
        assert_eq!(set.get(BackendKind::MusicGen).total_steps(&ar), 500);

        let diff = aria_core::request::RawGenerateRequest {
            prompt: "p".into(),
            duration_sec: 30,
            backend: Some("ace_step".into()),
            inference_steps: Some(42),
            ..Default::default()
        }
        .validate(BackendKind::MusicGen, Default::default(), || 1)
        .unwrap();
        assert_eq!(set.get(BackendKind::AceStep).total_steps(&diff), 42);
    }
}
