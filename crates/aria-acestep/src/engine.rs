//! The guided denoising loop.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::{debug, info};

use aria_core::errors::{CodedError, EngineError, ErrorKind};
use aria_core::job::CancelFlag;
use aria_core::request::{DiffusionParams, SchedulerKind};
use aria_dsp::{RenderedAudio, resample_44100_to_48000, seeded_rng};
use aria_models::manifest::{self, BackendAssets};
use aria_models::session::{SessionConfig, build_session};
use aria_models::tensor::{NamedInputs, TensorBuf, infer_err, push_f32, push_i64};
use aria_models::tokenizer::TextTokenizer;

use crate::config::AceStepConfig;
use crate::scheduler::{Schedule, euler_step, gaussian_latent, heun_step, pingpong_step};

/// The four ONNX sessions plus tokenizer for the diffusion back-end.
struct Sessions {
    tokenizer: TextTokenizer,
    text_encoder: ort::session::Session,
    denoiser: ort::session::Session,
    latent_decoder: ort::session::Session,
    vocoder: ort::session::Session,
}

/// ACE-Step inference engine.
///
/// Same load discipline as the AR engine: lazy, serialized behind an async
/// gate, retained for the process lifetime.
pub struct AceStepEngine {
    model_dir: PathBuf,
    session_config: SessionConfig,
    config: AceStepConfig,
    assets: &'static BackendAssets,
    state: Mutex<Option<Sessions>>,
    load_gate: tokio::sync::Mutex<()>,
    ready: AtomicBool,
}

impl AceStepEngine {
    /// Create an (unloaded) engine over `model_dir`.
    pub fn new(model_dir: PathBuf, session_config: SessionConfig) -> Self {
        Self {
            model_dir,
            session_config,
            config: AceStepConfig::default(),
            assets: manifest::assets_for(aria_core::backend::BackendKind::AceStep),
            state: Mutex::new(None),
            load_gate: tokio::sync::Mutex::new(()),
            ready: AtomicBool::new(false),
        }
    }

    /// Latent geometry and audio constants.
    pub fn config(&self) -> &AceStepConfig {
        &self.config
    }

    /// Version string recorded in track metadata and content hashes.
    pub fn model_version(&self) -> &'static str {
        self.assets.model_version
    }

    /// Whether every required model file exists on disk.
    pub fn is_installed(&self) -> bool {
        self.assets.all_exist(&self.model_dir)
    }

    /// Whether sessions are loaded.
    pub fn is_loaded(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Load sessions if not yet loaded (serialized, shared by concurrent
    /// callers).
    pub async fn ensure_loaded(&self) -> Result<(), EngineError> {
        if self.is_loaded() {
            return Ok(());
        }
        let _gate = self.load_gate.lock().await;
        if self.is_loaded() {
            return Ok(());
        }

        if !self.is_installed() {
            return Err(EngineError::failed(
                ErrorKind::BackendNotInstalled,
                "ace_step model files are not installed",
            ));
        }

        let dir = self.model_dir.clone();
        let session_config = self.session_config;
        let sessions = tokio::task::spawn_blocking(move || load_sessions(&dir, session_config))
            .await
            .map_err(|e| EngineError::failed(ErrorKind::ModelLoadFailed, format!("join: {e}")))??;

        *self.state.lock() = Some(sessions);
        self.ready.store(true, Ordering::SeqCst);
        info!("ace_step sessions ready");
        Ok(())
    }

    /// Run a full generation on the current (blocking) thread.
    ///
    /// `progress` is called once per scheduler step with
    /// (steps complete, total steps); the cancel flag is polled between
    /// steps, never inside a denoiser call.
    pub fn generate_blocking(
        &self,
        prompt: &str,
        duration_sec: u32,
        seed: u64,
        params: &DiffusionParams,
        cancel: &CancelFlag,
        progress: &mut dyn FnMut(u32, u32),
    ) -> Result<RenderedAudio, EngineError> {
        let mut guard = self.state.lock();
        let sessions = guard.as_mut().ok_or_else(|| {
            EngineError::failed(ErrorKind::ModelLoadFailed, "ace_step sessions not loaded")
        })?;

        let frames = self.config.frames_for_duration(duration_sec);
        debug!(
            frames,
            seed,
            steps = params.inference_steps,
            scheduler = params.scheduler.tag(),
            "starting ace_step denoise"
        );

        let encoding = sessions
            .tokenizer
            .encode(prompt)
            .map_err(|e| EngineError::from(CodedError::from(e)))?;

        // UMT5 runs once; the conditioning is reused by every denoiser call.
        let mut inputs = NamedInputs::new();
        let len = encoding.len();
        push_i64(&mut inputs, "input_ids", vec![1, len as i64], encoding.ids.clone())?;
        push_i64(
            &mut inputs,
            "attention_mask",
            vec![1, len as i64],
            encoding.attention_mask.clone(),
        )?;
        let outputs = sessions
            .text_encoder
            .run(inputs)
            .map_err(|e| infer_err("umt5 encoder", e))?;
        let hidden = TensorBuf::extract(&outputs, "last_hidden_state")?;
        drop(outputs);

        let [_, seq, dim] = hidden.shape[..] else {
            return Err(infer_err("umt5 encoder", format!("unexpected shape {:?}", hidden.shape)));
        };

        let conditioning = Conditioning {
            hidden,
            attention_mask: encoding.attention_mask,
            seq,
            dim,
        };

        let latent = self.denoise_loop(sessions, &conditioning, frames, seed, params, cancel, progress)?;
        let samples = decode_latent(sessions, &self.config, latent, frames)?;

        let resampled = resample_44100_to_48000(&samples)
            .map_err(|e| infer_err("resample", e))?;
        Ok(RenderedAudio {
            samples: resampled,
            sample_rate: self.config.output_sample_rate,
        })
    }

    /// Scheduler-driven integration from pure noise to a clean latent.
    fn denoise_loop(
        &self,
        sessions: &mut Sessions,
        conditioning: &Conditioning,
        frames: u32,
        seed: u64,
        params: &DiffusionParams,
        cancel: &CancelFlag,
        progress: &mut dyn FnMut(u32, u32),
    ) -> Result<TensorBuf, EngineError> {
        let config = &self.config;
        let elements = config.latent_elements(frames);
        let shape = vec![
            1,
            config.latent_channels as i64,
            config.latent_height as i64,
            i64::from(frames),
        ];

        // Latent init and PingPong re-noise share one seeded PRNG, so the
        // trajectory is a pure function of (seed, steps, scheduler).
        let mut rng = seeded_rng(seed);
        let mut latent = gaussian_latent(elements, &mut rng);

        let schedule = Schedule::new(params.inference_steps, config.schedule_shift);
        let total = schedule.steps();

        for step in 0..total {
            if cancel.is_set() {
                debug!(step, "cancel flag observed between diffusion steps");
                return Err(EngineError::cancelled(step));
            }

            let sigma = schedule.sigma(step);
            let sigma_next = schedule.sigma(step + 1);
            let dt = schedule.dt(step);

            let v1 = guided_velocity(
                &mut sessions.denoiser,
                conditioning,
                &shape,
                &latent,
                schedule.timestep(step),
                params.guidance_scale,
            )?;

            match params.scheduler {
                SchedulerKind::Euler => euler_step(&mut latent, &v1, dt),
                SchedulerKind::Heun => {
                    if sigma_next == 0.0 {
                        // No corrector slope exists at σ = 0; final step
                        // degrades to Euler as usual.
                        euler_step(&mut latent, &v1, dt);
                    } else {
                        let before = latent.clone();
                        euler_step(&mut latent, &v1, dt);
                        let v2 = guided_velocity(
                            &mut sessions.denoiser,
                            conditioning,
                            &shape,
                            &latent,
                            schedule.timestep(step + 1),
                            params.guidance_scale,
                        )?;
                        heun_step(&mut latent, &before, &v1, &v2, dt);
                    }
                }
                SchedulerKind::PingPong => {
                    pingpong_step(&mut latent, &v1, sigma, sigma_next, &mut rng);
                }
            }

            progress(step + 1, total);
        }

        Ok(TensorBuf { shape, data: latent })
    }
}

/// Encoder state reused across denoiser calls.
struct Conditioning {
    hidden: TensorBuf,
    attention_mask: Vec<i64>,
    seq: i64,
    dim: i64,
}

fn load_sessions(dir: &std::path::Path, config: SessionConfig) -> Result<Sessions, EngineError> {
    let into_engine = |e: aria_models::ModelError| EngineError::from(CodedError::from(e));
    Ok(Sessions {
        tokenizer: TextTokenizer::from_file(&dir.join("tokenizer.json")).map_err(into_engine)?,
        text_encoder: build_session(&dir.join("umt5_encoder.onnx"), config).map_err(into_engine)?,
        denoiser: build_session(&dir.join("denoiser.onnx"), config).map_err(into_engine)?,
        latent_decoder: build_session(&dir.join("latent_decoder.onnx"), config).map_err(into_engine)?,
        vocoder: build_session(&dir.join("vocoder.onnx"), config).map_err(into_engine)?,
    })
}

/// One CFG-batched denoiser call: conditional and unconditional rows in one
/// batch, combined as `uncond + scale × (cond − uncond)`.
fn guided_velocity(
    denoiser: &mut ort::session::Session,
    conditioning: &Conditioning,
    latent_shape: &[i64],
    latent: &[f32],
    timestep: f32,
    guidance_scale: f32,
) -> Result<Vec<f32>, EngineError> {
    let elements = latent.len();
    let mut batched_shape = latent_shape.to_vec();
    batched_shape[0] = 2;

    let mut batched_latent = latent.to_vec();
    batched_latent.extend_from_slice(latent);

    let mut cond_hidden = conditioning.hidden.data.clone();
    cond_hidden.extend(std::iter::repeat_n(0.0f32, conditioning.hidden.data.len()));

    let mut attention: Vec<i64> = conditioning.attention_mask.clone();
    attention.extend(std::iter::repeat_n(0i64, conditioning.attention_mask.len()));

    let mut inputs = NamedInputs::new();
    push_f32(&mut inputs, "hidden_states", batched_shape, batched_latent)?;
    push_f32(&mut inputs, "timestep", vec![2], vec![timestep, timestep])?;
    push_f32(
        &mut inputs,
        "encoder_hidden_states",
        vec![2, conditioning.seq, conditioning.dim],
        cond_hidden,
    )?;
    push_i64(
        &mut inputs,
        "encoder_attention_mask",
        vec![2, conditioning.seq],
        attention,
    )?;
    // Instrumental mode: lyric conditioning is a zeroed single-position
    // sequence for both batch halves.
    push_f32(
        &mut inputs,
        "lyric_hidden_states",
        vec![2, 1, conditioning.dim],
        vec![0.0; 2 * conditioning.dim as usize],
    )?;

    let outputs = denoiser.run(inputs).map_err(|e| infer_err("denoiser", e))?;
    let out = TensorBuf::extract_first(&outputs)?;
    if out.data.len() != 2 * elements {
        return Err(infer_err(
            "denoiser",
            format!("expected {} values, got {} ({:?})", 2 * elements, out.data.len(), out.shape),
        ));
    }

    let (cond, uncond) = out.data.split_at(elements);
    let mut guided = Vec::with_capacity(elements);
    for (&c, &u) in cond.iter().zip(uncond) {
        guided.push(u + guidance_scale * (c - u));
    }
    Ok(guided)
}

/// Latent → mel → waveform at the native 44.1 kHz rate.
fn decode_latent(
    sessions: &mut Sessions,
    config: &AceStepConfig,
    latent: TensorBuf,
    frames: u32,
) -> Result<Vec<f32>, EngineError> {
    let mut inputs = NamedInputs::new();
    push_f32(&mut inputs, "latent", latent.shape, latent.data)?;
    let outputs = sessions
        .latent_decoder
        .run(inputs)
        .map_err(|e| infer_err("latent decoder", e))?;
    let mel = TensorBuf::extract_first(&outputs)?;
    drop(outputs);

    let mut inputs = NamedInputs::new();
    push_f32(&mut inputs, "mel", mel.shape, mel.data)?;
    let outputs = sessions
        .vocoder
        .run(inputs)
        .map_err(|e| infer_err("vocoder", e))?;
    let audio = TensorBuf::extract_first(&outputs)?;

    // Trim to the exact latent-frame duration; vocoder padding can add a
    // handful of trailing samples.
    let expected = frames as usize * config.samples_per_frame as usize;
    let mut samples = audio.data;
    if samples.len() > expected {
        samples.truncate(expected);
    }
    Ok(samples)
}
