//! The autoregressive decode loop.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::{debug, info};

use aria_core::errors::{CodedError, EngineError, ErrorKind};
use aria_core::job::CancelFlag;
use aria_dsp::{RenderedAudio, sample_top_k, seeded_rng};
use aria_models::manifest::{self, BackendAssets};
use aria_models::session::{SessionConfig, build_session};
use aria_models::tensor::{NamedInputs, TensorBuf, infer_err, push_f32, push_i64};
use aria_models::tokenizer::{TextEncoding, TextTokenizer};

use crate::config::MusicGenConfig;
use crate::delay::DelayPattern;
use crate::kv::KvCache;

/// The four ONNX sessions plus tokenizer for one loaded back-end.
struct Sessions {
    tokenizer: TextTokenizer,
    text_encoder: ort::session::Session,
    decoder: ort::session::Session,
    decoder_with_past: ort::session::Session,
    codec: ort::session::Session,
}

/// MusicGen inference engine.
///
/// Sessions load lazily on first use and are retained for the process
/// lifetime; loading is serialized through an async gate so concurrent
/// requests wait on the same load rather than racing.
pub struct MusicGenEngine {
    model_dir: PathBuf,
    session_config: SessionConfig,
    config: MusicGenConfig,
    assets: &'static BackendAssets,
    state: Mutex<Option<Sessions>>,
    load_gate: tokio::sync::Mutex<()>,
    ready: AtomicBool,
}

impl MusicGenEngine {
    /// Create an (unloaded) engine over `model_dir`.
    pub fn new(model_dir: PathBuf, session_config: SessionConfig) -> Self {
        Self {
            model_dir,
            session_config,
            config: MusicGenConfig::default(),
            assets: manifest::assets_for(aria_core::backend::BackendKind::MusicGen),
            state: Mutex::new(None),
            load_gate: tokio::sync::Mutex::new(()),
            ready: AtomicBool::new(false),
        }
    }

    /// Model geometry and sampling constants.
    pub fn config(&self) -> &MusicGenConfig {
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

    /// Load sessions if not yet loaded.
    ///
    /// Session creation is blocking I/O and runs on a blocking thread; the
    /// async gate serializes concurrent callers onto one load.
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
                "musicgen model files are not installed",
            ));
        }

        let dir = self.model_dir.clone();
        let session_config = self.session_config;
        let sessions = tokio::task::spawn_blocking(move || load_sessions(&dir, session_config))
            .await
            .map_err(|e| EngineError::failed(ErrorKind::ModelLoadFailed, format!("join: {e}")))??;

        *self.state.lock() = Some(sessions);
        self.ready.store(true, Ordering::SeqCst);
        info!("musicgen sessions ready");
        Ok(())
    }

    /// Run a full generation on the current (blocking) thread.
    ///
    /// `progress` is called once per decoder step with
    /// (frames complete, total frames); the cancel flag is polled at every
    /// step boundary.
    pub fn generate_blocking(
        &self,
        prompt: &str,
        duration_sec: u32,
        seed: u64,
        cancel: &CancelFlag,
        progress: &mut dyn FnMut(u32, u32),
    ) -> Result<RenderedAudio, EngineError> {
        let mut guard = self.state.lock();
        let sessions = guard.as_mut().ok_or_else(|| {
            EngineError::failed(ErrorKind::ModelLoadFailed, "musicgen sessions not loaded")
        })?;

        let frames = self.config.frames_for_duration(duration_sec);
        debug!(frames, seed, "starting musicgen decode");

        let encoding = sessions
            .tokenizer
            .encode(prompt)
            .map_err(|e| EngineError::from(CodedError::from(e)))?;

        let conditioning = encode_text(&mut sessions.text_encoder, &encoding)?;
        decode_loop(sessions, &self.config, &conditioning, frames, seed, cancel, progress)
    }
}

/// Conditional + unconditional encoder state for CFG.
struct Conditioning {
    /// `(2, L, H)` — conditional row then zeroed unconditional row.
    hidden: TensorBuf,
    /// `(2, L)` — prompt mask then zeros.
    attention: (Vec<i64>, Vec<i64>),
}

fn load_sessions(dir: &std::path::Path, config: SessionConfig) -> Result<Sessions, EngineError> {
    let into_engine = |e: aria_models::ModelError| EngineError::from(CodedError::from(e));
    Ok(Sessions {
        tokenizer: TextTokenizer::from_file(&dir.join("tokenizer.json")).map_err(into_engine)?,
        text_encoder: build_session(&dir.join("text_encoder.onnx"), config).map_err(into_engine)?,
        decoder: build_session(&dir.join("decoder_model.onnx"), config).map_err(into_engine)?,
        decoder_with_past: build_session(&dir.join("decoder_with_past_model.onnx"), config)
            .map_err(into_engine)?,
        codec: build_session(&dir.join("encodec_decode.onnx"), config).map_err(into_engine)?,
    })
}

/// Run the text encoder once and assemble the CFG-stacked conditioning.
fn encode_text(
    text_encoder: &mut ort::session::Session,
    encoding: &TextEncoding,
) -> Result<Conditioning, EngineError> {
    let len = encoding.len();
    let mut inputs = NamedInputs::new();
    push_i64(&mut inputs, "input_ids", vec![1, len as i64], encoding.ids.clone())?;
    push_i64(
        &mut inputs,
        "attention_mask",
        vec![1, len as i64],
        encoding.attention_mask.clone(),
    )?;

    let outputs = text_encoder.run(inputs).map_err(|e| infer_err("text encoder", e))?;
    let hidden = TensorBuf::extract(&outputs, "last_hidden_state")?;

    let [batch, seq, dim] = hidden.shape[..] else {
        return Err(infer_err("text encoder", format!("unexpected shape {:?}", hidden.shape)));
    };
    if batch != 1 || seq != len as i64 {
        return Err(infer_err("text encoder", format!("unexpected shape {:?}", hidden.shape)));
    }

    // CFG batch: conditional embeddings stacked over a zeroed unconditional
    // row with a zeroed attention mask.
    let mut stacked = hidden.data.clone();
    stacked.extend(std::iter::repeat_n(0.0f32, hidden.data.len()));

    let attention = encoding.attention_mask.clone();
    let uncond_attention = vec![0i64; len];

    Ok(Conditioning {
        hidden: TensorBuf {
            shape: vec![2, seq, dim],
            data: stacked,
        },
        attention: (attention, uncond_attention),
    })
}

/// The KV-cached autoregressive loop over the delay-pattern buffer.
fn decode_loop(
    sessions: &mut Sessions,
    config: &MusicGenConfig,
    conditioning: &Conditioning,
    frames: u32,
    seed: u64,
    cancel: &CancelFlag,
    progress: &mut dyn FnMut(u32, u32),
) -> Result<RenderedAudio, EngineError> {
    let rows = config.batch_rows();
    let codebooks = config.num_codebooks;
    let seq_len = conditioning.attention.0.len();

    let mut pattern = DelayPattern::new(config, frames);
    let total_steps = pattern.total_steps();
    let mut rng = seeded_rng(seed);
    let mut kv: Option<KvCache> = None;

    let attention_stacked: Vec<i64> = conditioning
        .attention
        .0
        .iter()
        .chain(conditioning.attention.1.iter())
        .copied()
        .collect();

    for step in 0..total_steps {
        if cancel.is_set() {
            debug!(step, "cancel flag observed between decoder steps");
            return Err(EngineError::cancelled(pattern.frames_complete(step)));
        }

        // Input column: decoder-start tokens at step 0, then the previous
        // step's delayed column mirrored across the CFG batch halves.
        let column = if step == 0 {
            vec![config.pad_token_id; codebooks]
        } else {
            pattern.input_column(step - 1)
        };
        let mut input_ids = column.clone();
        input_ids.extend_from_slice(&column);

        let mut inputs = NamedInputs::new();
        push_i64(&mut inputs, "input_ids", vec![rows as i64, 1], input_ids)?;
        push_i64(
            &mut inputs,
            "encoder_attention_mask",
            vec![2, seq_len as i64],
            attention_stacked.clone(),
        )?;

        let logits = match kv.as_mut() {
            // First step: full decoder graph computes the cross-attention
            // caches from the encoder output.
            None => {
                push_f32(
                    &mut inputs,
                    "encoder_hidden_states",
                    conditioning.hidden.shape.clone(),
                    conditioning.hidden.data.clone(),
                )?;
                let outputs = sessions.decoder.run(inputs).map_err(|e| infer_err("decoder", e))?;
                let logits = TensorBuf::extract(&outputs, "logits")?;
                kv = Some(KvCache::from_first_step(&outputs, config.num_layers)?);
                logits
            }
            // Later steps: with-past graph threading all caches through.
            Some(cache) => {
                let past = cache.past_inputs();
                for (name, buf) in past {
                    let tensor = ort::value::Tensor::from_array((buf.shape, buf.data))
                        .map_err(|e| infer_err("past tensor", e))?;
                    inputs.push((name.into(), tensor.into()));
                }
                let outputs = sessions
                    .decoder_with_past
                    .run(inputs)
                    .map_err(|e| infer_err("decoder with past", e))?;
                let logits = TensorBuf::extract(&outputs, "logits")?;
                cache.update_decoder(&outputs)?;
                logits
            }
        };

        let sampled = sample_frame(config, &logits, &mut rng)?;
        pattern.push(step, &sampled);
        progress(pattern.frames_complete(step), frames);
    }

    let samples = codec_decode(&mut sessions.codec, &pattern)?;
    Ok(RenderedAudio {
        samples,
        sample_rate: config.sample_rate,
    })
}

/// CFG-combine and top-k sample one token per codebook.
fn sample_frame(
    config: &MusicGenConfig,
    logits: &TensorBuf,
    rng: &mut rand::rngs::StdRng,
) -> Result<Vec<i64>, EngineError> {
    let vocab = config.vocab_size;
    let rows = config.batch_rows();
    if logits.data.len() != rows * vocab {
        return Err(infer_err(
            "logits",
            format!("expected {} values, got {} ({:?})", rows * vocab, logits.data.len(), logits.shape),
        ));
    }

    let mut sampled = Vec::with_capacity(config.num_codebooks);
    let mut guided = vec![0.0f32; vocab];
    for cb in 0..config.num_codebooks {
        let cond = &logits.data[cb * vocab..(cb + 1) * vocab];
        let uncond_row = cb + config.num_codebooks;
        let uncond = &logits.data[uncond_row * vocab..(uncond_row + 1) * vocab];
        for v in 0..vocab {
            guided[v] = uncond[v] + config.guidance_scale * (cond[v] - uncond[v]);
        }
        let token = sample_top_k(&guided, config.top_k, config.temperature, rng)
            .map_err(|e| infer_err("sampling", e))?;
        sampled.push(token as i64);
    }
    Ok(sampled)
}

/// Undo the delay pattern and decode the token grid to a waveform.
fn codec_decode(
    codec: &mut ort::session::Session,
    pattern: &DelayPattern,
) -> Result<Vec<f32>, EngineError> {
    let grid = pattern.undelay();
    let codebooks = grid.len();
    let frames = grid.first().map_or(0, Vec::len);

    let mut flat = Vec::with_capacity(codebooks * frames);
    for row in &grid {
        flat.extend_from_slice(row);
    }

    let mut inputs = NamedInputs::new();
    push_i64(
        &mut inputs,
        "audio_codes",
        vec![1, 1, codebooks as i64, frames as i64],
        flat,
    )?;

    let outputs = codec.run(inputs).map_err(|e| infer_err("codec decode", e))?;
    let audio = TensorBuf::extract(&outputs, "audio_values")?;
    Ok(audio.data)
}
