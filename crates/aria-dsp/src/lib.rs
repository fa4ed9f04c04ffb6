//! # aria-dsp
//!
//! Tensor and audio primitives shared by both inference engines:
//!
//! - **Sampling**: softmax, argmax, top-k filtering, multinomial draws
//!   from a seeded 64-bit PRNG ([`sampling`])
//! - **WAV I/O**: 16-bit PCM writer, mono or stereo-duplicated ([`wav`])
//! - **Resampling**: high-quality sinc resampler for the 44.1 → 48 kHz
//!   stage of the diffusion pipeline ([`resample`])
//!
//! ## Crate Position
//!
//! Standalone (no aria crate dependencies). Depended on by the engine
//! crates and the runtime.

#![deny(unsafe_code)]

pub mod resample;
pub mod sampling;
pub mod wav;

pub use resample::resample_44100_to_48000;
pub use sampling::{argmax, multinomial, sample_top_k, seeded_rng, softmax, softmax_in_place};
pub use wav::{read_wav_mono, write_wav};

/// A rendered mono waveform and its sample rate.
///
/// What an inference engine hands back to the worker before WAV encoding.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderedAudio {
    /// Mono samples in [-1, 1].
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl RenderedAudio {
    /// Duration in seconds.
    pub fn duration_sec(&self) -> f64 {
        wav::duration_sec(self.samples.len(), self.sample_rate)
    }
}

/// Errors raised by the DSP helpers.
#[derive(Debug, thiserror::Error)]
pub enum DspError {
    /// WAV encode/decode failure.
    #[error("wav error: {0}")]
    Wav(String),

    /// Resampler construction or processing failure.
    #[error("resample error: {0}")]
    Resample(String),

    /// Invalid argument (empty logits, zero probabilities).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// File I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
