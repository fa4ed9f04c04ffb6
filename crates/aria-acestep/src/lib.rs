//! # aria-acestep
//!
//! The latent-diffusion generation back-end.
//!
//! # Architecture
//!
//! ```text
//! prompt → tokenizer → umt5_encoder.onnx → conditioning [1, L, H]
//! → seeded Gaussian latent [1, 8, 16, F]
//! → scheduler loop (Euler / Heun / PingPong over a shifted flow schedule)
//!   · 2× batch (conditional / unconditional), CFG at guidance_scale
//!   · cancel flag polled between steps
//! → latent_decoder.onnx → mel → vocoder.onnx → 44.1 kHz waveform
//! → sinc resample → mono f32 @ 48 kHz
//! ```
//!
//! Numerics: the host-side pipeline is f32 end to end. Reduced-precision
//! execution (bf16) is left to the execution provider; Apple-Silicon-class
//! targets stay at f32 to avoid instability in the denoiser.
//!
//! ## Crate Position
//!
//! Depends on aria-core, aria-dsp, aria-models. Depended on by the runtime.

#![deny(unsafe_code)]

pub mod config;
pub mod engine;
pub mod scheduler;

pub use config::AceStepConfig;
pub use engine::AceStepEngine;
pub use scheduler::Schedule;
