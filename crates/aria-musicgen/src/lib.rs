//! # aria-musicgen
//!
//! The autoregressive generation back-end.
//!
//! # Architecture
//!
//! ```text
//! prompt → tokenizer → text_encoder.onnx → embeddings [1, L, H]
//! → decoder loop (first step: decoder_model.onnx, then
//!   decoder_with_past_model.onnx threading KV caches)
//!   · 2× batch (conditional / unconditional), CFG at scale 3.0
//!   · top-k 250 sampling per codebook from a seeded PRNG
//!   · delay-pattern buffer across 4 codebooks
//! → undelay → token grid [4, N] → encodec_decode.onnx
//! → mono f32 @ 32 kHz
//! ```
//!
//! ## Crate Position
//!
//! Depends on aria-core, aria-dsp, aria-models. Depended on by the runtime.

#![deny(unsafe_code)]

pub mod config;
pub mod delay;
pub mod engine;
mod kv;

pub use config::MusicGenConfig;
pub use delay::DelayPattern;
pub use engine::MusicGenEngine;
