//! Model configuration for the MusicGen-small ONNX export.

/// Decoder and codec geometry plus sampling constants.
///
/// These describe the exported graphs; changing them without re-exporting
/// the models produces shape errors at session run time.
#[derive(Clone, Copy, Debug)]
pub struct MusicGenConfig {
    /// Decoder hidden size.
    pub hidden_size: usize,
    /// Decoder layer count.
    pub num_layers: usize,
    /// Attention head count.
    pub num_heads: usize,
    /// Per-head dimension.
    pub head_dim: usize,
    /// Parallel codebook streams.
    pub num_codebooks: usize,
    /// Audio-token vocabulary size (logit width).
    pub vocab_size: usize,
    /// Padding / decoder-start token id.
    pub pad_token_id: i64,
    /// Codec output sample rate.
    pub sample_rate: u32,
    /// Token frames per second of audio.
    pub tokens_per_second: u32,
    /// Classifier-free guidance scale.
    pub guidance_scale: f32,
    /// Top-k sampling cutoff.
    pub top_k: usize,
    /// Sampling temperature.
    pub temperature: f32,
}

impl Default for MusicGenConfig {
    fn default() -> Self {
        Self {
            hidden_size: 1024,
            num_layers: 24,
            num_heads: 16,
            head_dim: 64,
            num_codebooks: 4,
            vocab_size: 2048,
            pad_token_id: 2048,
            sample_rate: 32_000,
            tokens_per_second: 50,
            guidance_scale: 3.0,
            top_k: 250,
            temperature: 1.0,
        }
    }
}

impl MusicGenConfig {
    /// Token frames for a requested duration: `ceil(duration × 50)`.
    pub fn frames_for_duration(&self, duration_sec: u32) -> u32 {
        duration_sec * self.tokens_per_second
    }

    /// CFG batch rows: (conditional + unconditional) × codebooks.
    pub fn batch_rows(&self) -> usize {
        2 * self.num_codebooks
    }
}
