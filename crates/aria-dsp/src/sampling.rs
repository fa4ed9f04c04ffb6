//! Logit sampling primitives.
//!
//! All randomness flows through a caller-owned [`rand::rngs::StdRng`] seeded
//! per job, so a fixed (seed, prompt, duration) tuple replays the exact same
//! token trajectory on the same machine.

use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::DspError;

/// Seeded PRNG for one generation job.
pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Numerically stable softmax (max-subtracted).
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let mut out = logits.to_vec();
    softmax_in_place(&mut out);
    out
}

/// In-place variant of [`softmax`].
pub fn softmax_in_place(values: &mut [f32]) {
    if values.is_empty() {
        return;
    }
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0f32;
    for v in values.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    if sum > 0.0 {
        for v in values.iter_mut() {
            *v /= sum;
        }
    }
}

/// Index of the largest element. Ties resolve to the first occurrence.
pub fn argmax(values: &[f32]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)
}

/// Draw an index from a probability vector.
pub fn multinomial(probs: &[f32], rng: &mut StdRng) -> Result<usize, DspError> {
    if probs.is_empty() {
        return Err(DspError::InvalidInput("empty probability vector".into()));
    }
    let dist = WeightedIndex::new(probs.iter().copied())
        .map_err(|e| DspError::InvalidInput(format!("multinomial weights: {e}")))?;
    Ok(dist.sample(rng))
}

/// Top-k + temperature sampling over a logit row.
///
/// Keeps the `k` largest logits, applies temperature, softmaxes the
/// survivors, and draws one index from the resulting distribution.
/// `temperature == 0.0` degenerates to argmax.
pub fn sample_top_k(
    logits: &[f32],
    k: usize,
    temperature: f32,
    rng: &mut StdRng,
) -> Result<usize, DspError> {
    if logits.is_empty() {
        return Err(DspError::InvalidInput("empty logit row".into()));
    }
    if temperature <= 0.0 {
        return argmax(logits).ok_or_else(|| DspError::InvalidInput("empty logit row".into()));
    }

    let k = k.max(1).min(logits.len());
    let mut indexed: Vec<(usize, f32)> = logits.iter().copied().enumerate().collect();
    indexed.sort_unstable_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    indexed.truncate(k);

    let mut scaled: Vec<f32> = indexed.iter().map(|&(_, v)| v / temperature).collect();
    softmax_in_place(&mut scaled);

    let chosen = multinomial(&scaled, rng)?;
    Ok(indexed[chosen].0)
}
