//! Flow-matching noise schedule and the three sampler step rules.
//!
//! The denoiser predicts velocity `v` at noise level σ; the schedule runs
//! σ from 1 down to 0 over `S` inference steps with a timestep shift that
//! spends more steps in the high-noise region. Euler and Heun integrate the
//! ODE deterministically; PingPong predicts the clean latent and re-noises
//! it from the job's seeded PRNG, so a fixed `(seed, steps, scheduler)`
//! still determines the trajectory on one device — bit-exactness across
//! execution providers is not promised because reduction order differs.

use rand::rngs::StdRng;
use rand_distr::{Distribution, StandardNormal};

/// Precomputed σ ladder for one generation (ephemeral per job).
#[derive(Clone, Debug)]
pub struct Schedule {
    sigmas: Vec<f32>,
}

impl Schedule {
    /// Build a shifted schedule with `steps` integration steps.
    ///
    /// `sigmas` has `steps + 1` entries; the last is exactly 0.
    pub fn new(steps: u32, shift: f32) -> Self {
        let steps = steps.max(1) as usize;
        let mut sigmas = Vec::with_capacity(steps + 1);
        for i in 0..=steps {
            let linear = 1.0 - i as f32 / steps as f32;
            sigmas.push(shift * linear / (1.0 + (shift - 1.0) * linear));
        }
        sigmas[steps] = 0.0;
        Self { sigmas }
    }

    /// Number of integration steps.
    pub fn steps(&self) -> u32 {
        (self.sigmas.len() - 1) as u32
    }

    /// σ at step `i` (0 ≤ i ≤ steps).
    pub fn sigma(&self, i: u32) -> f32 {
        self.sigmas[i as usize]
    }

    /// Denoiser timestep for step `i` (σ scaled to the model's 0–1000 range).
    pub fn timestep(&self, i: u32) -> f32 {
        self.sigma(i) * 1000.0
    }

    /// σ advance for step `i` (negative).
    pub fn dt(&self, i: u32) -> f32 {
        self.sigma(i + 1) - self.sigma(i)
    }
}

/// One explicit Euler step: `x ← x + dt·v`.
pub fn euler_step(latent: &mut [f32], velocity: &[f32], dt: f32) {
    debug_assert_eq!(latent.len(), velocity.len());
    for (x, &v) in latent.iter_mut().zip(velocity) {
        *x += dt * v;
    }
}

/// Heun corrector: average the predictor and corrector slopes.
///
/// The caller has already taken the predictor Euler step to obtain `v2`;
/// this rewinds it and applies the trapezoidal update from the original
/// latent `x0_latent`.
pub fn heun_step(latent: &mut [f32], x0_latent: &[f32], v1: &[f32], v2: &[f32], dt: f32) {
    debug_assert_eq!(latent.len(), x0_latent.len());
    for (((x, &x0), &a), &b) in latent.iter_mut().zip(x0_latent).zip(v1).zip(v2) {
        *x = x0 + dt * 0.5 * (a + b);
    }
}

/// PingPong step: jump to the clean-latent prediction, then re-noise to the
/// next σ with fresh Gaussian noise from the job PRNG.
pub fn pingpong_step(
    latent: &mut [f32],
    velocity: &[f32],
    sigma: f32,
    sigma_next: f32,
    rng: &mut StdRng,
) {
    debug_assert_eq!(latent.len(), velocity.len());
    for (x, &v) in latent.iter_mut().zip(velocity) {
        let denoised = *x - sigma * v;
        let noise: f32 = StandardNormal.sample(rng);
        *x = (1.0 - sigma_next) * denoised + sigma_next * noise;
    }
}

/// Seeded Gaussian latent initialization.
pub fn gaussian_latent(elements: usize, rng: &mut StdRng) -> Vec<f32> {
    (0..elements).map(|_| StandardNormal.sample(rng)).collect()
}
