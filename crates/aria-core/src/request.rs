//! Validated generation requests.
//!
//! Raw RPC params are deserialized into [`RawGenerateRequest`] and promoted
//! to a [`GenerateRequest`] by [`RawGenerateRequest::validate`], which
//! applies the per-back-end bounds. Diffusion-only fields are accepted and
//! ignored when the target back-end is autoregressive.

use serde::{Deserialize, Serialize};

use crate::backend::BackendKind;
use crate::errors::{CodedError, ErrorKind};

/// Diffusion step-count bounds.
pub const INFERENCE_STEPS_RANGE: (u32, u32) = (1, 200);
/// Diffusion guidance-scale bounds.
pub const GUIDANCE_SCALE_RANGE: (f32, f32) = (1.0, 30.0);

/// Job priority class.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Appended after all queued jobs of either class.
    #[default]
    Normal,
    /// Inserted before all normal-priority jobs.
    High,
}

/// Diffusion scheduler selector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerKind {
    /// Deterministic ODE, one denoiser call per step.
    #[default]
    Euler,
    /// Deterministic ODE, predictor-corrector, two calls per step.
    Heun,
    /// Stochastic SDE with seeded noise re-injection.
    PingPong,
}

impl SchedulerKind {
    /// Wire tag.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Euler => "euler",
            Self::Heun => "heun",
            Self::PingPong => "pingpong",
        }
    }

    /// Parse a wire tag.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "euler" => Some(Self::Euler),
            "heun" => Some(Self::Heun),
            "pingpong" => Some(Self::PingPong),
            _ => None,
        }
    }
}

/// Unvalidated `generate` params as they arrive off the wire.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawGenerateRequest {
    /// Text prompt.
    pub prompt: String,
    /// Requested duration in whole seconds.
    pub duration_sec: u32,
    /// Back-end tag; daemon default when omitted.
    pub backend: Option<String>,
    /// PRNG seed; drawn from OS entropy when omitted.
    pub seed: Option<u64>,
    /// Priority tag (`normal` / `high`).
    pub priority: Option<String>,
    /// Diffusion-only: denoising step count.
    pub inference_steps: Option<u32>,
    /// Diffusion-only: scheduler tag.
    pub scheduler: Option<String>,
    /// Diffusion-only: CFG scale.
    pub guidance_scale: Option<f32>,
}

/// Diffusion-specific knobs after validation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiffusionParams {
    /// Denoising step count.
    pub inference_steps: u32,
    /// Scheduler variant.
    pub scheduler: SchedulerKind,
    /// Classifier-free guidance scale.
    pub guidance_scale: f32,
}

/// A fully validated generation request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// Text prompt (non-empty, within the back-end's length bound).
    pub prompt: String,
    /// Duration in seconds (within the back-end's range).
    pub duration_sec: u32,
    /// Target back-end.
    pub backend: BackendKind,
    /// PRNG seed (always concrete after validation).
    pub seed: u64,
    /// Priority class.
    pub priority: Priority,
    /// Diffusion knobs; populated only for the diffusion back-end.
    pub diffusion: Option<DiffusionParams>,
}

/// Defaults applied when diffusion knobs are omitted.
#[derive(Clone, Copy, Debug)]
pub struct DiffusionDefaults {
    /// Default step count.
    pub steps: u32,
    /// Default scheduler.
    pub scheduler: SchedulerKind,
    /// Default guidance scale.
    pub guidance: f32,
}

impl Default for DiffusionDefaults {
    fn default() -> Self {
        Self {
            steps: 60,
            scheduler: SchedulerKind::Euler,
            guidance: 15.0,
        }
    }
}

impl RawGenerateRequest {
    /// Validate against `default_backend` and the per-back-end bounds.
    ///
    /// `seed_source` supplies a seed when the request omits one; the caller
    /// passes OS entropy in production and a constant in tests.
    pub fn validate(
        self,
        default_backend: BackendKind,
        defaults: DiffusionDefaults,
        seed_source: impl FnOnce() -> u64,
    ) -> Result<GenerateRequest, CodedError> {
        let backend = match self.backend.as_deref() {
            None => default_backend,
            Some(tag) => BackendKind::parse(tag).ok_or_else(|| {
                CodedError::new(ErrorKind::InvalidBackend, format!("unknown backend '{tag}'"))
            })?,
        };

        let limits = backend.limits();

        let prompt = self.prompt.trim().to_owned();
        if prompt.is_empty() {
            return Err(CodedError::new(ErrorKind::InvalidPrompt, "prompt must not be empty"));
        }
        if prompt.chars().count() > limits.prompt_max_chars {
            return Err(CodedError::new(
                ErrorKind::InvalidPrompt,
                format!("prompt exceeds {} characters", limits.prompt_max_chars),
            ));
        }

        if self.duration_sec < limits.min_duration_sec || self.duration_sec > limits.max_duration_sec {
            return Err(CodedError::new(
                ErrorKind::InvalidDuration,
                format!(
                    "duration_sec must be {}-{} for {}",
                    limits.min_duration_sec,
                    limits.max_duration_sec,
                    backend.tag()
                ),
            ));
        }

        let priority = match self.priority.as_deref() {
            None | Some("normal") => Priority::Normal,
            Some("high") => Priority::High,
            // Unknown priority tags degrade to normal rather than rejecting;
            // priority is advisory.
            Some(_) => Priority::Normal,
        };

        let diffusion = match backend {
            // The AR back-end ignores diffusion-only fields entirely.
            BackendKind::MusicGen => None,
            BackendKind::AceStep => {
                let inference_steps = self.inference_steps.unwrap_or(defaults.steps);
                if inference_steps < INFERENCE_STEPS_RANGE.0 || inference_steps > INFERENCE_STEPS_RANGE.1 {
                    return Err(CodedError::new(
                        ErrorKind::InvalidInferenceSteps,
                        format!(
                            "inference_steps must be {}-{}",
                            INFERENCE_STEPS_RANGE.0, INFERENCE_STEPS_RANGE.1
                        ),
                    ));
                }

                let scheduler = match self.scheduler.as_deref() {
                    None => defaults.scheduler,
                    Some(tag) => SchedulerKind::parse(tag).ok_or_else(|| {
                        CodedError::new(
                            ErrorKind::InvalidScheduler,
                            format!("unknown scheduler '{tag}' (euler|heun|pingpong)"),
                        )
                    })?,
                };

                let guidance_scale = self.guidance_scale.unwrap_or(defaults.guidance);
                if !(GUIDANCE_SCALE_RANGE.0..=GUIDANCE_SCALE_RANGE.1).contains(&guidance_scale) {
                    return Err(CodedError::new(
                        ErrorKind::InvalidGuidanceScale,
                        format!(
                            "guidance_scale must be {:.1}-{:.1}",
                            GUIDANCE_SCALE_RANGE.0, GUIDANCE_SCALE_RANGE.1
                        ),
                    ));
                }

                Some(DiffusionParams {
                    inference_steps,
                    scheduler,
                    guidance_scale,
                })
            }
        };

        Ok(GenerateRequest {
            prompt,
            duration_sec: self.duration_sec,
            backend,
            seed: self.seed.unwrap_or_else(seed_source),
            priority,
            diffusion,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn raw(prompt: &str, duration: u32) -> RawGenerateRequest {
        RawGenerateRequest {
            prompt: prompt.into(),
            duration_sec: duration,
            ..Default::default()
        }
    }

    fn validate(r: RawGenerateRequest) -> Result<GenerateRequest, CodedError> {
        r.validate(BackendKind::MusicGen, DiffusionDefaults::default(), || 99)
    }

    #[test]
    fn accepts_valid_ar_request() {
        let req = validate(raw("lofi hip hop, jazzy piano", 10)).unwrap();
        assert_eq!(req.backend, BackendKind::MusicGen);
        assert_eq!(req.seed, 99, "seed filled from source when omitted");
        assert!(req.diffusion.is_none());
    }

    #[test]
    fn explicit_seed_wins_over_source() {
        let mut r = raw("p", 10);
        r.seed = Some(42);
        assert_eq!(validate(r).unwrap().seed, 42);
    }

    #[test]
    fn rejects_empty_and_whitespace_prompt() {
        assert_matches!(validate(raw("", 10)), Err(e) if e.kind == ErrorKind::InvalidPrompt);
        assert_matches!(validate(raw("   ", 10)), Err(e) if e.kind == ErrorKind::InvalidPrompt);
    }

    #[test]
    fn rejects_overlong_prompt_per_backend() {
        let long = "x".repeat(1001);
        assert_matches!(validate(raw(&long, 10)), Err(e) if e.kind == ErrorKind::InvalidPrompt);
        // 513 chars is fine for AR but too long for diffusion
        let mid = "x".repeat(513);
        assert!(validate(raw(&mid, 10)).is_ok());
        let mut r = raw(&mid, 10);
        r.backend = Some("ace_step".into());
        assert_matches!(validate(r), Err(e) if e.kind == ErrorKind::InvalidPrompt);
    }

    #[test]
    fn ar_duration_boundaries() {
        for (dur, ok) in [(4, false), (5, true), (120, true), (121, false)] {
            let result = validate(raw("p", dur));
            assert_eq!(result.is_ok(), ok, "duration {dur}");
            if !ok {
                assert_matches!(result, Err(e) if e.kind == ErrorKind::InvalidDuration);
            }
        }
    }

    #[test]
    fn diffusion_duration_boundaries() {
        for (dur, ok) in [(4, false), (5, true), (240, true), (241, false)] {
            let mut r = raw("p", dur);
            r.backend = Some("ace_step".into());
            assert_eq!(validate(r).is_ok(), ok, "duration {dur}");
        }
    }

    #[test]
    fn diffusion_steps_boundaries() {
        for (steps, ok) in [(0, false), (1, true), (200, true), (201, false)] {
            let mut r = raw("p", 30);
            r.backend = Some("ace_step".into());
            r.inference_steps = Some(steps);
            let result = validate(r);
            assert_eq!(result.is_ok(), ok, "steps {steps}");
            if !ok {
                assert_matches!(result, Err(e) if e.kind == ErrorKind::InvalidInferenceSteps);
            }
        }
    }

    #[test]
    fn diffusion_defaults_applied() {
        let mut r = raw("p", 30);
        r.backend = Some("ace_step".into());
        let d = validate(r).unwrap().diffusion.unwrap();
        assert_eq!(d.inference_steps, 60);
        assert_eq!(d.scheduler, SchedulerKind::Euler);
        assert!((d.guidance_scale - 15.0).abs() < f32::EPSILON);
    }

    #[test]
    fn guidance_scale_bounds() {
        for (scale, ok) in [(0.9, false), (1.0, true), (30.0, true), (30.1, false)] {
            let mut r = raw("p", 30);
            r.backend = Some("ace_step".into());
            r.guidance_scale = Some(scale);
            assert_eq!(validate(r).is_ok(), ok, "scale {scale}");
        }
    }

    #[test]
    fn unknown_scheduler_rejected() {
        let mut r = raw("p", 30);
        r.backend = Some("ace_step".into());
        r.scheduler = Some("ddim".into());
        assert_matches!(validate(r), Err(e) if e.kind == ErrorKind::InvalidScheduler);
    }

    #[test]
    fn ar_ignores_diffusion_fields() {
        let mut r = raw("p", 10);
        r.inference_steps = Some(0); // would be invalid for diffusion
        r.scheduler = Some("ddim".into()); // would be invalid for diffusion
        let req = validate(r).unwrap();
        assert!(req.diffusion.is_none());
    }

    #[test]
    fn unknown_backend_rejected() {
        let mut r = raw("p", 10);
        r.backend = Some("jukebox".into());
        assert_matches!(validate(r), Err(e) if e.kind == ErrorKind::InvalidBackend);
    }

    #[test]
    fn priority_parsing() {
        let mut r = raw("p", 10);
        r.priority = Some("high".into());
        assert_eq!(validate(r).unwrap().priority, Priority::High);

        let mut r = raw("p", 10);
        r.priority = Some("urgent".into());
        assert_eq!(validate(r).unwrap().priority, Priority::Normal);
    }

    #[test]
    fn scheduler_tags_round_trip() {
        for s in [SchedulerKind::Euler, SchedulerKind::Heun, SchedulerKind::PingPong] {
            assert_eq!(SchedulerKind::parse(s.tag()), Some(s));
        }
    }
}
