//! Model configuration for the ACE-Step ONNX export.

/// Latent geometry and audio constants.
#[derive(Clone, Copy, Debug)]
pub struct AceStepConfig {
    /// Latent channel count.
    pub latent_channels: usize,
    /// Latent height (frequency bins in latent space).
    pub latent_height: usize,
    /// Audio samples represented by one latent frame (512 × 8).
    pub samples_per_frame: u32,
    /// Sample rate the vocoder emits.
    pub native_sample_rate: u32,
    /// Sample rate of the finished artifact (after resample).
    pub output_sample_rate: u32,
    /// Timestep-shift factor of the flow schedule.
    pub schedule_shift: f32,
}

impl Default for AceStepConfig {
    fn default() -> Self {
        Self {
            latent_channels: 8,
            latent_height: 16,
            samples_per_frame: 512 * 8,
            native_sample_rate: 44_100,
            output_sample_rate: 48_000,
            schedule_shift: 3.0,
        }
    }
}

impl AceStepConfig {
    /// Latent frames for a duration: `floor(duration × 44100 / 4096)`.
    ///
    /// ≈ 10.77 frames per second of audio.
    pub fn frames_for_duration(&self, duration_sec: u32) -> u32 {
        duration_sec * self.native_sample_rate / self.samples_per_frame
    }

    /// Element count of the `(1, C, H, F)` latent tensor.
    pub fn latent_elements(&self, frames: u32) -> usize {
        self.latent_channels * self.latent_height * frames as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_export() {
        let c = AceStepConfig::default();
        assert_eq!(c.latent_channels, 8);
        assert_eq!(c.latent_height, 16);
        assert_eq!(c.samples_per_frame, 4096);
        assert_eq!(c.native_sample_rate, 44_100);
        assert_eq!(c.output_sample_rate, 48_000);
    }

    #[test]
    fn frame_rate_is_about_ten_point_seven_seven() {
        let c = AceStepConfig::default();
        // 120 s → floor(120 × 44100 / 4096) = 1292
        assert_eq!(c.frames_for_duration(120), 1292);
        assert_eq!(c.frames_for_duration(10), 107);
    }

    #[test]
    fn latent_element_count() {
        let c = AceStepConfig::default();
        assert_eq!(c.latent_elements(107), 8 * 16 * 107);
    }
}
