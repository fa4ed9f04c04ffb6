//! High-quality sinc resampling for the diffusion pipeline's 44.1 → 48 kHz
//! output stage.
//!
//! Wraps `rubato::SincFixedIn` with fixed-chunk feeding and a partial flush
//! so arbitrary-length mono buffers come out at the exact target ratio.

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::DspError;

/// Frames fed to the resampler per call.
const CHUNK_SIZE: usize = 1024;

/// Resample a mono buffer from 44.1 kHz to 48 kHz.
pub fn resample_44100_to_48000(samples: &[f32]) -> Result<Vec<f32>, DspError> {
    resample(samples, 44_100, 48_000)
}

/// Resample a mono buffer between arbitrary rates.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>, DspError> {
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let ratio = f64::from(to_rate) / f64::from(from_rate);
    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, CHUNK_SIZE, 1)
        .map_err(|e| DspError::Resample(e.to_string()))?;

    let mut out = Vec::with_capacity((samples.len() as f64 * ratio) as usize + CHUNK_SIZE);
    let mut offset = 0usize;

    while samples.len() - offset >= CHUNK_SIZE {
        let chunk = &samples[offset..offset + CHUNK_SIZE];
        let produced = resampler
            .process(&[chunk.to_vec()], None)
            .map_err(|e| DspError::Resample(e.to_string()))?;
        out.extend_from_slice(&produced[0]);
        offset += CHUNK_SIZE;
    }

    if offset < samples.len() {
        let tail = samples[offset..].to_vec();
        let produced = resampler
            .process_partial(Some(&[tail]), None)
            .map_err(|e| DspError::Resample(e.to_string()))?;
        out.extend_from_slice(&produced[0]);
    }

    // Drain the filter's internal delay line.
    let produced = resampler
        .process_partial::<Vec<f32>>(None, None)
        .map_err(|e| DspError::Resample(e.to_string()))?;
    out.extend_from_slice(&produced[0]);

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_rate_is_passthrough() {
        let input: Vec<f32> = (0..1000).map(|i| (i as f32 * 0.01).sin()).collect();
        let out = resample(&input, 44_100, 44_100).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn empty_input_is_empty_output() {
        assert!(resample_44100_to_48000(&[]).unwrap().is_empty());
    }

    #[test]
    fn output_length_matches_ratio() {
        // 1 second at 44.1 kHz should come out at roughly 1 second at 48 kHz.
        let input = vec![0.25f32; 44_100];
        let out = resample_44100_to_48000(&input).unwrap();
        let expected = 48_000.0f64;
        let tolerance = 0.02 * expected; // filter edges cost a couple hundred frames
        assert!(
            ((out.len() as f64) - expected).abs() < tolerance,
            "got {} frames, expected ~{expected}",
            out.len()
        );
    }

    #[test]
    fn preserves_amplitude_of_a_low_tone() {
        // A 440 Hz tone is far below Nyquist at both rates; peak amplitude
        // should survive the passband.
        let input: Vec<f32> = (0..44_100)
            .map(|i| (i as f32 / 44_100.0 * 440.0 * std::f32::consts::TAU).sin() * 0.8)
            .collect();
        let out = resample_44100_to_48000(&input).unwrap();
        let peak = out.iter().fold(0.0f32, |m, &s| m.max(s.abs()));
        assert!((peak - 0.8).abs() < 0.05, "peak {peak}");
    }
}
