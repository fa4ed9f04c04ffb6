//! 16-bit PCM WAV output.
//!
//! Engines produce mono f32 samples in [-1, 1]; the writer clamps, scales
//! to i16, and optionally duplicates the channel for stereo targets.

use std::path::Path;

use crate::DspError;

/// Channel layout for the artifact.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Channels {
    /// Single channel.
    Mono,
    /// Mono source duplicated into both channels.
    StereoDuplicated,
}

/// Write f32 samples as 16-bit PCM WAV.
pub fn write_wav(
    path: &Path,
    samples: &[f32],
    sample_rate: u32,
    channels: Channels,
) -> Result<(), DspError> {
    let spec = hound::WavSpec {
        channels: match channels {
            Channels::Mono => 1,
            Channels::StereoDuplicated => 2,
        },
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec).map_err(|e| DspError::Wav(e.to_string()))?;
    for &sample in samples {
        let quantized = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
        writer
            .write_sample(quantized)
            .map_err(|e| DspError::Wav(e.to_string()))?;
        if channels == Channels::StereoDuplicated {
            writer
                .write_sample(quantized)
                .map_err(|e| DspError::Wav(e.to_string()))?;
        }
    }
    writer.finalize().map_err(|e| DspError::Wav(e.to_string()))
}

/// Read a WAV back to mono f32 (test and cache-verification helper).
///
/// Stereo files are averaged down to mono. Returns samples and sample rate.
pub fn read_wav_mono(path: &Path) -> Result<(Vec<f32>, u32), DspError> {
    let mut reader = hound::WavReader::open(path).map_err(|e| DspError::Wav(e.to_string()))?;
    let spec = reader.spec();
    let raw: Vec<i16> = reader
        .samples::<i16>()
        .collect::<Result<_, _>>()
        .map_err(|e| DspError::Wav(e.to_string()))?;

    let channels = usize::from(spec.channels.max(1));
    let mut mono = Vec::with_capacity(raw.len() / channels);
    for frame in raw.chunks_exact(channels) {
        let sum: f32 = frame.iter().map(|&s| f32::from(s) / f32::from(i16::MAX)).sum();
        mono.push(sum / channels as f32);
    }
    Ok((mono, spec.sample_rate))
}

/// Duration in seconds of a sample buffer at a given rate.
pub fn duration_sec(sample_count: usize, sample_rate: u32) -> f64 {
    sample_count as f64 / f64::from(sample_rate)
}
