//! WAV file decoding for the engine.

use crate::defaults::{SAMPLE_RATE, SUPPORTED_AUDIO_FORMATS};
use crate::error::EngineError;
use std::path::Path;

/// Lowercase extension of `path` including the leading dot, or empty.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_lowercase()))
        .unwrap_or_default()
}

/// True if the engine can decode files with this path's extension.
pub fn is_supported(path: &Path) -> bool {
    SUPPORTED_AUDIO_FORMATS.contains(&extension_of(path).as_str())
}

/// Read a WAV file as mono f32 samples at 16kHz, normalized to [-1.0, 1.0].
///
/// Any sample rate and channel count is accepted; channels are averaged and
/// the result is linearly resampled.
pub fn read_wav_file(path: &Path) -> Result<Vec<f32>, EngineError> {
    if !path.exists() {
        return Err(EngineError::FileNotFound {
            path: path.display().to_string(),
        });
    }
    if !is_supported(path) {
        return Err(EngineError::UnsupportedFormat {
            extension: extension_of(path),
        });
    }

    let mut reader = hound::WavReader::open(path)
        .map_err(|e| EngineError::failed(format!("Failed to parse WAV file: {}", e)))?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| EngineError::failed(format!("Failed to read WAV samples: {}", e)))?,
        hound::SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| EngineError::failed(format!("Failed to read WAV samples: {}", e)))?
        }
    };

    let mono = downmix(&interleaved, spec.channels);
    Ok(resample(&mono, spec.sample_rate, SAMPLE_RATE))
}

fn downmix(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let channels = channels as usize;
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Simple linear interpolation resampling.
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let source_pos = i as f64 * ratio;
            let source_idx = source_pos.floor() as usize;
            let fraction = (source_pos - source_idx as f64) as f32;

            if source_idx + 1 >= samples.len() {
                samples[samples.len() - 1]
            } else {
                let left = samples[source_idx];
                let right = samples[source_idx + 1];
                left + (right - left) * fraction
            }
        })
        .collect()
}
