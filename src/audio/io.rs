//! WAV file I/O
//!
//! Recordings are mono PCM WAV files. Integer samples are scaled to -1.0..1.0
//! on read; writes are always PCM-16.

use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use log::debug;

use crate::error::{CompareError, Result};

/// Decoded mono WAV contents
#[derive(Debug, Clone)]
pub struct WavData {
    /// Samples scaled to -1.0..1.0
    pub samples: Vec<f32>,
    /// Native sample rate of the file in Hz
    pub sample_rate: u32,
}

/// Read a mono WAV file at its native sample rate
///
/// # Errors
/// * `FileNotFound` - If the file does not exist
/// * `AudioRead` - If the file is not a valid WAV file
/// * `UnsupportedFormat` - If the file has more than one channel
pub fn read_mono_wav(path: &Path) -> Result<WavData> {
    if !path.exists() {
        return Err(CompareError::FileNotFound {
            path: path.display().to_string(),
        });
    }

    let reader = WavReader::open(path).map_err(|e| CompareError::AudioRead {
        path: path.display().to_string(),
        source: e,
    })?;

    let spec = reader.spec();
    if spec.channels != 1 {
        return Err(CompareError::UnsupportedFormat {
            details: format!(
                "{}: {}-channel audio (only mono recordings are compared)",
                path.display(),
                spec.channels
            ),
        });
    }

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .map(|s| {
                s.map_err(|e| CompareError::AudioRead {
                    path: path.display().to_string(),
                    source: e,
                })
            })
            .collect::<Result<Vec<f32>>>()?,
        SampleFormat::Int => {
            let max_val = (1u32 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| {
                    s.map(|v| v as f32 / max_val)
                        .map_err(|e| CompareError::AudioRead {
                            path: path.display().to_string(),
                            source: e,
                        })
                })
                .collect::<Result<Vec<f32>>>()?
        }
    };

    debug!(
        "read {}: {} samples at {} Hz ({}-bit {:?})",
        path.display(),
        samples.len(),
        spec.sample_rate,
        spec.bits_per_sample,
        spec.sample_format
    );

    Ok(WavData {
        samples,
        sample_rate: spec.sample_rate,
    })
}

/// Write samples to a mono PCM-16 WAV file
///
/// Samples outside -1.0..1.0 are clamped.
pub fn write_pcm16_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let write_err = |e: hound::Error| CompareError::AudioWrite {
        path: path.display().to_string(),
        source: e,
    };

    let mut writer = WavWriter::create(path, spec).map_err(write_err)?;
    for &sample in samples {
        let scaled = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
        writer.write_sample(scaled).map_err(write_err)?;
    }
    writer.finalize().map_err(write_err)?;

    Ok(())
}
