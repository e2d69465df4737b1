//! Signal-to-noise ratio between two recordings

use std::path::Path;

use log::{debug, info};

use crate::analysis::align::ms_window;
use crate::audio::read_mono_wav;
use crate::error::{CompareError, Result};

/// SNR in dB between `signal` and `noise`
///
/// Both signals are cut to `interval_ms` when given, otherwise to the length of
/// the shorter one. `noise_gain` scales the noise before its power is taken.
///
/// # Errors
/// * `EmptySignal` - If the analysed window is empty
pub fn snr_db(
    signal: &[f32],
    noise: &[f32],
    sample_rate: u32,
    interval_ms: Option<(u32, u32)>,
    noise_gain: f64,
) -> Result<f64> {
    let shortest = signal.len().min(noise.len());
    let window = match interval_ms {
        Some((from, to)) => ms_window(from, to, sample_rate, shortest),
        None => 0..shortest,
    };
    if window.is_empty() {
        return Err(CompareError::EmptySignal {
            context: format!(
                "SNR window {:?} on signals of {} and {} samples",
                window,
                signal.len(),
                noise.len()
            ),
        });
    }
    if noise_gain != 1.0 {
        debug!("gain applied to noise: {}", noise_gain);
    }

    let signal_power = mean_power(&signal[window.clone()], 1.0);
    let noise_power = mean_power(&noise[window], noise_gain);
    let snr = 10.0 * (signal_power / noise_power).log10();
    info!("SNR = {:.2} dB", snr);
    Ok(snr)
}

/// SNR in dB between two WAV files read at their native rate
///
/// # Errors
/// * `IncompatibleSampleRate` - If the files are not at the same rate
pub fn snr_db_from_files(
    signal_file: &Path,
    noise_file: &Path,
    interval_ms: Option<(u32, u32)>,
    noise_gain: f64,
) -> Result<f64> {
    let signal = read_mono_wav(signal_file)?;
    let noise = read_mono_wav(noise_file)?;
    if signal.sample_rate != noise.sample_rate {
        return Err(CompareError::IncompatibleSampleRate {
            tested: signal.sample_rate,
            reference: noise.sample_rate,
        });
    }
    snr_db(
        &signal.samples,
        &noise.samples,
        signal.sample_rate,
        interval_ms,
        noise_gain,
    )
}

fn mean_power(samples: &[f32], gain: f64) -> f64 {
    samples
        .iter()
        .map(|&s| {
            let v = s as f64 * gain;
            v * v
        })
        .sum::<f64>()
        / samples.len() as f64
}
