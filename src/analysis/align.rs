//! Time alignment by cross-correlation
//!
//! The offset between a tested recording and its reference is the lag of the
//! maximum of the cross-correlation of their envelopes (absolute values).
//! Both inputs are zero-padded on the right to the same length first; padding
//! scales the correlation but does not move the global maximum.

use std::ops::Range;

use log::{debug, info, warn};
use rustfft::{num_complex::Complex, FftPlanner};
use serde::{Deserialize, Serialize};

use crate::audio::AudioBuffer;

/// Above this padded length the correlation is computed in the frequency domain
const DIRECT_CORRELATION_MAX_LEN: usize = 2048;

/// How the sign of the correlation lag is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignConvention {
    /// Positive offset always means the tested signal lags the reference
    #[default]
    TestedLag,
    /// Same as `TestedLag`, but the sign is inverted when the reference input
    /// is longer than the tested input. Kept for parity with historical
    /// result tables.
    FlipWhenReferenceLonger,
}

/// Offset found between a tested and a reference signal
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlignmentResult {
    /// Lag in samples; positive when the tested signal lags the reference
    pub offset: i64,
    /// Value of the correlation maximum
    pub peak: f64,
}

impl AlignmentResult {
    /// Offset converted to milliseconds
    pub fn offset_ms(&self, sample_rate: u32) -> f64 {
        self.offset as f64 * 1000.0 / sample_rate as f64
    }
}

/// Estimates and applies the offset between tested and reference buffers
#[derive(Debug, Clone, Default)]
pub struct Aligner {
    convention: SignConvention,
}

impl Aligner {
    pub fn new(convention: SignConvention) -> Self {
        Self { convention }
    }

    pub fn convention(&self) -> SignConvention {
        self.convention
    }

    /// Offset and correlation peak between two signals
    ///
    /// The first lag attaining the maximum wins. A correlation that is zero
    /// everywhere (one of the inputs is silent) yields offset 0.
    pub fn compute_correlation(&self, tested: &[f32], reference: &[f32]) -> AlignmentResult {
        let padded_len = tested.len().max(reference.len());
        if padded_len == 0 {
            return AlignmentResult { offset: 0, peak: 0.0 };
        }

        let tested_env = envelope(tested, padded_len);
        let reference_env = envelope(reference, padded_len);

        let correlation = if padded_len <= DIRECT_CORRELATION_MAX_LEN {
            cross_correlate_direct(&tested_env, &reference_env)
        } else {
            cross_correlate_fft(&tested_env, &reference_env)
        };

        let (argmax, peak) = first_argmax(&correlation);
        if peak <= 0.0 {
            warn!("degenerate correlation (no energy in one of the signals), offset set to 0");
            return AlignmentResult { offset: 0, peak: 0.0 };
        }

        let mut offset = argmax as i64 - (padded_len as i64 - 1);
        if self.convention == SignConvention::FlipWhenReferenceLonger
            && reference.len() > tested.len()
        {
            offset = -offset;
        }

        AlignmentResult { offset, peak }
    }

    /// Align `tested` on `reference`
    ///
    /// The correlation is searched inside `interval_ms` when given, which
    /// should cover speech: long silent runs produce spurious peaks. The
    /// aligned signals are then written from `start_time_ms` on: the reference
    /// is cut at the start, the tested signal is shifted by the offset (leading
    /// samples dropped when it lags, zeros prepended when it leads) and cut at
    /// the same start.
    ///
    /// Returns `None` when either buffer has no data; nothing is written then.
    pub fn align(
        &self,
        tested: &mut AudioBuffer,
        reference: &mut AudioBuffer,
        start_time_ms: u32,
        interval_ms: Option<(u32, u32)>,
    ) -> Option<AlignmentResult> {
        if tested.is_empty() || reference.is_empty() {
            warn!("cannot align: tested or reference signal has no data");
            return None;
        }

        let rate = tested.sample_rate();
        let window = match interval_ms {
            Some((from, to)) => {
                let window = ms_window(from, to, rate, tested.len());
                info!(
                    "try to align between samples [{}-{}] ({}-{} ms)",
                    window.start, window.end, from, to
                );
                if window.is_empty() {
                    warn!("alignment interval is outside the tested signal, using the whole signal");
                    0..tested.len()
                } else {
                    window
                }
            }
            None => {
                info!("try to align whole signal");
                0..tested.len()
            }
        };

        let reference_window = window.start.min(reference.len())..window.end.min(reference.len());
        let result = self.compute_correlation(
            &tested.samples()[window.clone()],
            &reference.samples()[reference_window],
        );
        info!(
            "maximum correlation found at {} samples ({:.0} ms) with value {:.1}",
            result.offset,
            result.offset_ms(rate),
            result.peak
        );

        let start = ms_to_samples(start_time_ms, rate);
        reference.set_aligned(tail(reference.samples(), start).to_vec());
        let shifted = shift(tested.samples(), result.offset);
        tested.set_aligned(tail(&shifted, start).to_vec());
        debug!(
            "aligned sizes: tested {}, reference {}",
            tested.aligned().map_or(0, |a| a.len()),
            reference.aligned().map_or(0, |a| a.len())
        );

        Some(result)
    }
}

/// Truncate the aligned signal of every buffer to the shortest one
///
/// Buffers that were not aligned are ignored.
pub fn truncate_to_shortest(buffers: &mut [&mut AudioBuffer]) {
    let Some(new_size) = buffers
        .iter()
        .filter_map(|b| b.aligned().map(|a| a.len()))
        .min()
    else {
        return;
    };
    info!("set aligned size to {} for all audio signals", new_size);
    for buffer in buffers.iter_mut() {
        buffer.truncate_aligned(new_size);
    }
}

/// Convert milliseconds to a sample index
pub fn ms_to_samples(ms: u32, sample_rate: u32) -> usize {
    (ms as u64 * sample_rate as u64 / 1000) as usize
}

/// Half-open sample window for `[from_ms, to_ms)`, clamped to `len`
pub fn ms_window(from_ms: u32, to_ms: u32, sample_rate: u32, len: usize) -> Range<usize> {
    let stop = ms_to_samples(to_ms, sample_rate).min(len);
    let start = ms_to_samples(from_ms, sample_rate).min(stop);
    start..stop
}

/// Shift a signal by `offset` samples
///
/// Positive offsets drop leading samples; negative offsets prepend zeros.
pub fn shift(samples: &[f32], offset: i64) -> Vec<f32> {
    if offset >= 0 {
        tail(samples, offset as usize).to_vec()
    } else {
        let pad = offset.unsigned_abs() as usize;
        let mut shifted = Vec::with_capacity(pad + samples.len());
        shifted.resize(pad, 0.0);
        shifted.extend_from_slice(samples);
        shifted
    }
}

fn tail(samples: &[f32], start: usize) -> &[f32] {
    &samples[start.min(samples.len())..]
}

fn envelope(samples: &[f32], padded_len: usize) -> Vec<f64> {
    let mut env: Vec<f64> = samples.iter().map(|s| s.abs() as f64).collect();
    env.resize(padded_len, 0.0);
    env
}

/// Full cross-correlation, index `j` holding lag `j - (n - 1)`:
/// `c[lag] = sum_i tested[i + lag] * reference[i]`
fn cross_correlate_direct(tested: &[f64], reference: &[f64]) -> Vec<f64> {
    let n = tested.len();
    let mut correlation = vec![0.0; 2 * n - 1];
    for (j, value) in correlation.iter_mut().enumerate() {
        let lag = j as i64 - (n as i64 - 1);
        let (t_start, r_start) = if lag >= 0 {
            (lag as usize, 0)
        } else {
            (0, lag.unsigned_abs() as usize)
        };
        let count = n - t_start.max(r_start);
        *value = tested[t_start..t_start + count]
            .iter()
            .zip(&reference[r_start..r_start + count])
            .map(|(t, r)| t * r)
            .sum();
    }
    correlation
}

fn cross_correlate_fft(tested: &[f64], reference: &[f64]) -> Vec<f64> {
    let n = tested.len();
    let fft_len = (2 * n - 1).next_power_of_two();

    let mut planner = FftPlanner::<f64>::new();
    let forward = planner.plan_fft_forward(fft_len);
    let inverse = planner.plan_fft_inverse(fft_len);

    let to_complex = |signal: &[f64]| {
        let mut buffer: Vec<Complex<f64>> = signal.iter().map(|&s| Complex::new(s, 0.0)).collect();
        buffer.resize(fft_len, Complex::new(0.0, 0.0));
        buffer
    };
    let mut spectrum = to_complex(tested);
    let mut reference_spectrum = to_complex(reference);
    forward.process(&mut spectrum);
    forward.process(&mut reference_spectrum);

    for (t, r) in spectrum.iter_mut().zip(&reference_spectrum) {
        *t *= r.conj();
    }
    inverse.process(&mut spectrum);

    let scale = 1.0 / fft_len as f64;
    (0..2 * n - 1)
        .map(|j| {
            let lag = j as i64 - (n as i64 - 1);
            let index = if lag >= 0 {
                lag as usize
            } else {
                fft_len - lag.unsigned_abs() as usize
            };
            spectrum[index].re * scale
        })
        .collect()
}

fn first_argmax(values: &[f64]) -> (usize, f64) {
    let mut best = (0, f64::NEG_INFINITY);
    for (i, &v) in values.iter().enumerate() {
        if v > best.1 {
            best = (i, v);
        }
    }
    best
}
