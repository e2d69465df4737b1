//! Mel-frequency cepstral coefficients
//!
//! The processing chain is:
//! 1. Centered framing (the signal is zero-padded by half a frame on each side)
//! 2. Periodic Hann window
//! 3. Power spectrum via FFT
//! 4. Slaney mel filterbank with area normalization
//! 5. Log power in dB, floored at 1e-10 and clamped to `top_db` below the peak
//! 6. Orthonormal DCT-II, keeping the first `n_coefficients`
//!
//! The defaults match the usual speech-analysis settings (20 coefficients,
//! 2048-point frames, hop of 512, 128 mel bands up to Nyquist), so matrices
//! computed here are comparable with the ones stored in existing result
//! directories.

use std::f64::consts::PI;
use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use serde::{Deserialize, Serialize};

use crate::error::{CompareError, Result};

const AMIN: f64 = 1e-10;

/// MFCC extraction parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MfccConfig {
    /// Number of cepstral coefficients kept per frame
    pub n_coefficients: usize,
    /// FFT and frame size in samples
    pub fft_size: usize,
    /// Hop between frames in samples
    pub hop_size: usize,
    /// Number of mel bands
    pub n_mels: usize,
    /// Lowest filterbank frequency in Hz
    pub min_frequency: f64,
    /// Highest filterbank frequency in Hz; Nyquist when unset
    pub max_frequency: Option<f64>,
    /// Dynamic range kept below the loudest mel bin, in dB
    pub top_db: Option<f64>,
}

impl Default for MfccConfig {
    fn default() -> Self {
        Self {
            n_coefficients: 20,
            fft_size: 2048,
            hop_size: 512,
            n_mels: 128,
            min_frequency: 0.0,
            max_frequency: None,
            top_db: Some(80.0),
        }
    }
}

impl MfccConfig {
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| {
            Err(CompareError::InvalidConfig {
                reason: format!("mfcc: {}", reason),
            })
        };
        if self.fft_size < 2 || self.hop_size == 0 {
            return invalid("fft_size must be at least 2 and hop_size positive");
        }
        if self.n_mels == 0 || self.n_coefficients == 0 || self.n_coefficients > self.n_mels {
            return invalid("need 0 < n_coefficients <= n_mels");
        }
        if let Some(max) = self.max_frequency {
            if max <= self.min_frequency {
                return invalid("max_frequency must be above min_frequency");
            }
        }
        if self.min_frequency < 0.0 {
            return invalid("min_frequency must not be negative");
        }
        if matches!(self.top_db, Some(db) if db < 0.0) {
            return invalid("top_db must not be negative");
        }
        Ok(())
    }
}

/// MFCC feature matrix of shape `[n_coefficients x n_frames]`
#[derive(Debug, Clone, PartialEq)]
pub struct MfccMatrix {
    n_coefficients: usize,
    n_frames: usize,
    /// Frame-major: coefficients of frame `f` are `data[f * n_coefficients..]`
    data: Vec<f64>,
}

impl MfccMatrix {
    /// Build from coefficient rows (`rows[c][f]`)
    pub fn from_rows(rows: &[Vec<f64>]) -> Self {
        let n_coefficients = rows.len();
        let n_frames = rows.first().map_or(0, |r| r.len());
        let mut data = vec![0.0; n_coefficients * n_frames];
        for (c, row) in rows.iter().enumerate() {
            for (f, &value) in row.iter().enumerate().take(n_frames) {
                data[f * n_coefficients + c] = value;
            }
        }
        Self {
            n_coefficients,
            n_frames,
            data,
        }
    }

    /// `(n_coefficients, n_frames)`
    pub fn shape(&self) -> (usize, usize) {
        (self.n_coefficients, self.n_frames)
    }

    pub fn n_coefficients(&self) -> usize {
        self.n_coefficients
    }

    pub fn n_frames(&self) -> usize {
        self.n_frames
    }

    /// Coefficient vector of one frame
    pub fn frame(&self, index: usize) -> &[f64] {
        let start = index * self.n_coefficients;
        &self.data[start..start + self.n_coefficients]
    }

    pub fn get(&self, coefficient: usize, frame: usize) -> f64 {
        self.data[frame * self.n_coefficients + coefficient]
    }

    /// Values in coefficient-major order, i.e. the C layout of the
    /// `[n_coefficients x n_frames]` matrix
    pub fn to_row_major(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.data.len());
        for c in 0..self.n_coefficients {
            out.extend((0..self.n_frames).map(|f| self.get(c, f)));
        }
        out
    }
}

/// MFCC extractor with precomputed window, filterbank and DCT basis
pub struct MfccExtractor {
    config: MfccConfig,
    sample_rate: u32,
    window: Vec<f64>,
    /// One `(first_bin, weights)` entry per mel band
    filterbank: Vec<(usize, Vec<f64>)>,
    dct: Vec<Vec<f64>>,
    fft: Arc<dyn Fft<f64>>,
}

impl MfccExtractor {
    pub fn new(config: MfccConfig, sample_rate: u32) -> Result<Self> {
        config.validate()?;
        let max_frequency = config.max_frequency.unwrap_or(sample_rate as f64 / 2.0);
        let filterbank = mel_filterbank(
            sample_rate as f64,
            config.fft_size,
            config.n_mels,
            config.min_frequency,
            max_frequency,
        );
        let window = hann_window(config.fft_size);
        let dct = dct_basis(config.n_coefficients, config.n_mels);
        let fft = FftPlanner::new().plan_fft_forward(config.fft_size);
        Ok(Self {
            config,
            sample_rate,
            window,
            filterbank,
            dct,
            fft,
        })
    }

    pub fn config(&self) -> &MfccConfig {
        &self.config
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of frames produced for a signal of `len` samples
    pub fn frame_count(&self, len: usize) -> usize {
        if len == 0 {
            0
        } else {
            1 + len / self.config.hop_size
        }
    }

    /// MFCC matrix of a signal
    pub fn extract(&self, signal: &[f32]) -> MfccMatrix {
        let n_frames = self.frame_count(signal.len());
        let mel_db = self.log_mel_spectrogram(signal, n_frames);

        let n_coefficients = self.config.n_coefficients;
        let mut data = Vec::with_capacity(n_frames * n_coefficients);
        for frame in mel_db.chunks(self.config.n_mels) {
            for basis in &self.dct {
                data.push(basis.iter().zip(frame).map(|(b, x)| b * x).sum());
            }
        }

        MfccMatrix {
            n_coefficients,
            n_frames,
            data,
        }
    }

    /// Frame-major log-mel spectrogram in dB
    fn log_mel_spectrogram(&self, signal: &[f32], n_frames: usize) -> Vec<f64> {
        let n_fft = self.config.fft_size;
        let pad = n_fft / 2;
        let n_bins = n_fft / 2 + 1;

        let mut buffer = vec![Complex::new(0.0, 0.0); n_fft];
        let mut power = vec![0.0; n_bins];
        let mut mel_db = Vec::with_capacity(n_frames * self.config.n_mels);

        for frame in 0..n_frames {
            let origin = (frame * self.config.hop_size) as i64 - pad as i64;
            for (i, slot) in buffer.iter_mut().enumerate() {
                let index = origin + i as i64;
                let sample = if index >= 0 && (index as usize) < signal.len() {
                    signal[index as usize] as f64
                } else {
                    0.0
                };
                *slot = Complex::new(sample * self.window[i], 0.0);
            }
            self.fft.process(&mut buffer);
            for (p, c) in power.iter_mut().zip(&buffer) {
                *p = c.norm_sqr();
            }

            for (first_bin, weights) in &self.filterbank {
                let energy: f64 = weights
                    .iter()
                    .zip(&power[*first_bin..])
                    .map(|(w, p)| w * p)
                    .sum();
                mel_db.push(10.0 * energy.max(AMIN).log10());
            }
        }

        if let Some(top_db) = self.config.top_db {
            let peak = mel_db.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let floor = peak - top_db;
            for value in &mut mel_db {
                *value = value.max(floor);
            }
        }
        mel_db
    }
}

/// Hz to mel, Slaney scale (linear below 1 kHz, logarithmic above)
pub fn hz_to_mel(hz: f64) -> f64 {
    let f_sp = 200.0 / 3.0;
    let min_log_hz = 1000.0;
    let min_log_mel = min_log_hz / f_sp;
    let logstep = 6.4_f64.ln() / 27.0;
    if hz >= min_log_hz {
        min_log_mel + (hz / min_log_hz).ln() / logstep
    } else {
        hz / f_sp
    }
}

/// Mel to Hz, Slaney scale
pub fn mel_to_hz(mel: f64) -> f64 {
    let f_sp = 200.0 / 3.0;
    let min_log_hz = 1000.0;
    let min_log_mel = min_log_hz / f_sp;
    let logstep = 6.4_f64.ln() / 27.0;
    if mel >= min_log_mel {
        min_log_hz * (logstep * (mel - min_log_mel)).exp()
    } else {
        f_sp * mel
    }
}

fn hann_window(size: usize) -> Vec<f64> {
    (0..size)
        .map(|n| 0.5 - 0.5 * (2.0 * PI * n as f64 / size as f64).cos())
        .collect()
}

fn mel_filterbank(
    sample_rate: f64,
    fft_size: usize,
    n_mels: usize,
    min_frequency: f64,
    max_frequency: f64,
) -> Vec<(usize, Vec<f64>)> {
    let n_bins = fft_size / 2 + 1;
    let fft_freqs: Vec<f64> = (0..n_bins)
        .map(|k| k as f64 * sample_rate / fft_size as f64)
        .collect();

    let min_mel = hz_to_mel(min_frequency);
    let max_mel = hz_to_mel(max_frequency);
    let mel_freqs: Vec<f64> = (0..n_mels + 2)
        .map(|i| mel_to_hz(min_mel + (max_mel - min_mel) * i as f64 / (n_mels + 1) as f64))
        .collect();

    (0..n_mels)
        .map(|m| {
            let (left, center, right) = (mel_freqs[m], mel_freqs[m + 1], mel_freqs[m + 2]);
            let enorm = 2.0 / (right - left);
            let weights: Vec<f64> = fft_freqs
                .iter()
                .map(|&f| {
                    let lower = (f - left) / (center - left);
                    let upper = (right - f) / (right - center);
                    lower.min(upper).max(0.0) * enorm
                })
                .collect();

            let first = weights.iter().position(|&w| w > 0.0).unwrap_or(0);
            let last = weights.iter().rposition(|&w| w > 0.0).map_or(first, |l| l + 1);
            (first, weights[first..last].to_vec())
        })
        .collect()
}

/// Rows of the orthonormal DCT-II matrix
fn dct_basis(n_coefficients: usize, n_inputs: usize) -> Vec<Vec<f64>> {
    let n = n_inputs as f64;
    (0..n_coefficients)
        .map(|k| {
            let scale = if k == 0 { (1.0 / n).sqrt() } else { (2.0 / n).sqrt() };
            (0..n_inputs)
                .map(|i| scale * (PI * k as f64 * (2.0 * i as f64 + 1.0) / (2.0 * n)).cos())
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn tone(freq: f32, len: usize, rate: u32) -> Vec<f32> {
        (0..len)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * freq * i as f32 / rate as f32).sin())
            .collect()
    }

    #[test]
    fn test_mel_scale_round_trip_points() {
        assert_relative_eq!(hz_to_mel(1000.0), 15.0, epsilon = 1e-9);
        assert_relative_eq!(mel_to_hz(15.0), 1000.0, epsilon = 1e-9);
        assert_relative_eq!(mel_to_hz(hz_to_mel(4000.0)), 4000.0, epsilon = 1e-6);
    }

    #[test]
    fn test_frame_count_and_shape() {
        let extractor = MfccExtractor::new(MfccConfig::default(), 16000).unwrap();
        assert_eq!(extractor.frame_count(16000), 32);
        let mfcc = extractor.extract(&tone(440.0, 16000, 16000));
        assert_eq!(mfcc.shape(), (20, 32));
        assert!(mfcc.frame(3).iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_empty_signal_has_no_frames() {
        let extractor = MfccExtractor::new(MfccConfig::default(), 16000).unwrap();
        assert_eq!(extractor.extract(&[]).shape(), (20, 0));
    }

    #[test]
    fn test_different_tones_differ() {
        let extractor = MfccExtractor::new(MfccConfig::default(), 16000).unwrap();
        let a = extractor.extract(&tone(300.0, 8000, 16000));
        let b = extractor.extract(&tone(3000.0, 8000, 16000));
        let diff: f64 = a.frame(5).iter().zip(b.frame(5)).map(|(x, y)| (x - y).abs()).sum();
        assert!(diff > 1.0);
    }

    #[test]
    fn test_filterbank_covers_band() {
        let bank = mel_filterbank(16000.0, 2048, 128, 0.0, 8000.0);
        assert_eq!(bank.len(), 128);
        assert!(bank.iter().all(|(_, w)| !w.is_empty()));
        // Slaney normalization: each filter has unit area in Hz
        let bin_hz = 16000.0 / 2048.0;
        let area: f64 = bank[100].1.iter().sum::<f64>() * bin_hz;
        assert!((area - 1.0).abs() < 0.1);
    }

    #[test]
    fn test_dct_basis_is_orthonormal() {
        let basis = dct_basis(20, 128);
        let dot = |a: &[f64], b: &[f64]| a.iter().zip(b).map(|(x, y)| x * y).sum::<f64>();
        assert_relative_eq!(dot(&basis[0], &basis[0]), 1.0, epsilon = 1e-9);
        assert_relative_eq!(dot(&basis[3], &basis[3]), 1.0, epsilon = 1e-9);
        assert!(dot(&basis[2], &basis[5]).abs() < 1e-9);
    }

    #[test]
    fn test_row_major_layout() {
        let m = MfccMatrix::from_rows(&[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]);
        assert_eq!(m.shape(), (2, 3));
        assert_eq!(m.frame(1), &[2.0, 5.0]);
        assert_eq!(m.to_row_major(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_invalid_config() {
        let config = MfccConfig {
            n_coefficients: 200,
            ..MfccConfig::default()
        };
        assert!(MfccExtractor::new(config, 16000).is_err());
    }
}
