//! Silence/talk segmentation of a reference signal
//!
//! Two passes over the normalized, aligned reference:
//! 1. a sample is silent when the mean absolute value of the window centered
//!    on it is below a threshold;
//! 2. the raw mask is median filtered with a much wider window, which removes
//!    isolated flips and leaves contiguous silence and talk runs.
//!
//! Windows are clamped at the signal bounds. Both passes run on prefix sums,
//! so the cost is linear in the signal length whatever the window sizes.

use std::collections::BTreeMap;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::{CompareError, Result};

/// Half-width of the median filter applied to the raw mask, in samples
pub const DEFAULT_MEDIAN_HALF_WIDTH: usize = 1400;

/// Energy window for one sample rate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SilenceWindow {
    /// Half-width of the centered averaging window, in samples
    pub half_width: usize,
    /// Mean absolute amplitude below which a sample is silent
    pub threshold: f64,
}

/// Energy windows keyed by sample rate
///
/// Lists the supported rates explicitly. A rate that is not in the table uses
/// the fallback window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SilenceThresholds {
    by_rate: BTreeMap<u32, SilenceWindow>,
    fallback: SilenceWindow,
}

impl Default for SilenceThresholds {
    fn default() -> Self {
        let narrowband = SilenceWindow {
            half_width: 200,
            threshold: 0.001,
        };
        let mut by_rate = BTreeMap::new();
        by_rate.insert(16000, narrowband);
        by_rate.insert(
            48000,
            SilenceWindow {
                half_width: 400,
                threshold: 0.001,
            },
        );
        Self {
            by_rate,
            fallback: narrowband,
        }
    }
}

impl SilenceThresholds {
    /// Table with a single fallback window and no per-rate entries
    pub fn uniform(window: SilenceWindow) -> Self {
        Self {
            by_rate: BTreeMap::new(),
            fallback: window,
        }
    }

    /// Add or replace the window used for `sample_rate`
    pub fn with_rate(mut self, sample_rate: u32, window: SilenceWindow) -> Self {
        self.by_rate.insert(sample_rate, window);
        self
    }

    /// Rates with a dedicated window
    pub fn supported_rates(&self) -> impl Iterator<Item = u32> + '_ {
        self.by_rate.keys().copied()
    }

    pub fn is_supported(&self, sample_rate: u32) -> bool {
        self.by_rate.contains_key(&sample_rate)
    }

    /// Window for `sample_rate`, falling back to the default window
    pub fn window_for(&self, sample_rate: u32) -> SilenceWindow {
        match self.by_rate.get(&sample_rate) {
            Some(window) => *window,
            None => {
                warn!(
                    "no silence window for {} Hz, using fallback (hw={}, th={})",
                    sample_rate, self.fallback.half_width, self.fallback.threshold
                );
                self.fallback
            }
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        let entries = self
            .by_rate
            .iter()
            .map(|(rate, window)| (format!("{} Hz", rate), window))
            .chain(std::iter::once(("fallback".to_string(), &self.fallback)));
        for (name, window) in entries {
            if window.half_width == 0 || window.threshold.is_nan() || window.threshold <= 0.0 {
                return Err(CompareError::InvalidConfig {
                    reason: format!(
                        "silence window for {} needs a positive half-width and threshold",
                        name
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Per-sample silence classification; `true` is silence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SilenceMask(Vec<bool>);

impl SilenceMask {
    pub fn new(mask: Vec<bool>) -> Self {
        Self(mask)
    }

    /// Mask marking every one of `len` samples as silence
    pub fn all_silence(len: usize) -> Self {
        Self(vec![true; len])
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn silence_count(&self) -> usize {
        self.0.iter().filter(|&&s| s).count()
    }

    pub fn talk_count(&self) -> usize {
        self.len() - self.silence_count()
    }

    /// Contiguous runs as `(start, length, is_silence)`
    pub fn runs(&self) -> Vec<(usize, usize, bool)> {
        let mut runs = Vec::new();
        let mut start = 0;
        for i in 1..=self.0.len() {
            if i == self.0.len() || self.0[i] != self.0[start] {
                runs.push((start, i - start, self.0[start]));
                start = i;
            }
        }
        runs
    }
}

/// Builds silence masks from a normalized reference
#[derive(Debug, Clone)]
pub struct SilenceDetector {
    thresholds: SilenceThresholds,
    median_half_width: usize,
}

impl Default for SilenceDetector {
    fn default() -> Self {
        Self::new(SilenceThresholds::default(), DEFAULT_MEDIAN_HALF_WIDTH)
    }
}

impl SilenceDetector {
    pub fn new(thresholds: SilenceThresholds, median_half_width: usize) -> Self {
        Self {
            thresholds,
            median_half_width,
        }
    }

    pub fn thresholds(&self) -> &SilenceThresholds {
        &self.thresholds
    }

    /// Silence mask of a normalized, aligned reference signal
    ///
    /// # Errors
    /// * `EmptySignal` - If `reference` has no samples
    pub fn detect(&self, reference: &[f32], sample_rate: u32) -> Result<SilenceMask> {
        if reference.is_empty() {
            return Err(CompareError::EmptySignal {
                context: "silence detection on an empty reference".to_string(),
            });
        }

        let window = self.thresholds.window_for(sample_rate);
        let raw = self.energy_mask(reference, window);
        let smoothed = median_filter(&raw, self.median_half_width);
        let mask = SilenceMask::new(smoothed);

        debug!(
            "silence mask at {} Hz (hw={}, th={}): {} silent / {} talk samples",
            sample_rate,
            window.half_width,
            window.threshold,
            mask.silence_count(),
            mask.talk_count()
        );
        Ok(mask)
    }

    fn energy_mask(&self, signal: &[f32], window: SilenceWindow) -> Vec<bool> {
        let mut prefix = Vec::with_capacity(signal.len() + 1);
        prefix.push(0.0_f64);
        let mut acc = 0.0_f64;
        for &s in signal {
            acc += s.abs() as f64;
            prefix.push(acc);
        }

        (0..signal.len())
            .map(|i| {
                let (w0, wn) = clamped_window(i, window.half_width, signal.len());
                let mean = (prefix[wn] - prefix[w0]) / (wn - w0) as f64;
                mean < window.threshold
            })
            .collect()
    }
}

/// Median of each clamped boolean window
///
/// An even-length window with as many `true` as `false` counts as `true`: the
/// median is the mean of the two middle values and any non-zero mean is true.
fn median_filter(mask: &[bool], half_width: usize) -> Vec<bool> {
    let mut prefix = Vec::with_capacity(mask.len() + 1);
    prefix.push(0usize);
    for &m in mask {
        let last = *prefix.last().unwrap_or(&0);
        prefix.push(last + m as usize);
    }

    (0..mask.len())
        .map(|i| {
            let (w0, wn) = clamped_window(i, half_width, mask.len());
            let count = prefix[wn] - prefix[w0];
            2 * count >= wn - w0
        })
        .collect()
}

fn clamped_window(i: usize, half_width: usize, len: usize) -> (usize, usize) {
    (i.saturating_sub(half_width), (i + half_width + 1).min(len))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(len: usize, amplitude: f32, rate: u32) -> Vec<f32> {
        (0..len)
            .map(|i| amplitude * (2.0 * std::f32::consts::PI * 440.0 * i as f32 / rate as f32).sin())
            .collect()
    }

    #[test]
    fn test_near_zero_is_all_silence() {
        let mask = SilenceDetector::default().detect(&vec![1e-5; 5000], 16000).unwrap();
        assert_eq!(mask.silence_count(), 5000);
    }

    #[test]
    fn test_full_sine_is_all_talk() {
        let mask = SilenceDetector::default()
            .detect(&sine(20000, 1.0, 48000), 48000)
            .unwrap();
        assert_eq!(mask.talk_count(), 20000);
    }

    #[test]
    fn test_low_level_run_at_48k() {
        let mask = SilenceDetector::default().detect(&vec![0.0005; 1000], 48000).unwrap();
        assert!(mask.as_slice().iter().all(|&s| s));
    }

    #[test]
    fn test_talk_then_silence_runs() {
        let mut signal = sine(8000, 0.8, 16000);
        signal.extend(vec![0.0; 8000]);
        let mask = SilenceDetector::default().detect(&signal, 16000).unwrap();
        let runs = mask.runs();
        assert_eq!(runs.len(), 2);
        assert!(!runs[0].2);
        assert!(runs[1].2);
        // The transition moves by at most the energy half-width
        assert!((runs[1].0 as i64 - 8000).abs() <= 200);
    }

    #[test]
    fn test_median_removes_isolated_flips() {
        let mut raw = vec![true; 5000];
        raw[2000] = false;
        raw[2001] = false;
        let smoothed = median_filter(&raw, DEFAULT_MEDIAN_HALF_WIDTH);
        assert!(smoothed.iter().all(|&s| s));
    }

    #[test]
    fn test_median_tie_counts_as_silence() {
        // Window of 4 at index 0 with half-width 3: [t, t, f, f]
        let smoothed = median_filter(&[true, true, false, false], 3);
        assert!(smoothed[0]);
    }

    #[test]
    fn test_unknown_rate_uses_fallback() {
        let thresholds = SilenceThresholds::default();
        assert!(thresholds.is_supported(16000));
        assert!(thresholds.is_supported(48000));
        assert!(!thresholds.is_supported(44100));
        assert_eq!(thresholds.window_for(44100).half_width, 200);
        assert_eq!(thresholds.window_for(48000).half_width, 400);
    }

    #[test]
    fn test_uniform_table_with_added_rate() {
        let wide = SilenceWindow {
            half_width: 800,
            threshold: 0.01,
        };
        let thresholds = SilenceThresholds::uniform(wide).with_rate(16000, SilenceWindow {
            half_width: 100,
            threshold: 0.001,
        });
        assert_eq!(thresholds.supported_rates().collect::<Vec<_>>(), vec![16000]);
        assert_eq!(thresholds.window_for(16000).half_width, 100);
        assert_eq!(thresholds.window_for(48000).half_width, 800);
        assert!(thresholds.validate().is_ok());
    }

    #[test]
    fn test_empty_reference_is_error() {
        let result = SilenceDetector::default().detect(&[], 16000);
        assert!(matches!(result, Err(CompareError::EmptySignal { .. })));
    }

    #[test]
    fn test_invalid_window_rejected() {
        let thresholds = SilenceThresholds::default().with_rate(
            8000,
            SilenceWindow {
                half_width: 0,
                threshold: 0.001,
            },
        );
        assert!(thresholds.validate().is_err());
        assert!(SilenceThresholds::default().validate().is_ok());
    }
}
