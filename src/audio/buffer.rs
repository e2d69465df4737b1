//! Audio buffer implementation
//!
//! An `AudioBuffer` owns one mono recording plus the signals the comparison
//! pipeline derives from it. Each derived signal is written by exactly one
//! stage: alignment writes `aligned`, silence detection writes `silence` and
//! `talk`.

use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::audio::io::{read_mono_wav, write_pcm16_wav};
use crate::error::{CompareError, Result};

/// Mono PCM recording with its derived signals
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    /// File the samples were read from, if any
    file_name: Option<PathBuf>,
    /// Raw samples in -1.0..1.0
    samples: Vec<f32>,
    /// Sample rate in Hz
    sample_rate: u32,
    normalized: Option<Vec<f32>>,
    aligned: Option<Vec<f32>>,
    normalized_aligned: Option<Vec<f32>>,
    silence: Option<Vec<f32>>,
    talk: Option<Vec<f32>>,
}

impl AudioBuffer {
    /// Create an empty buffer configured for the given sample rate
    ///
    /// An empty buffer stands for a recording that is not available, e.g. a
    /// reference that was not produced for a single-talk test.
    pub fn empty(sample_rate: u32) -> Self {
        Self {
            file_name: None,
            samples: Vec::new(),
            sample_rate,
            normalized: None,
            aligned: None,
            normalized_aligned: None,
            silence: None,
            talk: None,
        }
    }

    /// Create a buffer from in-memory samples
    ///
    /// The normalized signal is computed when the samples are not all zero.
    pub fn from_samples(samples: Vec<f32>, sample_rate: u32) -> Self {
        let mut buffer = Self::empty(sample_rate);
        buffer.samples = samples;
        buffer.refresh_normalized();
        buffer
    }

    /// Load a mono WAV file, requiring it to be recorded at `target_rate`
    ///
    /// No resampling is performed.
    ///
    /// # Errors
    /// * `SampleRateMismatch` - If the file's rate differs from `target_rate`
    /// * `FileNotFound`, `AudioRead`, `UnsupportedFormat` - From the WAV reader
    pub fn load(path: &Path, target_rate: u32) -> Result<Self> {
        let wav = read_mono_wav(path)?;
        if wav.sample_rate != target_rate {
            return Err(CompareError::SampleRateMismatch {
                path: path.display().to_string(),
                expected: target_rate,
                actual: wav.sample_rate,
            });
        }

        let mut buffer = Self::from_samples(wav.samples, target_rate);
        buffer.file_name = Some(path.to_path_buf());
        info!(
            "read file {}: {} samples at {} Hz ({:.2} s)",
            path.display(),
            buffer.len(),
            buffer.sample_rate,
            buffer.total_duration()
        );
        Ok(buffer)
    }

    /// File the buffer was loaded from
    pub fn file_name(&self) -> Option<&Path> {
        self.file_name.as_deref()
    }

    /// Raw samples
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Number of raw samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True when the buffer holds no samples
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Sample rate in Hz
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Duration of one sample in seconds
    pub fn sample_duration(&self) -> f64 {
        1.0 / self.sample_rate as f64
    }

    /// Duration of the raw signal in seconds
    pub fn total_duration(&self) -> f64 {
        self.samples.len() as f64 * self.sample_duration()
    }

    /// Timestamp in seconds of each raw sample
    pub fn timestamps(&self) -> Vec<f64> {
        let dt = self.sample_duration();
        (0..self.samples.len()).map(|i| i as f64 * dt).collect()
    }

    /// Raw signal scaled by its peak, unset for silent buffers
    pub fn normalized(&self) -> Option<&[f32]> {
        self.normalized.as_deref()
    }

    /// Signal after offset correction
    pub fn aligned(&self) -> Option<&[f32]> {
        self.aligned.as_deref()
    }

    /// Aligned signal scaled by its peak
    pub fn normalized_aligned(&self) -> Option<&[f32]> {
        self.normalized_aligned.as_deref()
    }

    /// Samples classified as silence
    pub fn silence(&self) -> Option<&[f32]> {
        self.silence.as_deref()
    }

    /// Samples classified as talk
    pub fn talk(&self) -> Option<&[f32]> {
        self.talk.as_deref()
    }

    /// Compute the normalized signal from the raw samples
    ///
    /// # Errors
    /// * `EmptySignal` - If the buffer is empty or all-zero
    pub fn normalize(&mut self) -> Result<()> {
        let normalized = normalized_copy(&self.samples).ok_or_else(|| CompareError::EmptySignal {
            context: self.describe("normalize"),
        })?;
        self.normalized = Some(normalized);
        Ok(())
    }

    /// Compute the normalized signal from the aligned samples
    ///
    /// Does nothing when the buffer has not been aligned yet.
    ///
    /// # Errors
    /// * `EmptySignal` - If the aligned signal is empty or all-zero
    pub fn normalize_aligned(&mut self) -> Result<()> {
        let Some(aligned) = self.aligned.as_deref() else {
            return Ok(());
        };
        let normalized = normalized_copy(aligned).ok_or_else(|| CompareError::EmptySignal {
            context: self.describe("normalize aligned signal"),
        })?;
        self.normalized_aligned = Some(normalized);
        Ok(())
    }

    /// Keep only the first `len` raw samples
    ///
    /// Every signal derived from the raw samples is invalidated.
    pub fn truncate(&mut self, len: usize) {
        if len >= self.samples.len() {
            return;
        }
        self.samples.truncate(len);
        self.refresh_normalized();
        self.clear_aligned();
    }

    /// Keep only the first `len` aligned samples
    pub fn truncate_aligned(&mut self, len: usize) {
        if let Some(aligned) = self.aligned.as_mut() {
            aligned.truncate(len);
        }
        if let Some(normalized) = self.normalized_aligned.as_mut() {
            normalized.truncate(len);
        }
    }

    pub(crate) fn set_aligned(&mut self, aligned: Vec<f32>) {
        self.aligned = Some(aligned);
        self.normalized_aligned = None;
        self.clear_segments();
    }

    pub(crate) fn set_segments(&mut self, silence: Option<Vec<f32>>, talk: Option<Vec<f32>>) {
        self.silence = silence;
        self.talk = talk;
    }

    pub(crate) fn clear_aligned(&mut self) {
        self.aligned = None;
        self.normalized_aligned = None;
        self.clear_segments();
    }

    pub(crate) fn clear_segments(&mut self) {
        self.silence = None;
        self.talk = None;
    }

    /// Write the raw samples to a PCM-16 WAV file
    pub fn write_wav(&self, path: &Path) -> Result<()> {
        write_pcm16_wav(path, &self.samples, self.sample_rate)
    }

    /// Write the aligned samples to a PCM-16 WAV file, if alignment ran
    pub fn write_aligned_wav(&self, path: &Path) -> Result<()> {
        match self.aligned.as_deref() {
            Some(aligned) => write_pcm16_wav(path, aligned, self.sample_rate),
            None => {
                debug!("no aligned data to write to {}", path.display());
                Ok(())
            }
        }
    }

    /// Write arbitrary samples at this buffer's rate to a PCM-16 WAV file
    pub fn write_samples_wav(&self, path: &Path, samples: &[f32]) -> Result<()> {
        write_pcm16_wav(path, samples, self.sample_rate)
    }

    fn refresh_normalized(&mut self) {
        self.normalized = normalized_copy(&self.samples);
        if self.normalized.is_none() && !self.samples.is_empty() {
            debug!("{}: all samples are zero, normalization skipped", self.describe("load"));
        }
    }

    fn describe(&self, operation: &str) -> String {
        match &self.file_name {
            Some(path) => format!("{} on {} ({} samples)", operation, path.display(), self.len()),
            None => format!("{} on in-memory buffer ({} samples)", operation, self.len()),
        }
    }
}

/// Peak absolute value of a signal
pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().map(|s| s.abs()).fold(0.0_f32, f32::max)
}

fn normalized_copy(samples: &[f32]) -> Option<Vec<f32>> {
    let max = peak(samples);
    if max == 0.0 || !max.is_finite() {
        return None;
    }
    Some(samples.iter().map(|s| s / max).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_normalize_scales_to_unit_peak() {
        let mut buffer = AudioBuffer::from_samples(vec![0.125, -0.5, 0.25], 16000);
        buffer.normalize().unwrap();
        assert_eq!(buffer.normalized().unwrap(), &[0.25, -1.0, 0.5]);
    }

    #[test]
    fn test_normalize_all_zero_is_empty_signal() {
        let mut buffer = AudioBuffer::from_samples(vec![0.0; 64], 16000);
        assert!(buffer.normalized().is_none());
        assert!(matches!(buffer.normalize(), Err(CompareError::EmptySignal { .. })));

        let mut empty = AudioBuffer::empty(16000);
        assert!(matches!(empty.normalize(), Err(CompareError::EmptySignal { .. })));
    }

    #[test]
    fn test_timestamps_and_duration() {
        let buffer = AudioBuffer::from_samples(vec![0.5; 48000], 48000);
        assert!((buffer.total_duration() - 1.0).abs() < 1e-12);
        let ts = buffer.timestamps();
        assert_eq!(ts.len(), 48000);
        assert!((ts[480] - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_normalize_aligned_without_alignment_is_noop() {
        let mut buffer = AudioBuffer::from_samples(vec![0.5; 10], 16000);
        buffer.normalize_aligned().unwrap();
        assert!(buffer.normalized_aligned().is_none());

        buffer.set_aligned(vec![0.0, 0.25, -0.5]);
        buffer.normalize_aligned().unwrap();
        assert_eq!(buffer.normalized_aligned().unwrap(), &[0.0, 0.5, -1.0]);
    }

    #[test]
    fn test_truncate_invalidates_alignment() {
        let mut buffer = AudioBuffer::from_samples(vec![0.25, 0.5, 1.0, 0.75], 16000);
        buffer.set_aligned(vec![0.25, 0.5]);
        buffer.truncate(2);
        assert_eq!(buffer.samples(), &[0.25, 0.5]);
        assert_eq!(buffer.normalized().unwrap(), &[0.5, 1.0]);
        assert!(buffer.aligned().is_none());
    }

    #[test]
    fn test_write_aligned_wav() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("aligned.wav");
        let mut buffer = AudioBuffer::from_samples(vec![0.5; 8], 16000);
        buffer.set_aligned(vec![0.0, 0.0, 0.5, -0.25]);
        buffer.write_aligned_wav(&path).unwrap();

        let written = AudioBuffer::load(&path, 16000).unwrap();
        assert_eq!(written.len(), 4);
        for (got, want) in written.samples().iter().zip([0.0, 0.0, 0.5, -0.25]) {
            assert!((got - want).abs() < 1e-3);
        }
    }

    #[test]
    fn test_write_aligned_wav_without_alignment_writes_nothing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("aligned.wav");
        let buffer = AudioBuffer::from_samples(vec![0.5; 8], 16000);
        buffer.write_aligned_wav(&path).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_write_wav_and_samples_keep_rate() {
        let dir = tempdir().unwrap();
        let buffer = AudioBuffer::from_samples(vec![0.25; 480], 48000);
        buffer.write_wav(&dir.path().join("raw.wav")).unwrap();
        buffer
            .write_samples_wav(&dir.path().join("talk.wav"), &[0.5; 96])
            .unwrap();

        let raw = AudioBuffer::load(&dir.path().join("raw.wav"), 48000).unwrap();
        assert_eq!(raw.len(), 480);
        let talk = AudioBuffer::load(&dir.path().join("talk.wav"), 48000).unwrap();
        assert_eq!(talk.len(), 96);
        assert!((talk.samples()[0] - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_load_rejects_other_rate() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rate.wav");
        write_pcm16_wav(&path, &[0.1; 480], 48000).unwrap();

        let err = AudioBuffer::load(&path, 16000).unwrap_err();
        match err {
            CompareError::SampleRateMismatch { expected, actual, .. } => {
                assert_eq!(expected, 16000);
                assert_eq!(actual, 48000);
            }
            other => panic!("unexpected error: {other}"),
        }

        let buffer = AudioBuffer::load(&path, 48000).unwrap();
        assert_eq!(buffer.len(), 480);
        assert_eq!(buffer.file_name(), Some(path.as_path()));
    }
}
