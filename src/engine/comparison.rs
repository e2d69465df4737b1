//! Comparison state machine
//!
//! Drives one tested recording (and an optional additional one) against a
//! reference through the pipeline stages, in this order:
//!
//! `set_audio` → `align` → `detect_silence` → `compute_metrics`
//!
//! Running a stage again rewinds the engine to that stage: everything computed
//! by later stages is dropped.

use std::fmt;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::analysis::align::{ms_to_samples, truncate_to_shortest, Aligner, AlignmentResult};
use crate::analysis::energy::residual_energy;
use crate::analysis::segment::apply_mask;
use crate::analysis::silence::{SilenceDetector, SilenceMask};
use crate::analysis::similarity::{SimilarityOutcome, SpectralSimilarity};
use crate::audio::AudioBuffer;
use crate::engine::config::{ComparisonConfig, LongReferencePolicy, ShorterReferencePolicy};
use crate::error::{CompareError, Result};

/// Pipeline progress of a `ComparisonEngine`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum ComparisonState {
    /// No audio set yet
    #[default]
    Unset,
    AudioSet,
    Aligned,
    SilenceDetected,
    MetricsComputed,
}

impl fmt::Display for ComparisonState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComparisonState::Unset => write!(f, "Unset"),
            ComparisonState::AudioSet => write!(f, "AudioSet"),
            ComparisonState::Aligned => write!(f, "Aligned"),
            ComparisonState::SilenceDetected => write!(f, "SilenceDetected"),
            ComparisonState::MetricsComputed => write!(f, "MetricsComputed"),
        }
    }
}

/// Where the silence mask came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SilenceSource {
    /// Detected on the normalized aligned reference
    Reference,
    /// No reference data: everything after the analysis start is silence
    ReferenceMissingFallback,
}

/// Metrics of one comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    /// Residual energy of the tested signal in silence
    pub energy_in_silence: f64,
    /// Residual energy of the additional signal in silence, 0.0 without one
    pub energy_in_silence_additional: f64,
    /// MFCC similarity on talk, unset when the talk segments were not comparable
    pub similarity: Option<f64>,
    /// MFCC distance on talk
    pub distance: Option<f64>,
    /// Per-frame MFCC distance on talk
    pub frame_distances: Vec<f64>,
    pub silence_source: SilenceSource,
    /// Whether the metrics meet the configured acceptance thresholds
    pub passed: bool,
}

#[derive(Debug, Clone)]
struct Recordings {
    tested: AudioBuffer,
    reference: AudioBuffer,
    additional: Option<AudioBuffer>,
}

/// Compares a tested recording with a reference
#[derive(Debug, Clone)]
pub struct ComparisonEngine {
    config: ComparisonConfig,
    aligner: Aligner,
    detector: SilenceDetector,
    spectral: SpectralSimilarity,
    state: ComparisonState,
    start_ms: u32,
    recordings: Option<Recordings>,
    alignment: Option<AlignmentResult>,
    silence_mask: Option<SilenceMask>,
    silence_source: Option<SilenceSource>,
    similarity: Option<SimilarityOutcome>,
    result: Option<ComparisonResult>,
}

impl ComparisonEngine {
    /// Create an engine from a validated configuration
    ///
    /// # Errors
    /// * `InvalidConfig` - If the configuration does not validate
    pub fn new(config: ComparisonConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            aligner: Aligner::new(config.sign_convention),
            detector: SilenceDetector::new(config.silence.clone(), config.median_half_width),
            spectral: SpectralSimilarity::new(config.mfcc.clone()),
            state: ComparisonState::Unset,
            start_ms: config.start_ms,
            recordings: None,
            alignment: None,
            silence_mask: None,
            silence_source: None,
            similarity: None,
            result: None,
            config,
        })
    }

    // ========================================================================
    // Stages
    // ========================================================================

    /// Set the recordings to compare
    ///
    /// An empty `reference` stands for a missing reference; silence detection
    /// then falls back to treating the whole tested signal as silence. The
    /// `additional` recording goes through the same stages as the tested one.
    ///
    /// # Errors
    /// * `EmptySignal` - If the tested recording has no samples
    /// * `IncompatibleSampleRate` - If the recordings do not share a rate
    pub fn set_audio(
        &mut self,
        mut tested: AudioBuffer,
        reference: AudioBuffer,
        additional: Option<AudioBuffer>,
    ) -> Result<()> {
        if tested.is_empty() {
            return Err(CompareError::EmptySignal {
                context: "tested recording".to_string(),
            });
        }
        if !reference.is_empty() && reference.sample_rate() != tested.sample_rate() {
            return Err(CompareError::IncompatibleSampleRate {
                tested: tested.sample_rate(),
                reference: reference.sample_rate(),
            });
        }
        if let Some(extra) = additional.as_ref() {
            if extra.sample_rate() != tested.sample_rate() {
                return Err(CompareError::IncompatibleSampleRate {
                    tested: extra.sample_rate(),
                    reference: tested.sample_rate(),
                });
            }
        }

        if !reference.is_empty()
            && tested.len() > reference.len()
            && self.config.shorter_reference == ShorterReferencePolicy::TruncateTested
        {
            warn!(
                "reference signal is shorter than tested one ({} < {}), truncating the end of tested signal",
                reference.len(),
                tested.len()
            );
            tested.truncate(reference.len());
        }

        self.recordings = Some(Recordings {
            tested,
            reference,
            additional,
        });
        self.rewind(ComparisonState::AudioSet);
        Ok(())
    }

    /// Set where the comparison starts, in ms; returns the start sample
    ///
    /// Rewinds the engine to `AudioSet`.
    pub fn set_start_analysis(&mut self, start_ms: u32) -> Result<usize> {
        let rate = self.recordings("set analysis start")?.tested.sample_rate();
        self.start_ms = start_ms;
        self.rewind(ComparisonState::AudioSet);
        let start_sample = ms_to_samples(start_ms, rate);
        info!(
            "start audio comparison at sample {} ({} ms)",
            start_sample, start_ms
        );
        Ok(start_sample)
    }

    /// Clip a reference much longer than the tested signal
    ///
    /// The beginning of the reference is kept: the recording under test may
    /// have stopped before the whole reference was played. Returns whether the
    /// reference was clipped.
    pub fn truncate_reference(&mut self) -> Result<bool> {
        let ratio = self.config.long_reference_ratio;
        let policy = self.config.long_reference;
        let recordings = self.recordings_mut("truncate reference")?;
        let tested_len = recordings.tested.len();
        let reference_len = recordings.reference.len();

        let clipped = policy == LongReferencePolicy::ClipTail
            && reference_len as f64 > ratio * tested_len as f64;
        if clipped {
            let new_size = (ratio * tested_len as f64) as usize;
            info!(
                "reference size is {}, too long compared with {}: keeping {} samples",
                reference_len, tested_len, new_size
            );
            recordings.reference.truncate(new_size);
            self.rewind(ComparisonState::AudioSet);
        } else {
            debug!(
                "reference size is {}, OK compared with {}",
                reference_len, tested_len
            );
        }
        Ok(clipped)
    }

    /// Align the tested (and additional) recording on the reference
    ///
    /// Returns `None` without a reference; the engine still moves on to
    /// `Aligned` so that the silence fallback can run.
    pub fn align(&mut self) -> Result<Option<AlignmentResult>> {
        self.recordings("align")?;
        self.rewind(ComparisonState::AudioSet);

        let interval = self.config.alignment_interval_ms;
        let start_ms = self.start_ms;
        let aligner = self.aligner.clone();
        let recordings = self.recordings_mut("align")?;

        let alignment = if recordings.reference.is_empty() {
            warn!("no reference data, alignment skipped");
            None
        } else {
            let result = aligner.align(
                &mut recordings.tested,
                &mut recordings.reference,
                start_ms,
                interval,
            );
            if let Some(extra) = recordings.additional.as_mut() {
                if let Some(extra_result) =
                    aligner.align(extra, &mut recordings.reference, start_ms, interval)
                {
                    info!("additional signal offset: {} samples", extra_result.offset);
                }
            }

            let mut buffers = vec![&mut recordings.tested, &mut recordings.reference];
            if let Some(extra) = recordings.additional.as_mut() {
                buffers.push(extra);
            }
            truncate_to_shortest(&mut buffers);
            result
        };

        self.alignment = alignment;
        self.state = ComparisonState::Aligned;
        Ok(alignment)
    }

    /// Compute the silence mask and split every aligned signal with it
    ///
    /// # Errors
    /// * `InvalidState` - If `align` has not run
    /// * `EmptySignal` - If the aligned reference is all zero
    pub fn detect_silence(&mut self) -> Result<SilenceSource> {
        self.require(ComparisonState::Aligned, "detect silence")?;
        self.rewind(ComparisonState::Aligned);

        let start = ms_to_samples(self.start_ms, self.sample_rate());
        let state = self.state;
        let Some(recordings) = self.recordings.as_mut() else {
            return Err(CompareError::InvalidState {
                operation: "detect silence",
                state: state.to_string(),
            });
        };

        let (mask, source) = if recordings.reference.is_empty() {
            warn!("no reference data: every tested sample after {} is silence", start);
            let silence = tail(recordings.tested.samples(), start);
            let mask = SilenceMask::all_silence(silence.len());
            recordings.tested.set_segments(Some(silence), None);
            if let Some(extra) = recordings.additional.as_mut() {
                let silence = tail(extra.samples(), start);
                extra.set_segments(Some(silence), None);
            }
            (mask, SilenceSource::ReferenceMissingFallback)
        } else {
            recordings.reference.normalize_aligned()?;
            let normalized = recordings.reference.normalized_aligned().unwrap_or(&[]);
            let mask = self
                .detector
                .detect(normalized, recordings.reference.sample_rate())?;
            info!(
                "silence mask: {} silent samples, {} talk samples",
                mask.silence_count(),
                mask.talk_count()
            );

            let mut segments = apply_mask(
                &mask,
                &[
                    recordings.reference.aligned(),
                    recordings.tested.aligned(),
                    recordings.additional.as_ref().and_then(|a| a.aligned()),
                ],
            )
            .into_iter();
            let mut assign = |buffer: &mut AudioBuffer| {
                if let Some(Some(s)) = segments.next() {
                    buffer.set_segments(Some(s.masked), Some(s.unmasked));
                }
            };
            assign(&mut recordings.reference);
            assign(&mut recordings.tested);
            if let Some(extra) = recordings.additional.as_mut() {
                assign(extra);
            }
            (mask, SilenceSource::Reference)
        };

        self.silence_mask = Some(mask);
        self.silence_source = Some(source);
        self.state = ComparisonState::SilenceDetected;
        Ok(source)
    }

    /// Compute energy in silence and similarity on talk
    ///
    /// # Errors
    /// * `InvalidState` - If `detect_silence` has not run
    /// * `InvalidConfig` - If the MFCC parameters do not fit the sample rate
    pub fn compute_metrics(&mut self) -> Result<&ComparisonResult> {
        self.require(ComparisonState::SilenceDetected, "compute metrics")?;
        self.rewind(ComparisonState::SilenceDetected);

        let source = self
            .silence_source
            .unwrap_or(SilenceSource::ReferenceMissingFallback);
        let recordings = self.recordings("compute metrics")?;
        let reference_silence = recordings.reference.silence();

        let energy_in_silence =
            residual_energy(recordings.tested.silence().unwrap_or(&[]), reference_silence);
        let energy_in_silence_additional = recordings
            .additional
            .as_ref()
            .and_then(|a| a.silence())
            .map_or(0.0, |silence| residual_energy(silence, reference_silence));
        info!(
            "energy measured on silence: tested {:.1}, additional {:.1}",
            energy_in_silence, energy_in_silence_additional
        );

        let similarity = match (recordings.tested.talk(), recordings.reference.talk()) {
            (Some(tested_talk), Some(reference_talk)) => Some(self.spectral.compare(
                tested_talk,
                reference_talk,
                recordings.tested.sample_rate(),
            )?),
            _ => {
                warn!("no talk segments to compare, similarity not computed");
                None
            }
        };

        let scores = similarity.as_ref().and_then(|s| s.scores());
        let frame_distances = similarity
            .as_ref()
            .and_then(|s| s.comparison())
            .map(|c| c.frame_distances.clone())
            .unwrap_or_default();
        let passed = self
            .config
            .accepts(energy_in_silence, scores.map(|(similarity, _)| similarity));

        self.similarity = similarity;
        self.state = ComparisonState::MetricsComputed;
        Ok(&*self.result.insert(ComparisonResult {
            energy_in_silence,
            energy_in_silence_additional,
            similarity: scores.map(|(similarity, _)| similarity),
            distance: scores.map(|(_, distance)| distance),
            frame_distances,
            silence_source: source,
            passed,
        }))
    }

    /// Run every stage on the given recordings
    ///
    /// The reference is clipped first when it is much longer than the tested
    /// recording.
    pub fn run(
        &mut self,
        tested: AudioBuffer,
        reference: AudioBuffer,
        additional: Option<AudioBuffer>,
    ) -> Result<ComparisonResult> {
        self.set_audio(tested, reference, additional)?;
        self.set_start_analysis(self.start_ms)?;
        self.truncate_reference()?;
        self.align()?;
        self.detect_silence()?;
        self.compute_metrics().cloned()
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn state(&self) -> ComparisonState {
        self.state
    }

    pub fn config(&self) -> &ComparisonConfig {
        &self.config
    }

    /// Analysis start in ms
    pub fn start_ms(&self) -> u32 {
        self.start_ms
    }

    pub fn tested(&self) -> Option<&AudioBuffer> {
        self.recordings.as_ref().map(|r| &r.tested)
    }

    pub fn reference(&self) -> Option<&AudioBuffer> {
        self.recordings.as_ref().map(|r| &r.reference)
    }

    pub fn additional(&self) -> Option<&AudioBuffer> {
        self.recordings.as_ref().and_then(|r| r.additional.as_ref())
    }

    pub fn alignment(&self) -> Option<&AlignmentResult> {
        self.alignment.as_ref()
    }

    pub fn silence_mask(&self) -> Option<&SilenceMask> {
        self.silence_mask.as_ref()
    }

    /// Full similarity outcome, including the MFCC matrices
    pub fn similarity(&self) -> Option<&SimilarityOutcome> {
        self.similarity.as_ref()
    }

    pub fn result(&self) -> Option<&ComparisonResult> {
        self.result.as_ref()
    }

    // ========================================================================
    // Internal
    // ========================================================================

    fn sample_rate(&self) -> u32 {
        self.recordings
            .as_ref()
            .map_or(self.config.sample_rate, |r| r.tested.sample_rate())
    }

    fn recordings(&self, operation: &'static str) -> Result<&Recordings> {
        self.recordings
            .as_ref()
            .ok_or_else(|| self.invalid_state(operation))
    }

    fn recordings_mut(&mut self, operation: &'static str) -> Result<&mut Recordings> {
        let state = self.state;
        self.recordings
            .as_mut()
            .ok_or_else(|| CompareError::InvalidState {
                operation,
                state: state.to_string(),
            })
    }

    fn require(&self, minimum: ComparisonState, operation: &'static str) -> Result<()> {
        if self.state < minimum {
            return Err(self.invalid_state(operation));
        }
        Ok(())
    }

    fn invalid_state(&self, operation: &'static str) -> CompareError {
        CompareError::InvalidState {
            operation,
            state: self.state.to_string(),
        }
    }

    /// Drop everything computed after `state` and move back to it
    fn rewind(&mut self, state: ComparisonState) {
        if state < ComparisonState::MetricsComputed {
            self.similarity = None;
            self.result = None;
        }
        if state < ComparisonState::SilenceDetected {
            self.silence_mask = None;
            self.silence_source = None;
            if let Some(recordings) = self.recordings.as_mut() {
                recordings.for_each(AudioBuffer::clear_segments);
            }
        }
        if state < ComparisonState::Aligned {
            self.alignment = None;
            if let Some(recordings) = self.recordings.as_mut() {
                recordings.for_each(AudioBuffer::clear_aligned);
            }
        }
        if state != self.state {
            debug!("comparison state {} -> {}", self.state, state);
        }
        self.state = state;
    }
}

impl Recordings {
    fn for_each(&mut self, f: fn(&mut AudioBuffer)) {
        f(&mut self.tested);
        f(&mut self.reference);
        if let Some(extra) = self.additional.as_mut() {
            f(extra);
        }
    }
}

fn tail(samples: &[f32], start: usize) -> Vec<f32> {
    samples[start.min(samples.len())..].to_vec()
}
