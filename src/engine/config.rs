//! Comparison configuration
//!
//! Every tunable of the pipeline lives in one serializable record, validated
//! once when an engine is built from it.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::analysis::mfcc::MfccConfig;
use crate::analysis::silence::{SilenceThresholds, DEFAULT_MEDIAN_HALF_WIDTH};
use crate::analysis::SignConvention;
use crate::error::{CompareError, Result};

/// What `set_audio` does when the reference is shorter than the tested signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShorterReferencePolicy {
    /// Drop the tail of the tested signal
    #[default]
    TruncateTested,
    /// Keep both signals; the aligned signals are truncated later anyway
    Keep,
}

/// What `truncate_reference` does with a reference much longer than the tested signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LongReferencePolicy {
    /// Keep the beginning of the reference, `long_reference_ratio` times the
    /// tested length
    #[default]
    ClipTail,
    Keep,
}

/// Configuration of a comparison run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparisonConfig {
    /// Rate every recording must be recorded at, in Hz
    pub sample_rate: u32,
    /// Analysis start, in ms
    pub start_ms: u32,
    /// Window searched for the correlation maximum, in ms
    pub alignment_interval_ms: Option<(u32, u32)>,
    pub sign_convention: SignConvention,
    pub shorter_reference: ShorterReferencePolicy,
    pub long_reference: LongReferencePolicy,
    /// A reference longer than this many times the tested signal is clipped
    pub long_reference_ratio: f64,
    pub silence: SilenceThresholds,
    /// Half-width of the median filter smoothing the silence mask, in samples
    pub median_half_width: usize,
    pub mfcc: MfccConfig,
    /// Acceptance threshold on the residual energy in silence
    pub max_energy_in_silence: Option<f64>,
    /// Acceptance threshold on the MFCC similarity
    pub min_similarity: Option<f64>,
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            start_ms: 0,
            alignment_interval_ms: None,
            sign_convention: SignConvention::default(),
            shorter_reference: ShorterReferencePolicy::default(),
            long_reference: LongReferencePolicy::default(),
            long_reference_ratio: 1.1,
            silence: SilenceThresholds::default(),
            median_half_width: DEFAULT_MEDIAN_HALF_WIDTH,
            mfcc: MfccConfig::default(),
            max_energy_in_silence: None,
            min_similarity: None,
        }
    }
}

impl ComparisonConfig {
    /// Default configuration for recordings at `sample_rate`
    pub fn for_rate(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            ..Self::default()
        }
    }

    /// Load and validate a configuration from a JSON file
    ///
    /// Missing fields take their default value.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CompareError::FileNotFound {
                path: path.display().to_string(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration can drive a comparison
    ///
    /// The sample rate must have a dedicated silence window; the detector's
    /// fallback window is meant for direct library use only.
    pub fn validate(&self) -> Result<()> {
        if !self.silence.is_supported(self.sample_rate) {
            let supported: Vec<String> =
                self.silence.supported_rates().map(|r| r.to_string()).collect();
            return Err(CompareError::InvalidConfig {
                reason: format!(
                    "unsupported sample rate {} Hz (supported: {})",
                    self.sample_rate,
                    supported.join(", ")
                ),
            });
        }
        if let Some((from, to)) = self.alignment_interval_ms {
            if from >= to {
                return Err(CompareError::InvalidConfig {
                    reason: format!("alignment interval [{}, {}] ms is empty", from, to),
                });
            }
        }
        if self.long_reference_ratio.is_nan() || self.long_reference_ratio <= 0.0 {
            return Err(CompareError::InvalidConfig {
                reason: format!(
                    "long_reference_ratio must be positive, got {}",
                    self.long_reference_ratio
                ),
            });
        }
        if self.median_half_width == 0 {
            return Err(CompareError::InvalidConfig {
                reason: "median_half_width must be positive".to_string(),
            });
        }
        self.silence.validate()?;
        self.mfcc.validate()
    }

    /// Whether metrics meet the acceptance thresholds
    ///
    /// A missing similarity fails a similarity threshold. Without thresholds
    /// every result passes.
    pub fn accepts(&self, energy_in_silence: f64, similarity: Option<f64>) -> bool {
        let energy_ok = self
            .max_energy_in_silence
            .map_or(true, |max| energy_in_silence <= max);
        let similarity_ok = match (self.min_similarity, similarity) {
            (None, _) => true,
            (Some(min), Some(value)) => value >= min,
            (Some(_), None) => false,
        };
        energy_ok && similarity_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use test_case::test_case;

    #[test]
    fn test_default_is_valid() {
        let config = ComparisonConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.long_reference_ratio, 1.1);
        assert_eq!(config.median_half_width, 1400);
        assert!(ComparisonConfig::for_rate(48000).validate().is_ok());
    }

    #[test_case(8000 ; "narrowband")]
    #[test_case(44100 ; "cd rate")]
    #[test_case(0 ; "zero")]
    fn test_rejects_unsupported_rate(rate: u32) {
        let err = ComparisonConfig::for_rate(rate).validate().unwrap_err();
        assert!(matches!(err, CompareError::InvalidConfig { .. }));
        assert!(err.to_string().contains(&rate.to_string()));
    }

    #[test]
    fn test_rejects_inverted_interval() {
        let config = ComparisonConfig {
            alignment_interval_ms: Some((4500, 3500)),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_ratio_and_window() {
        let config = ComparisonConfig {
            long_reference_ratio: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ComparisonConfig {
            median_half_width: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_accepts() {
        let mut config = ComparisonConfig::default();
        assert!(config.accepts(1e6, None));

        config.max_energy_in_silence = Some(100.0);
        config.min_similarity = Some(0.02);
        assert!(config.accepts(50.0, Some(0.05)));
        assert!(!config.accepts(150.0, Some(0.05)));
        assert!(!config.accepts(50.0, Some(0.01)));
        assert!(!config.accepts(50.0, None));
    }

    #[test]
    fn test_from_json_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"sample_rate": 48000, "alignment_interval_ms": [18500, 19500], "sign_convention": "flip_when_reference_longer"}}"#
        )
        .unwrap();

        let config = ComparisonConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.sample_rate, 48000);
        assert_eq!(config.alignment_interval_ms, Some((18500, 19500)));
        assert_eq!(config.sign_convention, SignConvention::FlipWhenReferenceLonger);
        assert_eq!(config.mfcc, MfccConfig::default());
    }

    #[test]
    fn test_from_json_file_missing() {
        let result = ComparisonConfig::from_json_file(Path::new("/nonexistent/config.json"));
        assert!(matches!(result, Err(CompareError::FileNotFound { .. })));
    }
}
