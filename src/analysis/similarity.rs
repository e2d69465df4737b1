//! MFCC-based similarity of talk segments

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::analysis::mfcc::{MfccConfig, MfccExtractor, MfccMatrix};
use crate::error::{CompareError, Result};

/// Distance between two MFCC matrices of the same shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectralComparison {
    /// Inverse of the distance, 1.0 for identical features
    pub similarity: f64,
    /// Mean over frames of the per-frame Euclidean distance
    pub distance: f64,
    /// Euclidean distance of each frame
    pub frame_distances: Vec<f64>,
}

/// Result of comparing two talk segments
#[derive(Debug, Clone, PartialEq)]
pub enum SimilarityOutcome {
    Compared {
        comparison: SpectralComparison,
        tested: MfccMatrix,
        reference: MfccMatrix,
    },
    /// The feature matrices could not be compared; the talk segments do not
    /// cover the same duration, usually after a bad alignment
    Incomparable {
        tested_shape: (usize, usize),
        reference_shape: (usize, usize),
    },
}

impl SimilarityOutcome {
    pub fn comparison(&self) -> Option<&SpectralComparison> {
        match self {
            SimilarityOutcome::Compared { comparison, .. } => Some(comparison),
            SimilarityOutcome::Incomparable { .. } => None,
        }
    }

    /// `(similarity, distance)` when the segments were comparable
    pub fn scores(&self) -> Option<(f64, f64)> {
        self.comparison().map(|c| (c.similarity, c.distance))
    }

    pub fn is_comparable(&self) -> bool {
        matches!(self, SimilarityOutcome::Compared { .. })
    }

    /// Whether neither segment held a single talk frame
    pub fn has_no_talk(&self) -> bool {
        matches!(
            self,
            SimilarityOutcome::Incomparable {
                tested_shape: (_, 0),
                reference_shape: (_, 0),
            }
        )
    }

    /// Error describing why the segments were not comparable
    ///
    /// Two empty talk segments give `EmptySignal` rather than a shape mismatch.
    pub fn shape_error(&self) -> Option<CompareError> {
        if self.has_no_talk() {
            return Some(CompareError::EmptySignal {
                context: "no talk frames in tested or reference segment".to_string(),
            });
        }
        match *self {
            SimilarityOutcome::Incomparable {
                tested_shape,
                reference_shape,
            } => Some(CompareError::ShapeMismatch {
                tested_coefficients: tested_shape.0,
                tested_frames: tested_shape.1,
                reference_coefficients: reference_shape.0,
                reference_frames: reference_shape.1,
            }),
            SimilarityOutcome::Compared { .. } => None,
        }
    }
}

/// Compares talk segments through their MFCC representation
#[derive(Debug, Clone, Default)]
pub struct SpectralSimilarity {
    config: MfccConfig,
}

impl SpectralSimilarity {
    pub fn new(config: MfccConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MfccConfig {
        &self.config
    }

    /// Compare the tested talk segment with the reference one
    ///
    /// # Errors
    /// * `InvalidConfig` - If the MFCC parameters are invalid
    pub fn compare(
        &self,
        tested_talk: &[f32],
        reference_talk: &[f32],
        sample_rate: u32,
    ) -> Result<SimilarityOutcome> {
        let extractor = MfccExtractor::new(self.config.clone(), sample_rate)?;
        let reference = extractor.extract(reference_talk);
        let tested = extractor.extract(tested_talk);
        info!(
            "reference: {} coefs, {} frames; signal: {} coefs, {} frames",
            reference.n_coefficients(),
            reference.n_frames(),
            tested.n_coefficients(),
            tested.n_frames()
        );

        match compare_features(&tested, &reference) {
            Some(comparison) => {
                debug!(
                    "MFCC distance {:.3}, similarity {:.5}",
                    comparison.distance, comparison.similarity
                );
                Ok(SimilarityOutcome::Compared {
                    comparison,
                    tested,
                    reference,
                })
            }
            None => {
                let outcome = SimilarityOutcome::Incomparable {
                    tested_shape: tested.shape(),
                    reference_shape: reference.shape(),
                };
                if outcome.has_no_talk() {
                    warn!("cannot compare MFCC coefficients: no talk frames");
                } else {
                    warn!(
                        "cannot compare MFCC coefficients: shapes {:?} and {:?} do not fit",
                        tested.shape(),
                        reference.shape()
                    );
                }
                Ok(outcome)
            }
        }
    }
}

/// Per-frame distance between two feature matrices
///
/// Returns `None` when the shapes differ or there are no frames.
pub fn compare_features(tested: &MfccMatrix, reference: &MfccMatrix) -> Option<SpectralComparison> {
    if tested.shape() != reference.shape() || tested.n_frames() == 0 {
        return None;
    }

    let frame_distances: Vec<f64> = (0..tested.n_frames())
        .map(|f| {
            tested
                .frame(f)
                .iter()
                .zip(reference.frame(f))
                .map(|(t, r)| (r - t) * (r - t))
                .sum::<f64>()
                .sqrt()
        })
        .collect();

    let distance = frame_distances.iter().sum::<f64>() / frame_distances.len() as f64;
    let similarity = if distance == 0.0 { 1.0 } else { 1.0 / distance };

    Some(SpectralComparison {
        similarity,
        distance,
        frame_distances,
    })
}
