//! filter-compare - Audio Comparison for Filter Validation
//!
//! Measures how a voice-processing filter (echo canceller, noise suppressor)
//! changed a recording by comparing it with a reference recording:
//! 1. Align the tested recording on the reference by cross-correlation
//! 2. Split both into silence and talk with a mask detected on the reference
//! 3. Measure the residual energy in silence and the MFCC similarity on talk
//!
//! # Architecture
//!
//! - `audio`: WAV I/O and the `AudioBuffer` carrying each derived signal
//! - `analysis`: the individual stages, usable on their own
//! - `engine`: the `ComparisonEngine` state machine and its configuration
//! - `report`: `.npy` feature files and JSON-lines result records
//! - `aec`: echo canceller convergence metrics from tester logs

pub mod aec;
pub mod analysis;
pub mod audio;
pub mod cli;
pub mod engine;
pub mod error;
pub mod report;

pub use analysis::{
    Aligner, AlignmentResult, SignConvention, SilenceDetector, SilenceMask, SilenceThresholds,
    SimilarityOutcome, SpectralSimilarity,
};
pub use audio::AudioBuffer;
pub use engine::{ComparisonConfig, ComparisonEngine, ComparisonResult, ComparisonState};
pub use error::{CompareError, Result};
