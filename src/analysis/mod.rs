//! Signal analysis stages of the comparison pipeline
//!
//! Each stage works on plain sample slices or on `AudioBuffer`s and can be
//! used on its own:
//! - `align`: cross-correlation offset and aligned signals
//! - `silence`: silence/talk mask of the reference
//! - `segment`: split signals with a mask
//! - `energy`: residual energy in silence
//! - `mfcc` / `similarity`: spectral similarity of talk segments
//! - `snr`: signal-to-noise ratio

pub mod align;
pub mod energy;
pub mod mfcc;
pub mod segment;
pub mod silence;
pub mod similarity;
pub mod snr;

pub use align::{truncate_to_shortest, Aligner, AlignmentResult, SignConvention};
pub use energy::residual_energy;
pub use mfcc::{MfccConfig, MfccExtractor, MfccMatrix};
pub use segment::{apply_mask, Segments};
pub use silence::{SilenceDetector, SilenceMask, SilenceThresholds, SilenceWindow};
pub use similarity::{SimilarityOutcome, SpectralComparison, SpectralSimilarity};
pub use snr::{snr_db, snr_db_from_files};
