//! Result output
//!
//! - `npy`: MFCC matrices and per-frame differences as NumPy arrays
//! - `record`: one JSON line of metrics per test case
//! - `write_features`: the feature files of one comparison

pub mod npy;
pub mod record;

use std::path::{Path, PathBuf};

use log::info;

use crate::analysis::SimilarityOutcome;
use crate::error::Result;

pub use record::ResultRecord;

/// Paths of the feature files written for one test case
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureFiles {
    pub tested_mfcc: PathBuf,
    pub reference_mfcc: PathBuf,
    pub difference: PathBuf,
}

impl FeatureFiles {
    /// File names used for test case `name` in `dir`
    pub fn for_test(dir: &Path, name: &str) -> Self {
        Self {
            tested_mfcc: dir.join(format!("{}_test_MFCC_on_talk.npy", name)),
            reference_mfcc: dir.join(format!("{}_ref_MFCC_on_talk.npy", name)),
            difference: dir.join(format!("{}_MFCC_difference_with_ref_on_talk.npy", name)),
        }
    }
}

/// Write the MFCC matrices and per-frame differences of a comparison
///
/// Returns `None` when the talk segments were not comparable; nothing is
/// written then.
pub fn write_features(
    dir: &Path,
    name: &str,
    outcome: &SimilarityOutcome,
) -> Result<Option<FeatureFiles>> {
    let SimilarityOutcome::Compared {
        comparison,
        tested,
        reference,
    } = outcome
    else {
        return Ok(None);
    };

    let files = FeatureFiles::for_test(dir, name);
    npy::write_mfcc(&files.tested_mfcc, tested)?;
    npy::write_mfcc(&files.reference_mfcc, reference)?;
    npy::write_vector(&files.difference, &comparison.frame_distances)?;
    info!("MFCC features of {} written to {}", name, dir.display());
    Ok(Some(files))
}
