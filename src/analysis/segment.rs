//! Split parallel signals with a silence mask

use crate::analysis::silence::SilenceMask;

/// Samples of one signal split by a mask
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Segments {
    /// Samples where the mask is `true` (silence)
    pub masked: Vec<f32>,
    /// Samples where the mask is `false` (talk)
    pub unmasked: Vec<f32>,
}

/// Apply `mask` to every signal of `signals`
///
/// Absent signals stay absent in the output, at the same position.
///
/// # Panics
/// If a present signal does not have the mask's length. Callers truncate all
/// aligned signals to a common length before segmenting, so a mismatch is a
/// bug in the pipeline.
pub fn apply_mask(mask: &SilenceMask, signals: &[Option<&[f32]>]) -> Vec<Option<Segments>> {
    signals
        .iter()
        .map(|signal| signal.map(|samples| split(mask.as_slice(), samples)))
        .collect()
}

fn split(mask: &[bool], samples: &[f32]) -> Segments {
    assert_eq!(
        mask.len(),
        samples.len(),
        "mask and signal lengths differ ({} vs {})",
        mask.len(),
        samples.len()
    );

    let silent = mask.iter().filter(|&&m| m).count();
    let mut segments = Segments {
        masked: Vec::with_capacity(silent),
        unmasked: Vec::with_capacity(samples.len() - silent),
    };
    for (&m, &s) in mask.iter().zip(samples) {
        if m {
            segments.masked.push(s);
        } else {
            segments.unmasked.push(s);
        }
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_keeps_order() {
        let mask = SilenceMask::new(vec![true, false, false, true, true]);
        let signal = [1.0, 2.0, 3.0, 4.0, 5.0];
        let out = apply_mask(&mask, &[Some(&signal[..])]);
        let segments = out[0].as_ref().unwrap();
        assert_eq!(segments.masked, vec![1.0, 4.0, 5.0]);
        assert_eq!(segments.unmasked, vec![2.0, 3.0]);
    }

    #[test]
    fn test_absent_signal_propagates() {
        let mask = SilenceMask::new(vec![true, false]);
        let a = [0.5, 0.25];
        let out = apply_mask(&mask, &[Some(&a[..]), None, Some(&a[..])]);
        assert_eq!(out.len(), 3);
        assert!(out[0].is_some());
        assert!(out[1].is_none());
        assert_eq!(out[2].as_ref().unwrap().unmasked, vec![0.25]);
    }

    #[test]
    #[should_panic(expected = "mask and signal lengths differ")]
    fn test_length_mismatch_panics() {
        let mask = SilenceMask::new(vec![true, false]);
        apply_mask(&mask, &[Some(&[1.0, 2.0, 3.0][..])]);
    }
}
