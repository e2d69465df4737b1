//! Property-based tests for the analysis stages
//!
//! These tests use proptest to verify invariants across many random inputs.

use proptest::prelude::*;

use filter_compare::analysis::segment::apply_mask;
use filter_compare::analysis::{snr_db, Aligner, SilenceDetector, SilenceMask};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Property: a zero-padded delay of k samples is recovered as offset k
    #[test]
    fn delay_is_recovered(
        signal in prop::collection::vec(-1.0f32..1.0, 64..800),
        delay in 0usize..200,
    ) {
        let mut tested = vec![0.0; delay];
        tested.extend_from_slice(&signal);
        let mut reference = signal;
        reference.resize(tested.len(), 0.0);

        let result = Aligner::default().compute_correlation(&tested, &reference);
        prop_assert_eq!(result.offset, delay as i64);
    }

    /// Property: swapping equal-length inputs negates the offset
    #[test]
    fn offset_is_antisymmetric(
        pair in (32usize..600).prop_flat_map(|n| (
            prop::collection::vec(-1.0f32..1.0, n),
            prop::collection::vec(-1.0f32..1.0, n),
        )),
    ) {
        let (a, b) = pair;
        let aligner = Aligner::default();
        let forward = aligner.compute_correlation(&a, &b).offset;
        let backward = aligner.compute_correlation(&b, &a).offset;
        prop_assert_eq!(forward, -backward);
    }

    /// Property: masking partitions a signal without losing or reordering samples
    #[test]
    fn mask_is_lossless_partition(
        pairs in prop::collection::vec((any::<bool>(), -1.0f32..1.0), 0..500),
    ) {
        let (mask, signal): (Vec<bool>, Vec<f32>) = pairs.into_iter().unzip();
        let segments = apply_mask(&SilenceMask::new(mask.clone()), &[Some(signal.as_slice()), None]);
        prop_assert!(segments[1].is_none());
        let parts = segments[0].clone().unwrap();
        prop_assert_eq!(parts.masked.len() + parts.unmasked.len(), signal.len());

        let mut masked = parts.masked.iter();
        let mut unmasked = parts.unmasked.iter();
        let rebuilt: Vec<f32> = mask
            .iter()
            .filter_map(|&m| if m { masked.next() } else { unmasked.next() })
            .copied()
            .collect();
        prop_assert_eq!(rebuilt, signal);
    }

    /// Property: a signal below the threshold everywhere is all silence
    #[test]
    fn quiet_signal_is_silence(
        signal in prop::collection::vec(-0.0009f32..0.0009, 1..3000),
        wideband in any::<bool>(),
    ) {
        let rate = if wideband { 48000 } else { 16000 };
        let mask = SilenceDetector::default().detect(&signal, rate).unwrap();
        prop_assert_eq!(mask.silence_count(), signal.len());
    }

    /// Property: SNR decreases when the noise gain increases
    #[test]
    fn snr_decreases_with_noise_gain(
        signal in prop::collection::vec(-1.0f32..1.0, 16..400),
        noise in prop::collection::vec(0.01f32..1.0, 16..400),
        gain in 0.1f64..10.0,
        step in 0.01f64..5.0,
    ) {
        let lower = snr_db(&signal, &noise, 16000, None, gain).unwrap();
        let higher = snr_db(&signal, &noise, 16000, None, gain + step).unwrap();
        prop_assert!(higher < lower);
    }
}
