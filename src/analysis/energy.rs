//! Residual energy in silence
//!
//! A filter that over-suppresses removes the room noise present in the
//! reference silence (negative residual); one that under-suppresses leaves
//! artifacts of its own (positive residual).

/// Sum of absolute sample values
pub fn absolute_energy(samples: &[f32]) -> f64 {
    samples.iter().map(|s| s.abs() as f64).sum()
}

/// Energy of the tested silence minus the energy of the reference silence
///
/// Without reference silence the raw tested energy is returned.
pub fn residual_energy(tested_silence: &[f32], reference_silence: Option<&[f32]>) -> f64 {
    let tested = absolute_energy(tested_silence);
    match reference_silence {
        Some(reference) => tested - absolute_energy(reference),
        None => tested,
    }
}
